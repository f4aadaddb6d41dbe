use chrono::{DateTime, Utc};
use serde_derive::Serialize;

use crate::models::{ConsumptionData, SmartMeterReading};
use crate::water_coordinator::{CoordinatorState, Phase};

const RECENT_READINGS: usize = 50;

/// Troubleshooting dump of the latest snapshot.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    pub meter_number: Option<String>,
    pub supply_point_id: Option<String>,
    pub latest_total: Option<f64>,
    pub latest_timestamp: Option<DateTime<Utc>>,
    pub daily_consumption: Option<f64>,
    pub recent_readings: Vec<SmartMeterReading>,
}

impl Diagnostics {
    pub fn from_data(data: Option<&ConsumptionData>) -> Self {
        let Some(data) = data else {
            return Self::default();
        };
        let skip = data.readings.len().saturating_sub(RECENT_READINGS);
        Self {
            meter_number: Some(data.meter_number.clone()),
            supply_point_id: data.supply_point_id.clone(),
            latest_total: data.latest_total,
            latest_timestamp: data.latest_timestamp,
            daily_consumption: data.daily_consumption,
            recent_readings: data.readings[skip..].to_vec(),
        }
    }

    /// Diagnostics of a freshly published snapshot. `None` while fetching or after a failed update.
    pub fn after_refresh(state: &CoordinatorState) -> Option<Self> {
        (state.phase == Phase::Idle && state.last_update_success)
            .then(|| Self::from_data(Some(&state.data)))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
