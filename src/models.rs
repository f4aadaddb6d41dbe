use chrono::{DateTime, Utc};
use serde_derive::Serialize;

/// A physical water connection that has a smart meter installed.
#[derive(Default, Debug, Clone, PartialEq, Serialize)]
pub struct SupplyPoint {
    pub meter_number: Option<String>,
    pub supply_point_id: Option<String>,
    pub object_id: Option<String>,
    pub address: Option<String>,
}

/// Single smart meter sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmartMeterReading {
    pub reading: Option<f64>,
    pub reading_end: Option<f64>,
    pub reading_date: DateTime<Utc>,
}

/// Response envelope of the smart meter readings endpoint.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct SmartMeterReadingsResult {
    pub readings: Vec<SmartMeterReading>,
    pub meter_number: Option<String>,
    pub supply_point_id: Option<String>,
    pub errors: Vec<String>,
}

/// Per-meter summary returned by `/api/Readings`, only used while discovering meters.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct ReadingOverview {
    pub address: Option<String>,
    pub meter_number: Option<String>,
    pub meter_type: Option<String>,
    pub last_reading: Option<f64>,
    pub last_reading_date: Option<DateTime<Utc>>,
}

impl ReadingOverview {
    pub fn is_smart(&self) -> bool {
        self.meter_type
            .as_deref()
            .is_some_and(|meter_type| meter_type.eq_ignore_ascii_case("smart"))
    }
}

/// Snapshot published by the coordinator after every successful poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumptionData {
    pub meter_number: String,
    pub supply_point_id: Option<String>,
    /// Cumulative meter total in cubic meters.
    pub latest_total: Option<f64>,
    pub latest_timestamp: Option<DateTime<Utc>>,
    /// Consumption since the start of the current local day.
    pub daily_consumption: Option<f64>,
    /// All readings of the polled window, sorted ascending by date.
    pub readings: Vec<SmartMeterReading>,
}
