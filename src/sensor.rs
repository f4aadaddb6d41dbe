use serde_derive::Serialize;

use crate::discovery::MeterCandidate;
use crate::water_coordinator::CoordinatorState;

pub const SENSOR_KEY_TOTAL: &str = "total";
pub const SENSOR_KEY_DAILY: &str = "daily";
const UNIT_CUBIC_METERS: &str = "m³";
/// Litre resolution.
const STATE_DECIMALS: i32 = 3;

/// Sensor state in the shape accepted by Home Assistant's `/api/states` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorState {
    pub state: String,
    pub attributes: SensorAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorAttributes {
    pub friendly_name: String,
    pub unique_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    pub state_class: &'static str,
    pub unit_of_measurement: &'static str,
    pub meter_number: String,
    pub supply_point_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// The two sensors published for one meter, keyed by sensor key.
pub fn sensor_states(
    meter: &MeterCandidate,
    state: &CoordinatorState,
) -> [(&'static str, SensorState); 2] {
    [
        (
            SENSOR_KEY_TOTAL,
            build_sensor(meter, state, SENSOR_KEY_TOTAL, state.data.latest_total),
        ),
        (
            SENSOR_KEY_DAILY,
            build_sensor(meter, state, SENSOR_KEY_DAILY, state.data.daily_consumption),
        ),
    ]
}

fn build_sensor(
    meter: &MeterCandidate,
    state: &CoordinatorState,
    key: &'static str,
    value: Option<f64>,
) -> SensorState {
    let data = &state.data;
    let (name, device_class, state_class) = match key {
        SENSOR_KEY_TOTAL => ("Total water consumption", Some("water"), "total_increasing"),
        _ => ("Daily water usage", None, "measurement"),
    };
    let value = if state.last_update_success {
        value.map_or_else(|| "unknown".to_string(), format_state)
    } else {
        "unavailable".to_string()
    };

    SensorState {
        state: value,
        attributes: SensorAttributes {
            friendly_name: format!("{} {}", meter.title(), name),
            unique_id: meter.unique_id().map(|base| format!("{base}_{key}")),
            device_class,
            state_class,
            unit_of_measurement: UNIT_CUBIC_METERS,
            meter_number: data.meter_number.clone(),
            supply_point_id: data.supply_point_id.clone(),
            last_updated: data.latest_timestamp.map(|timestamp| timestamp.to_rfc3339()),
        },
    }
}

/// Rounds away float residue such as `0.7999999999999972`.
fn format_state(value: f64) -> String {
    let scale = 10f64.powi(STATE_DECIMALS);
    ((value * scale).round() / scale).to_string()
}
