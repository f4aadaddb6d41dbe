use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use crate::models::{ConsumptionData, SmartMeterReading, SmartMeterReadingsResult};
use crate::payload::local_start_of_day;

/// Sorts readings ascending by their timestamp. Stable for equal timestamps.
pub fn sort_readings(readings: &mut [SmartMeterReading]) {
    readings.sort_by_key(|reading| reading.reading_date);
}

/// The cumulative total of a reading: the end value if present, otherwise the plain reading.
pub fn pick_total(reading: &SmartMeterReading) -> Option<f64> {
    reading.reading_end.or(reading.reading)
}

/// Consumption since the start of the local calendar day of `latest_timestamp`.
///
/// `readings` must already be sorted. The baseline is the latest reading taken at or
/// before local midnight that carries a total. Returns `None` when there is no such
/// baseline yet, or when the delta would be negative (meter reset, out-of-order data).
pub fn calculate_daily_consumption<Tz: TimeZone>(
    readings: &[SmartMeterReading],
    latest_timestamp: Option<DateTime<Utc>>,
    tz: &Tz,
) -> Option<f64> {
    let latest_timestamp = latest_timestamp?;
    let latest_total = pick_total(readings.last()?)?;

    let local_date = latest_timestamp.with_timezone(tz).date_naive();
    let day_start = local_start_of_day(local_date, tz)?;

    let Some(baseline_total) = readings
        .iter()
        .rev()
        .filter(|reading| reading.reading_date <= day_start)
        .find_map(pick_total)
    else {
        debug!(%day_start, "No baseline reading before start of day");
        return None;
    };

    let consumption = latest_total - baseline_total;
    if consumption < 0.0 {
        debug!(consumption, "Ignoring negative consumption derived from readings");
        return None;
    }
    Some(consumption)
}

/// Derives the published snapshot from one readings response.
pub fn build_consumption_data<Tz: TimeZone>(
    result: SmartMeterReadingsResult,
    configured_meter: &str,
    tz: &Tz,
) -> ConsumptionData {
    if !result.errors.is_empty() {
        debug!(errors = ?result.errors, "Tallinna Vesi API reported errors");
    }

    let mut readings = result.readings;
    sort_readings(&mut readings);

    let latest_total = readings.last().and_then(pick_total);
    let latest_timestamp = readings.last().map(|reading| reading.reading_date);
    let daily_consumption = calculate_daily_consumption(&readings, latest_timestamp, tz);

    ConsumptionData {
        meter_number: result
            .meter_number
            .unwrap_or_else(|| configured_meter.to_string()),
        supply_point_id: result.supply_point_id,
        latest_total,
        latest_timestamp,
        daily_consumption,
        readings,
    }
}
