use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::ApiError;
use crate::models::{ReadingOverview, SmartMeterReading, SmartMeterReadingsResult, SupplyPoint};
use crate::payload::{
    coerce_float, coerce_string, format_window_start, multi_get, parse_datetime,
    parse_overview_date,
};

pub const API_BASE_URL: &str = "https://klient.tallinnavesi.ee";
pub const READINGS_OVERVIEW_ENDPOINT: &str = "/api/Readings";
pub const SMART_METER_READINGS_ENDPOINT: &str = "/api/SmartMeter/GetSmartMeterReadings";
pub const SMART_METER_SUPPLY_POINTS_ENDPOINT: &str =
    "/api/SmartMeter/GetSupplyPointsWithSmartMeter";

const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the Tallinna Vesi customer API.
///
/// The `reqwest::Client` is meant to be shared between every configured meter.
#[derive(Clone)]
pub struct TallinnaVesiAPI<Tz: TimeZone = Local> {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    /// Timezone used to interpret date-only values of the overview endpoint.
    timezone: Tz,
}

impl TallinnaVesiAPI<Local> {
    pub fn new(client: reqwest::Client, api_key: &str) -> Self {
        Self::with_base_url(client, API_BASE_URL, api_key, Local)
    }
}

impl<Tz: TimeZone> TallinnaVesiAPI<Tz> {
    pub fn with_base_url(
        client: reqwest::Client,
        base_url: &str,
        api_key: &str,
        timezone: Tz,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
            timezone,
        }
    }

    pub fn timezone(&self) -> &Tz {
        &self.timezone
    }

    /// Lists the supply points with a smart meter available to the API key.
    pub async fn get_supply_points(&self) -> Result<Vec<SupplyPoint>, ApiError> {
        let payload = self.request(SMART_METER_SUPPLY_POINTS_ENDPOINT, &[]).await?;
        let supply_points = payload
            .as_array()
            .map(|items| items.iter().map(parse_supply_point).collect())
            .unwrap_or_default();
        Ok(supply_points)
    }

    /// Fetches the last manual or smart reading of every meter.
    pub async fn get_overview_readings(&self) -> Result<Vec<ReadingOverview>, ApiError> {
        let payload = self.request(READINGS_OVERVIEW_ENDPOINT, &[]).await?;
        let overview = multi_get(&payload, &["Results", "results"])
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| parse_overview(item, &self.timezone))
                    .collect()
            })
            .unwrap_or_default();
        Ok(overview)
    }

    /// Fetches smart meter readings starting at `from`, or the full history when `from` is `None`.
    pub async fn get_readings<FromTz: TimeZone>(
        &self,
        meter_number: &str,
        from: Option<DateTime<FromTz>>,
    ) -> Result<SmartMeterReadingsResult, ApiError> {
        let mut query = vec![("meterNr", meter_number.to_string())];
        if let Some(from) = from {
            query.push(("from", format_window_start(&from)));
        }

        let payload = self.request(SMART_METER_READINGS_ENDPOINT, &query).await?;
        Ok(parse_readings_result(&payload))
    }

    #[instrument(skip(self, query))]
    async fn request(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        let api_key = HeaderValue::from_str(&self.api_key).map_err(|_| ApiError::InvalidApiKey)?;

        let response = self
            .client
            .get(format!("{}{}", self.base_url, endpoint))
            .header(API_KEY_HEADER, api_key)
            .query(query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Authentication);
        }
        if status.as_u16() >= 400 {
            return Err(ApiError::Status {
                status: status.as_u16(),
            });
        }

        let payload = response.json().await?;
        debug!(%status, "Tallinna Vesi request succeeded");
        Ok(payload)
    }
}

fn parse_supply_point(item: &Value) -> SupplyPoint {
    SupplyPoint {
        meter_number: coerce_string(multi_get(item, &["MeterNr", "meterNr"])),
        supply_point_id: coerce_string(multi_get(item, &["SupplyPointId", "supplyPointId"])),
        object_id: coerce_string(multi_get(item, &["ObjectId", "objectId"])),
        address: coerce_string(multi_get(item, &["Address", "address"])),
    }
}

fn parse_overview<Tz: TimeZone>(item: &Value, tz: &Tz) -> ReadingOverview {
    ReadingOverview {
        address: coerce_string(multi_get(item, &["Address", "address"])),
        meter_number: coerce_string(multi_get(item, &["MeterNr", "meterNr"])),
        meter_type: coerce_string(multi_get(item, &["MeterType", "meterType"])),
        last_reading: coerce_float(multi_get(item, &["LastReading", "lastReading"])),
        last_reading_date: parse_overview_date(
            multi_get(item, &["LastReadingDate", "lastReadingDate"]),
            tz,
        ),
    }
}

/// Entries whose date cannot be parsed are dropped.
fn parse_reading(item: &Value) -> Option<SmartMeterReading> {
    let raw_date = multi_get(item, &["ReadingDate", "readingDate"]);
    let Some(reading_date) = raw_date.and_then(Value::as_str).and_then(parse_datetime) else {
        debug!(date = ?raw_date, "Dropping reading with unparsable date");
        return None;
    };
    Some(SmartMeterReading {
        reading: coerce_float(multi_get(item, &["Reading", "reading"])),
        reading_end: coerce_float(multi_get(item, &["ReadingEnd", "readingEnd"])),
        reading_date,
    })
}

fn parse_readings_result(payload: &Value) -> SmartMeterReadingsResult {
    let readings = multi_get(payload, &["Readings", "readings"])
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_reading).collect())
        .unwrap_or_default();
    let errors = multi_get(payload, &["Errors", "errors"])
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|error| match error {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    SmartMeterReadingsResult {
        readings,
        meter_number: coerce_string(multi_get(payload, &["MeterNr", "meterNr"])),
        supply_point_id: coerce_string(multi_get(payload, &["SupplyPointId", "supplyPointId"])),
        errors,
    }
}

/// Window start sent with every poll: `now` minus `days`.
pub fn window_start(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - chrono::Duration::days(days)
}
