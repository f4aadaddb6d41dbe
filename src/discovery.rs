use std::collections::HashMap;

use chrono::TimeZone;
use serde_derive::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::models::ReadingOverview;
use crate::tallinna_vesi::TallinnaVesiAPI;

/// Why setup could not find a meter to poll.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid API key")]
    InvalidAuth,
    #[error("cannot connect to Tallinna Vesi: {0}")]
    CannotConnect(#[source] ApiError),
    #[error("no smart meter found for this API key")]
    NoSmartMeter,
    #[error("no supply points with a smart meter found for this API key")]
    NoSupplyPoints,
    #[error("meter `{0}` is not among the discovered meters")]
    UnknownMeter(String),
    #[error("several meters found, choose one of: {}", .0.join(", "))]
    Ambiguous(Vec<String>),
}

/// A smart meter the API key can read, as offered during setup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterCandidate {
    pub supply_point_id: Option<String>,
    pub meter_number: Option<String>,
    pub address: Option<String>,
}

impl MeterCandidate {
    pub fn display_name(&self) -> String {
        match (&self.address, &self.meter_number) {
            (Some(address), Some(meter)) => format!("{address} ({meter})"),
            (Some(address), None) => address.clone(),
            (None, Some(meter)) => meter.clone(),
            (None, None) => "Smart meter".to_string(),
        }
    }

    pub fn title(&self) -> String {
        self.address
            .clone()
            .or_else(|| self.meter_number.clone())
            .unwrap_or_else(|| "Tallinna Vesi".to_string())
    }

    /// Stable identity of the connection, used as the base of sensor ids.
    pub fn unique_id(&self) -> Option<&str> {
        self.supply_point_id
            .as_deref()
            .or(self.meter_number.as_deref())
    }
}

/// Validates the API key and lists the smart meters it can poll.
pub async fn discover_meters<Tz: TimeZone>(
    api: &TallinnaVesiAPI<Tz>,
) -> Result<Vec<MeterCandidate>, DiscoveryError> {
    let overview = api.get_overview_readings().await.map_err(|err| {
        if err.is_authentication() {
            DiscoveryError::InvalidAuth
        } else {
            DiscoveryError::CannotConnect(err)
        }
    })?;
    let smart_overview: Vec<ReadingOverview> =
        overview.into_iter().filter(ReadingOverview::is_smart).collect();
    if smart_overview.is_empty() {
        return Err(DiscoveryError::NoSmartMeter);
    }

    let supply_points = api
        .get_supply_points()
        .await
        .map_err(DiscoveryError::CannotConnect)?;
    if supply_points.is_empty() {
        return Err(DiscoveryError::NoSupplyPoints);
    }

    let overview_by_meter: HashMap<&str, &ReadingOverview> = smart_overview
        .iter()
        .filter_map(|item| Some((item.meter_number.as_deref()?, item)))
        .collect();
    debug!(
        n_smart = overview_by_meter.len(),
        n_supply_points = supply_points.len(),
        "Matching supply points against smart meters"
    );

    let candidates: Vec<MeterCandidate> = if overview_by_meter.is_empty() {
        supply_points
            .into_iter()
            .map(|supply_point| MeterCandidate {
                supply_point_id: supply_point.supply_point_id,
                meter_number: supply_point.meter_number,
                address: supply_point.address,
            })
            .collect()
    } else {
        supply_points
            .into_iter()
            .filter_map(|supply_point| {
                let overview = overview_by_meter.get(supply_point.meter_number.as_deref()?)?;
                Some(MeterCandidate {
                    address: supply_point.address.or_else(|| overview.address.clone()),
                    supply_point_id: supply_point.supply_point_id,
                    meter_number: supply_point.meter_number,
                })
            })
            .collect()
    };

    if candidates.is_empty() {
        return Err(DiscoveryError::NoSupplyPoints);
    }
    info!(n_meters = candidates.len(), "Discovered smart meters");
    Ok(candidates)
}

/// Picks the meter to poll, by meter number or display name.
///
/// Without a choice a lone candidate is taken; several candidates require one.
pub fn select_meter(
    candidates: &[MeterCandidate],
    choice: Option<&str>,
) -> Result<MeterCandidate, DiscoveryError> {
    match choice {
        Some(choice) => candidates
            .iter()
            .find(|candidate| {
                candidate.meter_number.as_deref() == Some(choice)
                    || candidate.display_name() == choice
            })
            .cloned()
            .ok_or_else(|| DiscoveryError::UnknownMeter(choice.to_string())),
        None => match candidates {
            [] => Err(DiscoveryError::NoSupplyPoints),
            [single] => Ok(single.clone()),
            several => Err(DiscoveryError::Ambiguous(
                several.iter().map(MeterCandidate::display_name).collect(),
            )),
        },
    }
}
