//! Tallinna Vesi Water Library
//!
//! This library polls the Tallinna Vesi smart meter API, derives the cumulative and
//! daily water consumption of a meter, and exposes them as Home Assistant sensors.

pub mod config;
pub mod consumption;
pub mod diagnostics;
pub mod discovery;
pub mod error;
pub mod home_assistant;
pub mod models;
pub mod payload;
pub mod sensor;
pub mod tallinna_vesi;
pub mod water_coordinator;

// Re-export commonly used types for easier access
pub use error::{ApiError, UpdateError};
pub use models::{ConsumptionData, SmartMeterReading};
pub use tallinna_vesi::TallinnaVesiAPI;
pub use water_coordinator::{CoordinatorHandle, WaterDataCoordinator};
