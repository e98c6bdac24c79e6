pub mod auth;
pub mod client;
pub mod error;
pub mod types;

pub use auth::{AuthProvider, CommandLoginProvider, TokenCache};
pub use client::{ThermostatApi, VendorClient};
pub use error::{ApiError, AuthFailure};
pub use types::{ClimateProgram, ClimateSlot, Credential, DeviceHold, SensorReading, ThermostatState};
