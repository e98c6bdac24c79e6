use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const HOURS_PER_DAY: usize = 24;
pub const DAYS_PER_WEEK: usize = 7;

/// Bearer token for the vendor API plus its absolute expiry.
///
/// Owned by the credential gate; callers borrow it for the duration of one
/// API call and never persist it themselves.
#[derive(Debug, Clone)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// True when the token expires within `margin` of `now` (or already has).
    pub fn expires_within(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + margin
    }
}

/// Hold the device reports as currently running.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeviceHold {
    pub temperature: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub name: String,
    pub temperature: Option<f64>,
}

/// Snapshot of the thermostat as reported by the vendor API.
#[derive(Debug, Clone, Serialize)]
pub struct ThermostatState {
    pub identifier: String,
    pub name: String,
    pub model: Option<String>,
    pub actual_temperature: f64,
    pub current_hold: Option<DeviceHold>,
    pub desired_heat: Option<i32>,
    pub sensors: Vec<SensorReading>,
}

/// The two named program slots the device alternates between. The program
/// only gives the device a complete named schedule to fall back on; actual
/// setpoints are enforced through holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClimateSlot {
    Night,
    Day,
}

impl ClimateSlot {
    pub fn climate_ref(self) -> &'static str {
        match self {
            ClimateSlot::Night => "night",
            ClimateSlot::Day => "day",
        }
    }
}

/// Device-side climate program: one slot per hour for the full week,
/// Monday-first (`chrono::Weekday::num_days_from_monday` ordering).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClimateProgram {
    pub slots: [[ClimateSlot; HOURS_PER_DAY]; DAYS_PER_WEEK],
}

impl ClimateProgram {
    pub fn slot(&self, day: usize, hour: usize) -> ClimateSlot {
        self.slots[day][hour]
    }
}
