use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::types::{
    ClimateProgram, Credential, DeviceHold, SensorReading, ThermostatState, DAYS_PER_WEEK,
    HOURS_PER_DAY,
};

pub const DEFAULT_BASE_URL: &str = "https://api.ecobee.com/1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Nominal temperature (°F) written into pushed program climates. The
/// program exists to give the device a complete named fallback schedule;
/// real setpoints are enforced through holds.
const PROGRAM_NOMINAL_TEMP: i32 = 67;

/// Calls against the thermostat vendor's API. The credential is borrowed
/// per call so token refresh stays the gate's concern.
#[async_trait]
pub trait ThermostatApi: Send + Sync {
    async fn get_state(&self, credential: &Credential) -> Result<ThermostatState, ApiError>;

    async fn set_hold(
        &self,
        credential: &Credential,
        temperature: i32,
        duration_minutes: u32,
    ) -> Result<(), ApiError>;

    async fn push_program(
        &self,
        credential: &Credential,
        program: &ClimateProgram,
    ) -> Result<(), ApiError>;
}

#[derive(Debug, Clone)]
pub struct VendorClient {
    base_url: String,
    client: Client,
}

impl VendorClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Transient(format!("failed to build http client: {e}")))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    async fn post_functions(&self, credential: &Credential, body: &Value) -> Result<(), ApiError> {
        let url = format!("{}/thermostat", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("format", "json")])
            .bearer_auth(&credential.token)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Transient(e.to_string()))?;

        http_guard(response.status())?;

        let result: Value = response
            .json()
            .await
            .map_err(|e| ApiError::Transient(format!("invalid response body: {e}")))?;
        body_guard(&result)
    }
}

#[async_trait]
impl ThermostatApi for VendorClient {
    async fn get_state(&self, credential: &Credential) -> Result<ThermostatState, ApiError> {
        let url = format!("{}/thermostat", self.base_url);
        let selection = json!({
            "selection": {
                "selectionType": "registered",
                "selectionMatch": "",
                "includeRuntime": true,
                "includeSettings": true,
                "includeEvents": true,
                "includeSensors": true,
            }
        });

        debug!(url = %url, "fetching thermostat state");
        let body = selection.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[("format", "json"), ("body", body.as_str())])
            .bearer_auth(&credential.token)
            .send()
            .await
            .map_err(|e| ApiError::Transient(e.to_string()))?;

        http_guard(response.status())?;

        let data: Value = response
            .json()
            .await
            .map_err(|e| ApiError::Transient(format!("invalid response body: {e}")))?;

        let thermostat = data["thermostatList"]
            .get(0)
            .ok_or_else(|| ApiError::Validation("no thermostats registered".to_string()))?;

        Ok(parse_thermostat(thermostat))
    }

    async fn set_hold(
        &self,
        credential: &Credential,
        temperature: i32,
        duration_minutes: u32,
    ) -> Result<(), ApiError> {
        let body = hold_body(temperature, duration_minutes);
        self.post_functions(credential, &body).await?;
        info!(temperature, duration_minutes, "hold set");
        Ok(())
    }

    async fn push_program(
        &self,
        credential: &Credential,
        program: &ClimateProgram,
    ) -> Result<(), ApiError> {
        let body = program_body(program);
        self.post_functions(credential, &body).await?;
        info!("climate program pushed");
        Ok(())
    }
}

fn http_guard(status: StatusCode) -> Result<(), ApiError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::Auth);
    }
    if status.is_server_error() {
        return Err(ApiError::Transient(format!("http {status}")));
    }
    if status.is_client_error() {
        return Err(ApiError::Validation(format!("http {status}")));
    }
    Ok(())
}

/// The API reports request-level failures inside a 200 response.
fn body_guard(result: &Value) -> Result<(), ApiError> {
    let code = result["status"]["code"].as_i64().unwrap_or(0);
    if code != 0 {
        let message = result["status"]["message"].as_str().unwrap_or("unknown");
        return Err(ApiError::Validation(format!("status {code}: {message}")));
    }
    Ok(())
}

fn registered_selection() -> Value {
    json!({
        "selectionType": "registered",
        "selectionMatch": "",
    })
}

fn hold_body(temperature: i32, duration_minutes: u32) -> Value {
    // Wire temperatures are °F × 10; holds shorter than an hour round up.
    let wire_temp = temperature * 10;
    let hold_hours = if duration_minutes >= 60 {
        duration_minutes / 60
    } else {
        1
    };
    json!({
        "selection": registered_selection(),
        "functions": [
            {
                "type": "setHold",
                "params": {
                    "holdType": "holdHours",
                    "holdHours": hold_hours,
                    "heatHoldTemp": wire_temp,
                    "coolHoldTemp": wire_temp,
                }
            }
        ]
    })
}

fn program_body(program: &ClimateProgram) -> Value {
    let wire_temp = PROGRAM_NOMINAL_TEMP * 10;
    let climates = json!([
        {
            "climateRef": "night",
            "name": "Night",
            "heatTemp": wire_temp,
            "coolTemp": wire_temp,
        },
        {
            "climateRef": "day",
            "name": "Day",
            "heatTemp": wire_temp,
            "coolTemp": wire_temp,
        }
    ]);

    // The device grid is 48 half-hour climateRef slots per day, Sunday
    // first; the program itself is hourly and Monday first.
    let mut schedule = Vec::with_capacity(DAYS_PER_WEEK);
    for wire_day in 0..DAYS_PER_WEEK {
        let day = (wire_day + 6) % DAYS_PER_WEEK;
        let mut refs = Vec::with_capacity(HOURS_PER_DAY * 2);
        for hour in 0..HOURS_PER_DAY {
            let slot = program.slot(day, hour).climate_ref();
            refs.push(slot);
            refs.push(slot);
        }
        schedule.push(refs);
    }

    json!({
        "selection": registered_selection(),
        "thermostat": {
            "program": {
                "climates": climates,
                "schedule": schedule,
            }
        }
    })
}

fn parse_thermostat(thermostat: &Value) -> ThermostatState {
    let runtime = &thermostat["runtime"];

    let current_hold = thermostat["events"].as_array().and_then(|events| {
        events
            .iter()
            .find(|e| e["running"].as_bool().unwrap_or(false) && e["type"] == "hold")
            .and_then(|e| {
                e["heatHoldTemp"]
                    .as_i64()
                    .or_else(|| e["coolHoldTemp"].as_i64())
            })
            .map(|wire| DeviceHold {
                temperature: (wire / 10) as i32,
            })
    });

    let sensors = thermostat["remoteSensors"]
        .as_array()
        .map(|sensors| {
            sensors
                .iter()
                .map(|s| SensorReading {
                    name: s["name"].as_str().unwrap_or("unknown").to_string(),
                    temperature: sensor_temperature(s),
                })
                .collect()
        })
        .unwrap_or_default();

    ThermostatState {
        identifier: thermostat["identifier"].as_str().unwrap_or_default().to_string(),
        name: thermostat["name"].as_str().unwrap_or_default().to_string(),
        model: thermostat["modelNumber"].as_str().map(str::to_string),
        actual_temperature: runtime["actualTemperature"].as_f64().unwrap_or(0.0) / 10.0,
        current_hold,
        desired_heat: runtime["desiredHeat"].as_f64().map(|v| (v / 10.0) as i32),
        sensors,
    }
}

fn sensor_temperature(sensor: &Value) -> Option<f64> {
    sensor["capability"].as_array().and_then(|caps| {
        caps.iter()
            .find(|c| c["type"] == "temperature")
            .and_then(|c| c["value"].as_str())
            .and_then(|raw| raw.parse::<f64>().ok())
            .map(|deci| deci / 10.0)
    })
}
