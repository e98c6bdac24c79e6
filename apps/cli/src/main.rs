use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;

use thermostat_api::auth::TokenCache;
use thermostat_api::client::{ThermostatApi, VendorClient, DEFAULT_BASE_URL};
use thermostat_api::types::Credential;

const USAGE: &str = "Usage: thermostat-cli [status|get|set <temp>]";

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("{USAGE}");
    }

    let credential = load_credential()?;
    let base_url = env::var("API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let client = VendorClient::new(base_url)?;

    match args[1].as_str() {
        "status" => cmd_status(&client, &credential).await,
        "get" => cmd_get(&client, &credential).await,
        "set" => {
            let Some(raw) = args.get(2) else {
                bail!("Usage: thermostat-cli set <temperature>");
            };
            let target: i32 = raw
                .parse()
                .with_context(|| format!("invalid temperature {raw:?}"))?;
            cmd_set(&client, &credential, target).await
        }
        other => bail!("Unknown command: {other}\n{USAGE}"),
    }
}

fn load_credential() -> Result<Credential> {
    let path = PathBuf::from(
        env::var("TOKEN_CACHE_FILE").unwrap_or_else(|_| "data/jwt.json".to_string()),
    );
    let cache = TokenCache::load(&path).context("no usable token cache; run the login helper")?;
    let credential = cache.credential();
    if !credential.is_valid_at(Utc::now()) {
        eprintln!("Warning: cached token expired at {}", credential.expires_at);
    }
    Ok(credential)
}

async fn cmd_status(client: &VendorClient, credential: &Credential) -> Result<()> {
    let state = client.get_state(credential).await?;
    println!("Name:         {}", state.name);
    println!("Model:        {}", state.model.as_deref().unwrap_or("n/a"));
    println!("Actual temp:  {:.1}°F", state.actual_temperature);
    match state.current_hold {
        Some(hold) => println!("Active hold:  {}°F", hold.temperature),
        None => println!("Active hold:  none"),
    }
    for sensor in &state.sensors {
        match sensor.temperature {
            Some(t) => println!("  {:<20} {:.1}°F", sensor.name, t),
            None => println!("  {:<20} n/a", sensor.name),
        }
    }
    Ok(())
}

async fn cmd_get(client: &VendorClient, credential: &Credential) -> Result<()> {
    let state = client.get_state(credential).await?;
    let setting = state
        .current_hold
        .map(|hold| hold.temperature)
        .or(state.desired_heat);
    match setting {
        Some(t) => println!("Current setting: {t}°F"),
        None => bail!("could not determine current temperature setting"),
    }
    Ok(())
}

async fn cmd_set(client: &VendorClient, credential: &Credential, target: i32) -> Result<()> {
    if !(40..=90).contains(&target) {
        bail!("temperature {target}°F is out of safe range (40-90°F)");
    }
    println!("Setting temperature to {target}°F...");
    client.set_hold(credential, target, 60).await?;
    println!("Done: temperature set to {target}°F");
    Ok(())
}
