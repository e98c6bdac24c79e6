use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use thermostat_api::auth::AuthProvider;
use thermostat_api::client::ThermostatApi;
use thermostat_api::error::ApiError;
use thermostat_api::types::ClimateProgram;

use crate::engine;
use crate::gate::CredentialGate;
use crate::health::HealthHandle;
use crate::program;
use crate::schedule::ScheduleStore;

/// Holds are refreshed on every cycle with this duration so the device
/// never falls back to its own program between ticks.
pub const HOLD_DURATION_MINUTES: u32 = 60;

/// Outcome of previous cycles. In-memory only; rebuilt from scratch on
/// restart, with `last_commanded` seeded from the device's reported hold
/// on the first cycle.
#[derive(Debug, Default)]
pub struct ReconciliationState {
    pub last_commanded: Option<i32>,
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub pushed_hash: Option<String>,
    pub pushed_program: Option<ClimateProgram>,
}

pub struct Reconciler<A, P> {
    store: ScheduleStore,
    api: A,
    gate: CredentialGate<P>,
    health: HealthHandle,
    state: ReconciliationState,
    seeded: bool,
}

impl<A, P> Reconciler<A, P>
where
    A: ThermostatApi,
    P: AuthProvider + 'static,
{
    pub fn new(store: ScheduleStore, api: A, gate: CredentialGate<P>, health: HealthHandle) -> Self {
        Self {
            store,
            api,
            gate,
            health,
            state: ReconciliationState::default(),
            seeded: false,
        }
    }

    /// One reconciliation cycle. Every failure is contained here: the
    /// caller only counts the outcome, and state is mutated strictly
    /// after the corresponding external call succeeds.
    async fn tick(&mut self) -> Result<()> {
        let now = Utc::now();

        let credential = match self.gate.current().await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "authentication failed, skipping cycle");
                return Err(e.into());
            }
        };
        self.health.set_token_expiry(credential.expires_at).await;

        // Snapshot the document; a racing external edit fails validation
        // here and the next cycle retries.
        let schedule = match self.store.load() {
            Ok(schedule) => schedule,
            Err(e) => {
                warn!(error = %e, "schedule unreadable this cycle");
                return Err(e.into());
            }
        };
        let table = schedule.complete();
        if !schedule.is_complete() {
            if let Err(e) = self.store.persist(&schedule.materialized()) {
                // The in-memory table stays authoritative until a write lands.
                warn!(error = %e, "could not persist gap-filled schedule");
            }
        }

        if !self.seeded {
            self.seeded = true;
            match self.api.get_state(&credential).await {
                Ok(state) => {
                    if let Some(hold) = state.current_hold {
                        info!(temperature = hold.temperature, "adopting device-reported hold");
                        self.state.last_commanded = Some(hold.temperature);
                    }
                }
                Err(e) => warn!(error = %e, "could not read device state"),
            }
        }

        // Re-push the climate program when the document changed since the
        // last successful push.
        let hash = program::content_hash(&schedule);
        if self.state.pushed_hash.as_deref() != Some(hash.as_str()) {
            let new_program = program::synthesize(&table);
            let changed = self
                .state
                .pushed_program
                .as_ref()
                .map_or(true, |previous| program::diff(previous, &new_program));
            info!(schedule_hash = %hash, program_changed = changed, "pushing climate program");
            if let Err(e) = self.api.push_program(&credential, &new_program).await {
                warn!(error = %e, "program push failed, will retry next cycle");
                return Err(e.into());
            }
            self.health.record_push().await;
            self.state.pushed_hash = Some(hash);
            self.state.pushed_program = Some(new_program);
        }

        // Refresh the hold every cycle, changed target or not, so it never
        // lapses between ticks.
        let target = engine::target_temperature(&table, now, schedule.timezone);
        self.health.set_expected(target).await;

        match self
            .api
            .set_hold(&credential, target, HOLD_DURATION_MINUTES)
            .await
        {
            Ok(()) => {
                self.state.last_commanded = Some(target);
                self.state.hold_expires_at =
                    Some(now + ChronoDuration::minutes(i64::from(HOLD_DURATION_MINUTES)));
                self.health.record_hold(target).await;
                info!(target, "hold refreshed");
                Ok(())
            }
            Err(ApiError::Validation(message)) => {
                error!(target, %message, "hold rejected, operator correction required");
                Err(ApiError::Validation(message).into())
            }
            Err(e) => {
                warn!(error = %e, "hold command failed, will retry next cycle");
                Err(e.into())
            }
        }
    }

    /// Run until the shutdown signal flips. Cycle failures are counted and
    /// absorbed; only the signal ends the loop.
    pub async fn run(mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        // An overrunning cycle delays the next one; cycles never overlap.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "reconciliation loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(()) => self.health.record_success().await,
                        Err(_) => self.health.record_failure().await,
                    }
                }
                _ = shutdown.changed() => {
                    info!("shutdown signal received, stopping loop");
                    break;
                }
            }
        }
    }
}
