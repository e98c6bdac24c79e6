use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use thermostat_api::auth::AuthProvider;
use thermostat_api::error::AuthFailure;
use thermostat_api::types::Credential;

type LoginFuture = Shared<BoxFuture<'static, Result<Credential, AuthFailure>>>;

/// Holds at most one credential and coalesces concurrent refreshes into a
/// single login attempt whose outcome every waiter shares. Failed attempts
/// are never cached; the next call starts a fresh login.
pub struct CredentialGate<P> {
    provider: Arc<P>,
    margin: Duration,
    cached: RwLock<Option<Credential>>,
    inflight: Mutex<Option<LoginFuture>>,
}

impl<P: AuthProvider + 'static> CredentialGate<P> {
    pub fn new(provider: P, initial: Option<Credential>) -> Self {
        Self {
            provider: Arc::new(provider),
            // Refresh slightly before expiry so a credential handed out
            // here survives the API call it is borrowed for.
            margin: Duration::seconds(60),
            cached: RwLock::new(initial),
            inflight: Mutex::new(None),
        }
    }

    /// A currently-valid credential, refreshing through the provider when
    /// the cached one is absent or expiring.
    pub async fn current(&self) -> Result<Credential, AuthFailure> {
        if let Some(credential) = self.cached_valid().await {
            return Ok(credential);
        }

        let login = {
            let mut slot = self.inflight.lock().await;
            // A racing caller may have finished a refresh while we waited
            // for the slot.
            if let Some(credential) = self.cached_valid().await {
                return Ok(credential);
            }
            // Only a still-running attempt is joinable; a completed one is
            // stale and must not replay its result.
            let joinable = slot
                .as_ref()
                .filter(|login| login.peek().is_none())
                .cloned();
            match joinable {
                Some(login) => {
                    debug!("joining in-flight login");
                    login
                }
                None => {
                    let provider = Arc::clone(&self.provider);
                    let login: LoginFuture =
                        async move { provider.login().await }.boxed().shared();
                    *slot = Some(login.clone());
                    login
                }
            }
        };

        let result = login.clone().await;

        let mut slot = self.inflight.lock().await;
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&login)) {
            *slot = None;
        }
        if let Ok(credential) = &result {
            *self.cached.write().await = Some(credential.clone());
        }
        result
    }

    async fn cached_valid(&self) -> Option<Credential> {
        let cached = self.cached.read().await;
        cached
            .as_ref()
            .filter(|credential| !credential.expires_within(self.margin, Utc::now()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration as StdDuration;

    struct CountingProvider {
        logins: AtomicU32,
        fail: AtomicBool,
        token_lifetime: Duration,
    }

    impl CountingProvider {
        fn new(token_lifetime: Duration) -> Self {
            Self {
                logins: AtomicU32::new(0),
                fail: AtomicBool::new(false),
                token_lifetime,
            }
        }
    }

    #[async_trait]
    impl AuthProvider for CountingProvider {
        async fn login(&self) -> Result<Credential, AuthFailure> {
            let attempt = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(StdDuration::from_millis(50)).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(AuthFailure("login rejected".to_string()));
            }
            Ok(Credential {
                token: format!("token-{attempt}"),
                expires_at: Utc::now() + self.token_lifetime,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_login() {
        let gate = CredentialGate::new(CountingProvider::new(Duration::hours(1)), None);

        let (a, b, c, d) = tokio::join!(gate.current(), gate.current(), gate.current(), gate.current());
        let token = a.unwrap().token;
        assert_eq!(b.unwrap().token, token);
        assert_eq!(c.unwrap().token, token);
        assert_eq!(d.unwrap().token, token);
        assert_eq!(gate.provider.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn valid_credential_is_served_from_cache() {
        let gate = CredentialGate::new(CountingProvider::new(Duration::hours(1)), None);
        let first = gate.current().await.unwrap();
        let second = gate.current().await.unwrap();
        assert_eq!(first.token, second.token);
        assert_eq!(gate.provider.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expiring_credential_triggers_refresh() {
        // Tokens outlive the safety margin by nothing; every call refreshes.
        let gate = CredentialGate::new(CountingProvider::new(Duration::seconds(30)), None);
        gate.current().await.unwrap();
        gate.current().await.unwrap();
        assert_eq!(gate.provider.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_reaches_every_waiter_and_is_not_cached() {
        let gate = CredentialGate::new(CountingProvider::new(Duration::hours(1)), None);
        gate.provider.fail.store(true, Ordering::SeqCst);

        let (a, b, c) = tokio::join!(gate.current(), gate.current(), gate.current());
        assert!(a.is_err() && b.is_err() && c.is_err());
        assert_eq!(gate.provider.logins.load(Ordering::SeqCst), 1);

        // The failed attempt is not remembered; the next call retries.
        gate.provider.fail.store(false, Ordering::SeqCst);
        assert!(gate.current().await.is_ok());
        assert_eq!(gate.provider.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn primed_credential_avoids_initial_login() {
        let initial = Credential {
            token: "primed".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        let gate = CredentialGate::new(CountingProvider::new(Duration::hours(1)), Some(initial));
        assert_eq!(gate.current().await.unwrap().token, "primed");
        assert_eq!(gate.provider.logins.load(Ordering::SeqCst), 0);
    }
}
