use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::AuthFailure;
use crate::types::Credential;

/// Session acquisition seam. The production implementation drives an
/// external login helper (the browser-automation flow lives outside this
/// repo); tests use in-memory fakes.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn login(&self) -> Result<Credential, AuthFailure>;
}

/// On-disk credential cache, rewritten wholesale by the login helper on
/// every refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCache {
    pub jwt_token: String,
    pub token_expires_at: DateTime<Utc>,
    pub last_refreshed: Option<DateTime<Utc>>,
}

impl TokenCache {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading token cache {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing token cache {}", path.display()))
    }

    pub fn credential(&self) -> Credential {
        Credential {
            token: self.jwt_token.clone(),
            expires_at: self.token_expires_at,
        }
    }
}

/// Runs the configured login helper command under a timeout, then reads
/// the token cache the helper wrote. Without a configured command the
/// provider only re-reads the cache, for deployments where an external
/// process keeps it fresh.
pub struct CommandLoginProvider {
    command: Option<Vec<String>>,
    cache_path: PathBuf,
    timeout: Duration,
}

impl CommandLoginProvider {
    pub fn new(command: Option<String>, cache_path: PathBuf, timeout: Duration) -> Self {
        let command = command
            .map(|line| line.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|parts: &Vec<String>| !parts.is_empty());
        Self {
            command,
            cache_path,
            timeout,
        }
    }

    async fn run_helper(&self, command: &[String]) -> Result<(), AuthFailure> {
        info!(helper = %command[0], "running login helper");
        let mut child = tokio::process::Command::new(&command[0])
            .args(&command[1..])
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AuthFailure(format!("failed to spawn login helper: {e}")))?;

        let status = tokio::time::timeout(self.timeout, child.wait())
            .await
            .map_err(|_| {
                AuthFailure(format!(
                    "login helper timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| AuthFailure(format!("login helper failed: {e}")))?;

        if !status.success() {
            return Err(AuthFailure(format!("login helper exited with {status}")));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthProvider for CommandLoginProvider {
    async fn login(&self) -> Result<Credential, AuthFailure> {
        match &self.command {
            Some(command) => self.run_helper(command).await?,
            None => warn!("no login helper configured, re-reading token cache"),
        }

        let cache = TokenCache::load(&self.cache_path)
            .map_err(|e| AuthFailure(format!("no usable token cache after login: {e:#}")))?;
        let credential = cache.credential();
        if !credential.is_valid_at(Utc::now()) {
            return Err(AuthFailure(format!(
                "cached token expired at {}",
                credential.expires_at
            )));
        }
        info!(expires_at = %credential.expires_at, "credential refreshed");
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn write_cache(dir: &tempfile::TempDir, expires_in: ChronoDuration) -> PathBuf {
        let path = dir.path().join("jwt.json");
        let cache = TokenCache {
            jwt_token: "cached-token".to_string(),
            token_expires_at: Utc::now() + expires_in,
            last_refreshed: Some(Utc::now()),
        };
        std::fs::write(&path, serde_json::to_vec(&cache).unwrap()).unwrap();
        path
    }

    #[test]
    fn cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cache(&dir, ChronoDuration::hours(1));
        let cache = TokenCache::load(&path).unwrap();
        assert_eq!(cache.jwt_token, "cached-token");
        assert!(cache.credential().is_valid_at(Utc::now()));
    }

    #[tokio::test]
    async fn commandless_provider_reads_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cache(&dir, ChronoDuration::hours(1));
        let provider = CommandLoginProvider::new(None, path, Duration::from_secs(5));
        let credential = provider.login().await.unwrap();
        assert_eq!(credential.token, "cached-token");
    }

    #[tokio::test]
    async fn expired_cache_is_an_auth_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cache(&dir, ChronoDuration::seconds(-10));
        let provider = CommandLoginProvider::new(None, path, Duration::from_secs(5));
        let err = provider.login().await.unwrap_err();
        assert!(err.0.contains("expired"));
    }

    #[tokio::test]
    async fn missing_cache_is_an_auth_failure() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CommandLoginProvider::new(
            None,
            dir.path().join("missing.json"),
            Duration::from_secs(5),
        );
        assert!(provider.login().await.is_err());
    }

    #[tokio::test]
    async fn failing_helper_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_cache(&dir, ChronoDuration::hours(1));
        let provider =
            CommandLoginProvider::new(Some("false".to_string()), path, Duration::from_secs(5));
        let err = provider.login().await.unwrap_err();
        assert!(err.0.contains("exited"));
    }
}
