//! Network policy for the hosted collaborators
//!
//! Both the LLM and the hosted store get an explicit per-attempt timeout and a
//! bounded retry with exponential backoff for transient failures.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/buddy/config/network.toml)
//! 2. Fall back to embedded defaults (compiled into binary)

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/network.toml");

/// Timeout and retry settings for one collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct CallPolicy {
    /// Timeout for a single attempt
    pub timeout: Duration,
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Wait before the first retry, doubled for each further retry
    pub backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

impl CallPolicy {
    /// A policy that never retries (useful in tests)
    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            timeout,
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Run `op` under this policy.
    ///
    /// Idempotent operations are retried on any transient failure. Other
    /// operations are retried only when the request never reached the
    /// collaborator, so a write is never applied twice.
    pub async fn run<T, F, Fut>(&self, service: &str, idempotent: bool, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(Error::Unavailable {
                    service: service.to_string(),
                    reason: format!("timed out after {}s", self.timeout.as_secs_f32()),
                }),
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let retryable = if idempotent {
                err.is_transient()
            } else {
                err.never_reached()
            };

            if !retryable || attempt >= self.max_retries {
                return Err(err);
            }

            let wait = self.backoff * 2u32.saturating_pow(attempt);
            attempt += 1;
            warn!(
                service = %service,
                attempt,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "Transient failure, retrying"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

/// Network policy for all collaborators
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    pub llm: CallPolicy,
    pub store: CallPolicy,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            llm: CallPolicy {
                timeout: Duration::from_secs(60),
                ..CallPolicy::default()
            },
            store: CallPolicy {
                timeout: Duration::from_secs(10),
                ..CallPolicy::default()
            },
        }
    }
}

impl NetworkConfig {
    /// Load config from the default override location, else the embedded defaults
    pub fn load() -> Result<Self> {
        load_config(default_config_path().as_deref())
    }

    /// Load config from a specific path (falls back to defaults if missing)
    pub fn with_config_path(path: &Path) -> Result<Self> {
        load_config(Some(path))
    }

    /// Like `load`, but never fails: a broken override is logged and ignored
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring unreadable network config, using defaults");
            parse_config(DEFAULT_CONFIG).unwrap_or_default()
        })
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("buddy").join("config").join("network.toml"))
}

fn load_config(path: Option<&Path>) -> Result<NetworkConfig> {
    let content = match path {
        Some(path) if path.exists() => fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?,
        _ => DEFAULT_CONFIG.to_string(),
    };
    parse_config(&content)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    llm: Option<RawPolicy>,
    store: Option<RawPolicy>,
}

#[derive(Debug, Deserialize)]
struct RawPolicy {
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    backoff_ms: Option<u64>,
}

impl RawPolicy {
    fn apply(self, base: CallPolicy) -> CallPolicy {
        CallPolicy {
            timeout: self
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(base.timeout),
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            backoff: self
                .backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(base.backoff),
        }
    }
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<NetworkConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid network config TOML: {}", e)))?;

    let mut config = NetworkConfig::default();
    if let Some(llm) = raw.llm {
        config.llm = llm.apply(config.llm);
    }
    if let Some(store) = raw.store {
        config.store = store.apply(config.store);
    }

    if config.llm.timeout.is_zero() || config.store.timeout.is_zero() {
        return Err(Error::Config("timeout_secs must be greater than zero".into()));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_embedded_defaults_parse() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.llm.timeout, Duration::from_secs(60));
        assert_eq!(config.store.timeout, Duration::from_secs(10));
        assert_eq!(config.llm.max_retries, 1);
        assert_eq!(config.store.backoff, Duration::from_millis(500));
    }

    #[test]
    fn test_partial_override() {
        let config = parse_config("[llm]\ntimeout_secs = 5\n").unwrap();
        assert_eq!(config.llm.timeout, Duration::from_secs(5));
        assert_eq!(config.llm.max_retries, 1);
        assert_eq!(config.store, NetworkConfig::default().store);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(matches!(
            parse_config("[store]\ntimeout_secs = 0\n"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_override_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = NetworkConfig::with_config_path(&dir.path().join("network.toml")).unwrap();
        assert_eq!(config, parse_config(DEFAULT_CONFIG).unwrap());
    }

    #[test]
    fn test_override_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.toml");
        fs::write(&path, "[store]\nmax_retries = 3\nbackoff_ms = 10\n").unwrap();
        let config = NetworkConfig::with_config_path(&path).unwrap();
        assert_eq!(config.store.max_retries, 3);
        assert_eq!(config.store.backoff, Duration::from_millis(10));
    }

    fn fast_policy(max_retries: u32) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_secs(1),
            max_retries,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_failure_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = fast_policy(1)
            .run("llm", true, || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(Error::Unavailable {
                            service: "llm".into(),
                            reason: "reset".into(),
                        })
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = fast_policy(1)
            .run("store", true, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Unreachable {
                        service: "store".into(),
                        reason: "refused".into(),
                    })
                }
            })
            .await;
        assert!(matches!(result, Err(Error::Unreachable { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_transient_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = fast_policy(3)
            .run("store", true, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Upstream {
                        service: "store".into(),
                        status: 401,
                        body: "invalid api key".into(),
                    })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_writes_only_retry_when_never_sent() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = fast_policy(3)
            .run("store", false, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Unavailable {
                        service: "store".into(),
                        reason: "timed out".into(),
                    })
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout_becomes_unavailable() {
        let policy = CallPolicy::no_retry(Duration::from_millis(20));
        let result: Result<()> = policy
            .run("llm", true, || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(Error::Unavailable { .. })));
    }
}
