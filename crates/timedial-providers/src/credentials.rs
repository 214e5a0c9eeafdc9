//! API key sources and the single-retry credential policy.
//!
//! A credential failure (missing key, an HTTP 403/404 from the provider, or a
//! provider message mentioning the API key) triggers exactly one re-resolution of the key and
//! one retry. Any other failure is returned as-is.

use std::future::Future;
use std::sync::RwLock;

use thiserror::Error;
use tracing::{info, warn};

use timedial_core::config::GoogleConfig;

/// Error text used when no key can be resolved.
pub const MISSING_KEY: &str = "API key is missing";

pub trait KeySource: Send + Sync {
    /// The key to use for the next request.
    fn current(&self) -> Option<String>;

    /// Re-resolve the key after a credential failure.
    fn refresh(&self) -> Option<String>;
}

/// A fixed key. Refreshing returns the same value.
pub struct StaticKey(pub Option<String>);

impl KeySource for StaticKey {
    fn current(&self) -> Option<String> {
        self.0.clone()
    }

    fn refresh(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Resolves the Gemini key from config and environment, caching the result
/// until a credential failure forces a fresh lookup.
pub struct ConfigKeySource {
    config: GoogleConfig,
    cached: RwLock<Option<String>>,
}

impl ConfigKeySource {
    pub fn new(config: GoogleConfig) -> Self {
        Self {
            config,
            cached: RwLock::new(None),
        }
    }
}

impl KeySource for ConfigKeySource {
    fn current(&self) -> Option<String> {
        if let Ok(guard) = self.cached.read() {
            if let Some(key) = guard.as_ref() {
                return Some(key.clone());
            }
        }
        self.refresh()
    }

    fn refresh(&self) -> Option<String> {
        let key = self.config.resolve_api_key();
        if let Ok(mut guard) = self.cached.write() {
            *guard = key.clone();
        }
        key
    }
}

/// A non-success HTTP response from the provider.
#[derive(Debug, Error)]
#[error("Gemini API error {status}: {body}")]
pub struct ProviderStatusError {
    pub status: u16,
    pub body: String,
}

/// Whether an error looks like a missing or rejected credential.
pub fn is_credential_error(err: &anyhow::Error) -> bool {
    if let Some(e) = err.downcast_ref::<ProviderStatusError>() {
        if matches!(e.status, 403 | 404) {
            return true;
        }
    }
    format!("{err:#}").contains("API key")
}

/// Run `op` with the current key; on a credential error, refresh once and retry.
pub async fn with_credential_retry<T, F, Fut>(keys: &dyn KeySource, op: F) -> anyhow::Result<T>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let first = match keys.current() {
        Some(key) => op(key).await,
        None => Err(anyhow::anyhow!(MISSING_KEY)),
    };

    let err = match first {
        Ok(value) => return Ok(value),
        Err(e) if is_credential_error(&e) => e,
        Err(e) => return Err(e),
    };

    warn!(error = %err, "Credential error, re-resolving key and retrying once");
    let key = keys.refresh().ok_or_else(|| anyhow::anyhow!(MISSING_KEY))?;
    let result = op(key).await;
    if result.is_ok() {
        info!("Retry after credential refresh succeeded");
    }
    result
}
