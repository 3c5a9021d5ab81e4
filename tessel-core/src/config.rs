//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for a [`Runtime`](crate::Runtime).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```rust
/// use tessel_core::RuntimeConfig;
///
/// let config = RuntimeConfig::from_json(r#"{ "max_update_count": 10 }"#).unwrap();
/// assert_eq!(config.max_update_count, 10);
/// assert!(config.async_updates);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How many times a single watcher may run within one flush before the
    /// flush is aborted as a probable infinite update loop.
    pub max_update_count: u32,

    /// When false, dirty watchers are flushed synchronously instead of on
    /// the next tick.
    pub async_updates: bool,

    /// Upper bound on the number of ticks [`Runtime::run_until_idle`] drives.
    ///
    /// [`Runtime::run_until_idle`]: crate::Runtime::run_until_idle
    pub max_tick_rounds: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_update_count: 100,
            async_updates: true,
            max_tick_rounds: 1000,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
