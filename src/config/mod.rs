//! Pool configuration.
//!
//! [`PoolConfig`] is plain data: it derives serde so a host application can
//! embed it in its own configuration file, and every field has a default so
//! partial documents deserialize.

use crate::cache::DEFAULT_CAPACITY;
use crate::error::{PoolError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of workers used when none is configured: one per CPU core.
#[must_use]
pub fn default_pool_size() -> usize {
    num_cpus::get().max(1)
}

/// Settings for a [`Pool`](crate::Pool).
///
/// # Example
///
/// ```
/// use memopool::config::PoolConfig;
///
/// let config: PoolConfig = serde_json::from_str(r#"{"pool_size": 4}"#).unwrap();
/// assert_eq!(config.pool_size, 4);
/// assert!(config.caching_enabled);
/// assert_eq!(config.cache_capacity, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of concurrently live workers.
    pub pool_size: usize,
    /// Whether results are memoized.
    pub caching_enabled: bool,
    /// Maximum number of cached results.
    pub cache_capacity: usize,
    /// Upper bound on one task's execution, in milliseconds.
    pub task_timeout_ms: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            caching_enabled: true,
            cache_capacity: DEFAULT_CAPACITY,
            task_timeout_ms: None,
        }
    }
}

impl PoolConfig {
    /// Checks that every size is positive.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(PoolError::InvalidConfig {
                reason: "pool_size must be at least 1".to_string(),
            });
        }
        if self.cache_capacity == 0 {
            return Err(PoolError::InvalidConfig {
                reason: "cache_capacity must be at least 1".to_string(),
            });
        }
        if self.task_timeout_ms == Some(0) {
            return Err(PoolError::InvalidConfig {
                reason: "task_timeout_ms must be positive when set".to_string(),
            });
        }
        Ok(())
    }

    /// The task timeout as a [`Duration`].
    #[must_use]
    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_ms.map(Duration::from_millis)
    }
}
