use std::time::Duration;

use oms_messaging::{KeyValue, keys};
use tracing::warn;

/// Recheck behavior of a [`super::MemoryTransactionBackend`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryBackendOptions {
    /// Minimum age of a half-message before it is rechecked.
    pub check_immunity: Duration,

    /// Period of the recheck timer.
    pub check_interval: Duration,

    /// Unknown answers tolerated before a half-message is discarded.
    pub max_check_times: u32,
}

impl Default for MemoryBackendOptions {
    fn default() -> Self {
        Self {
            check_immunity: Duration::from_secs(6),
            check_interval: Duration::from_secs(1),
            max_check_times: 15,
        }
    }
}

impl MemoryBackendOptions {
    /// Defaults overridden by the recheck keys found in `properties`.
    #[must_use]
    pub fn from_properties(properties: &KeyValue) -> Self {
        let mut options = Self::default();

        if let Some(immunity) = millis(properties, keys::TRANSACTION_CHECK_IMMUNITY_TIME) {
            options.check_immunity = immunity;
        }

        if let Some(interval) = millis(properties, keys::TRANSACTION_CHECK_INTERVAL) {
            if interval.is_zero() {
                warn!("ignoring zero {}", keys::TRANSACTION_CHECK_INTERVAL);
            } else {
                options.check_interval = interval;
            }
        }

        if let Some(times) = properties.get_int(keys::TRANSACTION_CHECK_MAX_TIMES) {
            match u32::try_from(times) {
                Ok(times) => options.max_check_times = times,
                Err(_) => warn!("ignoring negative {}", keys::TRANSACTION_CHECK_MAX_TIMES),
            }
        }

        options
    }
}

fn millis(properties: &KeyValue, key: &str) -> Option<Duration> {
    let value = properties.get_long(key)?;

    match u64::try_from(value) {
        Ok(value) => Some(Duration::from_millis(value)),
        Err(_) => {
            warn!("ignoring negative {key}");
            None
        }
    }
}
