use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::booking::BookingError;
use crate::policy::LifecyclePolicy;

/// Settings consumed by slot generation and the booking coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfig {
    /// Step between candidate start times; independent of service duration.
    pub slot_granularity_minutes: u32,
    /// Used when neither the service nor the staff override sets a duration.
    pub default_service_duration_minutes: u32,
    pub policy: LifecyclePolicy,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            slot_granularity_minutes: 15,
            default_service_duration_minutes: 30,
            policy: LifecyclePolicy::default(),
        }
    }
}

impl BookingConfig {
    pub fn validate(&self) -> Result<(), BookingError> {
        if self.slot_granularity_minutes == 0 {
            return Err(BookingError::InvalidConfig("slot granularity must be positive"));
        }
        if self.default_service_duration_minutes == 0 {
            return Err(BookingError::InvalidConfig(
                "default service duration must be positive",
            ));
        }
        self.policy.validate()
    }
}

/// Process-level settings for the maintenance daemon.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub catalog_path: Option<PathBuf>,
    pub sweep_interval_secs: u64,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub booking: BookingConfig,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = BookingConfig::default();
        let booking = BookingConfig {
            slot_granularity_minutes: env_or(
                "SLOTBOOK_SLOT_GRANULARITY_MINUTES",
                defaults.slot_granularity_minutes,
            ),
            default_service_duration_minutes: env_or(
                "SLOTBOOK_DEFAULT_DURATION_MINUTES",
                defaults.default_service_duration_minutes,
            ),
            policy: LifecyclePolicy {
                min_lead_minutes: env_or("SLOTBOOK_MIN_LEAD_MINUTES", defaults.policy.min_lead_minutes),
                max_lead_days: env_or("SLOTBOOK_MAX_LEAD_DAYS", defaults.policy.max_lead_days),
                cancellation_cutoff_minutes: env_or(
                    "SLOTBOOK_CANCELLATION_CUTOFF_MINUTES",
                    defaults.policy.cancellation_cutoff_minutes,
                ),
                incomplete_hold_minutes: env_or(
                    "SLOTBOOK_INCOMPLETE_HOLD_MINUTES",
                    defaults.policy.incomplete_hold_minutes,
                ),
            },
        };

        Self {
            data_dir: PathBuf::from(
                std::env::var("SLOTBOOK_DATA_DIR").unwrap_or_else(|_| "./data".into()),
            ),
            catalog_path: std::env::var("SLOTBOOK_CATALOG").ok().map(PathBuf::from),
            sweep_interval_secs: env_or("SLOTBOOK_SWEEP_INTERVAL_SECS", 900),
            compact_threshold: env_or("SLOTBOOK_COMPACT_THRESHOLD", 1000),
            metrics_port: std::env::var("SLOTBOOK_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
            booking,
        }
    }
}
