//! Validated settings structures

use crate::schema::{
    RawConfig, RawExpiryConfig, RawGuardConfig, RawLeasingConfig, RawMarketplaceConfig,
    RawNotifyConfig, RawRotationConfig, RawServiceConfig, SecretEncoding,
};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DURATION_HOURS: u32 = 1;
pub const DEFAULT_LEASE_START_OFFSET_MINUTES: u32 = 10;
pub const DEFAULT_REVIEW_BONUS_HOURS: u32 = 1;
pub const DEFAULT_MAX_LEASE_HOURS: u32 = 24 * 30;
/// Upper bound accepted for `max_lease_hours` (ten years)
pub const MAX_LEASE_HOURS_CEILING: u32 = 24 * 365 * 10;
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;
pub const DEFAULT_WARN_MIN_MINUTES: u32 = 6;
pub const DEFAULT_WARN_MAX_MINUTES: u32 = 12;
pub const DEFAULT_SECRET_LENGTH: usize = 12;
pub const MIN_SECRET_LENGTH: usize = 8;
pub const DEFAULT_TIME_URL: &str =
    "https://api.steampowered.com/ITwoFactorService/QueryTime/v0001";
pub const DEFAULT_TIME_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_POLL_DELAY_SECONDS: u64 = 8;
pub const DEFAULT_CODE_COMMAND: &str = "/code";
pub const DEFAULT_OPERATOR_COMMAND: &str = "/question";
pub const DEFAULT_STOCK_COMMAND: &str = "/stock";
pub const DEFAULT_FEEDBACK_BUYER_MARKER: &str = "Buyer";

/// Validated settings ready for use by the daemon and core workers
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub service: ServiceConfig,
    pub leasing: LeasingConfig,
    pub expiry: ExpiryConfig,
    pub rotation: RotationConfig,
    pub guard: GuardConfig,
    pub marketplace: MarketplaceConfig,
    pub notify: NotifyConfig,
}

impl Settings {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            leasing: LeasingConfig::from_raw(raw.leasing),
            expiry: ExpiryConfig::from_raw(raw.expiry),
            rotation: RotationConfig::from_raw(raw.rotation),
            guard: GuardConfig::from_raw(raw.guard),
            marketplace: MarketplaceConfig::from_raw(raw.marketplace),
            notify: NotifyConfig::from_raw(raw.notify),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw
                .socket_path
                .unwrap_or_else(lessor_util::default_socket_path),
            data_dir: raw.data_dir.unwrap_or_else(lessor_util::default_data_dir),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct LeasingConfig {
    pub default_duration_hours: u32,
    /// Added to `now` when a lease start is stamped
    pub lease_start_offset: chrono::Duration,
    pub review_bonus_hours: u32,
    /// No lease may be allocated, extended or credited beyond this
    pub max_lease_hours: u32,
}

impl LeasingConfig {
    fn from_raw(raw: RawLeasingConfig) -> Self {
        let offset_minutes = raw
            .lease_start_offset_minutes
            .unwrap_or(DEFAULT_LEASE_START_OFFSET_MINUTES);
        Self {
            default_duration_hours: raw.default_duration_hours.unwrap_or(DEFAULT_DURATION_HOURS),
            lease_start_offset: chrono::Duration::minutes(i64::from(offset_minutes)),
            review_bonus_hours: raw.review_bonus_hours.unwrap_or(DEFAULT_REVIEW_BONUS_HOURS),
            max_lease_hours: raw.max_lease_hours.unwrap_or(DEFAULT_MAX_LEASE_HOURS),
        }
    }
}

impl Default for LeasingConfig {
    fn default() -> Self {
        Self::from_raw(RawLeasingConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    pub sweep_interval: Duration,
    pub warn_min: chrono::Duration,
    pub warn_max: chrono::Duration,
    pub reset_duration_hours: u32,
}

impl ExpiryConfig {
    fn from_raw(raw: RawExpiryConfig) -> Self {
        Self {
            sweep_interval: Duration::from_secs(
                raw.sweep_interval_seconds
                    .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECONDS),
            ),
            warn_min: chrono::Duration::minutes(i64::from(
                raw.warn_min_minutes.unwrap_or(DEFAULT_WARN_MIN_MINUTES),
            )),
            warn_max: chrono::Duration::minutes(i64::from(
                raw.warn_max_minutes.unwrap_or(DEFAULT_WARN_MAX_MINUTES),
            )),
            reset_duration_hours: raw.reset_duration_hours.unwrap_or(DEFAULT_DURATION_HOURS),
        }
    }

    /// Whether `remaining` lies inside the expiry warning window
    pub fn in_warning_window(&self, remaining: chrono::Duration) -> bool {
        remaining >= self.warn_min && remaining <= self.warn_max
    }
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self::from_raw(RawExpiryConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct RotationConfig {
    pub secret_length: usize,
    /// Empty when no helper is configured; every rotation then fails
    pub change_command: Vec<String>,
}

impl RotationConfig {
    fn from_raw(raw: RawRotationConfig) -> Self {
        Self {
            secret_length: raw.secret_length.unwrap_or(DEFAULT_SECRET_LENGTH),
            change_command: raw.change_command.unwrap_or_default(),
        }
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self::from_raw(RawRotationConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub secret_encoding: SecretEncoding,
    pub time_url: String,
    pub time_timeout: Duration,
}

impl GuardConfig {
    fn from_raw(raw: RawGuardConfig) -> Self {
        Self {
            secret_encoding: raw.secret_encoding.unwrap_or_default(),
            time_url: raw.time_url.unwrap_or_else(|| DEFAULT_TIME_URL.to_string()),
            time_timeout: Duration::from_secs(
                raw.time_timeout_seconds
                    .unwrap_or(DEFAULT_TIME_TIMEOUT_SECONDS),
            ),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self::from_raw(RawGuardConfig::default())
    }
}

#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    pub poll_delay: Duration,
    pub code_command: String,
    pub operator_command: String,
    pub stock_command: String,
    pub feedback_buyer_marker: String,
}

impl MarketplaceConfig {
    fn from_raw(raw: RawMarketplaceConfig) -> Self {
        Self {
            poll_delay: Duration::from_secs(
                raw.poll_delay_seconds.unwrap_or(DEFAULT_POLL_DELAY_SECONDS),
            ),
            code_command: raw
                .code_command
                .unwrap_or_else(|| DEFAULT_CODE_COMMAND.into()),
            operator_command: raw
                .operator_command
                .unwrap_or_else(|| DEFAULT_OPERATOR_COMMAND.into()),
            stock_command: raw
                .stock_command
                .unwrap_or_else(|| DEFAULT_STOCK_COMMAND.into()),
            feedback_buyer_marker: raw
                .feedback_buyer_marker
                .unwrap_or_else(|| DEFAULT_FEEDBACK_BUYER_MARKER.into()),
        }
    }
}

impl Default for MarketplaceConfig {
    fn default() -> Self {
        Self::from_raw(RawMarketplaceConfig::default())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotifyConfig {
    pub admin_id: Option<String>,
    pub webhook_url: Option<String>,
}

impl NotifyConfig {
    fn from_raw(raw: RawNotifyConfig) -> Self {
        Self {
            admin_id: raw.admin_id,
            webhook_url: raw.webhook_url,
        }
    }
}
