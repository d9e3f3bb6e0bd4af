//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    #[serde(default)]
    pub service: RawServiceConfig,

    #[serde(default)]
    pub leasing: RawLeasingConfig,

    #[serde(default)]
    pub expiry: RawExpiryConfig,

    #[serde(default)]
    pub rotation: RawRotationConfig,

    #[serde(default)]
    pub guard: RawGuardConfig,

    #[serde(default)]
    pub marketplace: RawMarketplaceConfig,

    #[serde(default)]
    pub notify: RawNotifyConfig,
}

/// Daemon-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path (default: $XDG_RUNTIME_DIR/lessord/lessord.sock)
    pub socket_path: Option<PathBuf>,

    /// Data directory for the store (default: $XDG_DATA_HOME/lessord)
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawLeasingConfig {
    /// Duration given to new inventory rows and manual assignments
    pub default_duration_hours: Option<u32>,

    /// Forward offset applied to every lease start stamp
    pub lease_start_offset_minutes: Option<u32>,

    /// Hours added to every active lease of a buyer who leaves a review
    pub review_bonus_hours: Option<u32>,

    /// Longest total duration a single lease may reach
    pub max_lease_hours: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawExpiryConfig {
    pub sweep_interval_seconds: Option<u64>,

    /// Lower bound of the expiry warning window
    pub warn_min_minutes: Option<u32>,

    /// Upper bound of the expiry warning window
    pub warn_max_minutes: Option<u32>,

    /// Duration written back to rows after a successful rotation
    pub reset_duration_hours: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRotationConfig {
    /// Length of generated secrets (minimum 8)
    pub secret_length: Option<usize>,

    /// argv of the external helper that changes a secret at the provider
    pub change_command: Option<Vec<String>>,
}

/// Encoding of the two-factor shared secret stored in credential files
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretEncoding {
    /// Authenticator exports (`.maFile`) store `shared_secret` in base64,
    /// so this is the default
    #[default]
    Base64,
    /// RFC 4648 base32, as handed out by generic TOTP enrolment
    Base32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawGuardConfig {
    pub secret_encoding: Option<SecretEncoding>,

    /// Endpoint answering with the provider's server time
    pub time_url: Option<String>,

    pub time_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawMarketplaceConfig {
    /// Delay between two polls of the marketplace feed
    pub poll_delay_seconds: Option<u64>,

    /// Chat text requesting guard codes
    pub code_command: Option<String>,

    /// Chat text asking for a human operator
    pub operator_command: Option<String>,

    /// Chat text asking for stock of the viewed listing
    pub stock_command: Option<String>,

    /// Word preceding the buyer id in review notifications
    pub feedback_buyer_marker: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawNotifyConfig {
    /// Administrator chat id
    pub admin_id: Option<String>,

    /// Webhook receiving `{recipient, text}` JSON; log-only when absent
    pub webhook_url: Option<String>,
}
