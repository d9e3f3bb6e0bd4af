//! Configuration validation

use crate::schema::RawConfig;
use crate::settings::{
    DEFAULT_CODE_COMMAND, DEFAULT_MAX_LEASE_HOURS, DEFAULT_OPERATOR_COMMAND,
    DEFAULT_STOCK_COMMAND, DEFAULT_WARN_MAX_MINUTES, DEFAULT_WARN_MIN_MINUTES,
    MAX_LEASE_HOURS_CEILING, MIN_SECRET_LENGTH,
};
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("[{section}] {field}: {message}")]
    FieldError {
        section: &'static str,
        field: &'static str,
        message: String,
    },

    #[error("Global config error: {0}")]
    GlobalError(String),
}

fn field_error(
    section: &'static str,
    field: &'static str,
    message: impl Into<String>,
) -> ValidationError {
    ValidationError::FieldError {
        section,
        field,
        message: message.into(),
    }
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let leasing = &config.leasing;
    for (field, value) in [
        ("default_duration_hours", leasing.default_duration_hours),
        ("review_bonus_hours", leasing.review_bonus_hours),
    ] {
        if value == Some(0) {
            errors.push(field_error("leasing", field, "must be at least 1 hour"));
        }
    }

    let max_hours = leasing.max_lease_hours.unwrap_or(DEFAULT_MAX_LEASE_HOURS);
    if max_hours == 0 || max_hours > MAX_LEASE_HOURS_CEILING {
        errors.push(field_error(
            "leasing",
            "max_lease_hours",
            format!("must be between 1 and {MAX_LEASE_HOURS_CEILING}"),
        ));
    }
    for (section, field, value) in [
        ("leasing", "default_duration_hours", leasing.default_duration_hours),
        ("leasing", "review_bonus_hours", leasing.review_bonus_hours),
        ("expiry", "reset_duration_hours", config.expiry.reset_duration_hours),
    ] {
        if let Some(hours) = value
            && hours > max_hours
        {
            errors.push(field_error(
                section,
                field,
                format!("{hours} exceeds max_lease_hours ({max_hours})"),
            ));
        }
    }

    let expiry = &config.expiry;
    if expiry.sweep_interval_seconds == Some(0) {
        errors.push(field_error("expiry", "sweep_interval_seconds", "must be positive"));
    }
    if expiry.reset_duration_hours == Some(0) {
        errors.push(field_error("expiry", "reset_duration_hours", "must be at least 1 hour"));
    }
    let warn_min = expiry.warn_min_minutes.unwrap_or(DEFAULT_WARN_MIN_MINUTES);
    let warn_max = expiry.warn_max_minutes.unwrap_or(DEFAULT_WARN_MAX_MINUTES);
    if warn_min >= warn_max {
        errors.push(field_error(
            "expiry",
            "warn_min_minutes",
            format!("{warn_min} must be below warn_max_minutes ({warn_max})"),
        ));
    }

    if let Some(length) = config.rotation.secret_length {
        if length < MIN_SECRET_LENGTH {
            errors.push(field_error(
                "rotation",
                "secret_length",
                format!("{length} is below the minimum of {MIN_SECRET_LENGTH}"),
            ));
        }
    }
    if let Some(command) = &config.rotation.change_command {
        if command.first().map_or(true, |program| program.is_empty()) {
            errors.push(field_error("rotation", "change_command", "program cannot be empty"));
        }
    }

    if config.guard.time_timeout_seconds == Some(0) {
        errors.push(field_error("guard", "time_timeout_seconds", "must be positive"));
    }

    let marketplace = &config.marketplace;
    for (field, value) in [
        ("code_command", &marketplace.code_command),
        ("operator_command", &marketplace.operator_command),
        ("stock_command", &marketplace.stock_command),
        ("feedback_buyer_marker", &marketplace.feedback_buyer_marker),
    ] {
        if value.as_ref().is_some_and(|v| v.trim().is_empty()) {
            errors.push(field_error("marketplace", field, "cannot be empty"));
        }
    }

    let commands = [
        marketplace.code_command.as_deref().unwrap_or(DEFAULT_CODE_COMMAND),
        marketplace
            .operator_command
            .as_deref()
            .unwrap_or(DEFAULT_OPERATOR_COMMAND),
        marketplace.stock_command.as_deref().unwrap_or(DEFAULT_STOCK_COMMAND),
    ];
    for (i, a) in commands.iter().enumerate() {
        if commands[i + 1..].contains(a) {
            errors.push(ValidationError::GlobalError(format!(
                "chat command '{a}' is bound twice"
            )));
        }
    }

    if let Some(url) = &config.notify.webhook_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(field_error("notify", "webhook_url", "must be an http(s) URL"));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(content: &str) -> RawConfig {
        toml::from_str(content).unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&raw("config_version = 1")).is_empty());
    }

    #[test]
    fn inverted_warning_window() {
        let config = raw(
            r#"
            config_version = 1
            [expiry]
            warn_min_minutes = 12
            warn_max_minutes = 6
            "#,
        );

        let errors = validate_config(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("warn_min_minutes"));
    }

    #[test]
    fn zero_durations_rejected() {
        let config = raw(
            r#"
            config_version = 1
            [leasing]
            default_duration_hours = 0
            [expiry]
            reset_duration_hours = 0
            sweep_interval_seconds = 0
            "#,
        );

        assert_eq!(validate_config(&config).len(), 3);
    }

    #[test]
    fn durations_above_lease_cap_rejected() {
        let config = raw(
            r#"
            config_version = 1
            [leasing]
            max_lease_hours = 48
            default_duration_hours = 72
            review_bonus_hours = 49
            "#,
        );
        assert_eq!(validate_config(&config).len(), 2);

        let config = raw(
            r#"
            config_version = 1
            [leasing]
            max_lease_hours = 4294967295
            "#,
        );
        let errors = validate_config(&config);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("max_lease_hours"));
    }

    #[test]
    fn empty_change_command_rejected() {
        let config = raw(
            r#"
            config_version = 1
            [rotation]
            change_command = []
            "#,
        );

        assert_eq!(validate_config(&config).len(), 1);
    }

    #[test]
    fn duplicate_chat_command_rejected() {
        let config = raw(
            r#"
            config_version = 1
            [marketplace]
            code_command = "/x"
            stock_command = "/x"
            "#,
        );

        let errors = validate_config(&config);
        assert!(matches!(errors.as_slice(), [ValidationError::GlobalError(_)]));
    }
}
