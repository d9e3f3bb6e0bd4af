//! Config validation CLI tool
//!
//! Validates a lessord configuration file and reports any errors.

use lessor_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a lessord configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match lessor_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", lessor_config::CURRENT_CONFIG_VERSION);
            println!("  Socket: {}", settings.service.socket_path.display());
            println!("  Data dir: {}", settings.service.data_dir.display());
            println!(
                "  Lease defaults: {}h, start offset {} min, review bonus {}h",
                settings.leasing.default_duration_hours,
                settings.leasing.lease_start_offset.num_minutes(),
                settings.leasing.review_bonus_hours
            );
            println!(
                "  Expiry sweep: every {}s, warning {}-{} min before expiry",
                settings.expiry.sweep_interval.as_secs(),
                settings.expiry.warn_min.num_minutes(),
                settings.expiry.warn_max.num_minutes()
            );
            if settings.rotation.change_command.is_empty() {
                println!("  Rotation: no change_command configured, rotations will fail");
            } else {
                println!("  Rotation: {}", settings.rotation.change_command.join(" "));
            }
            match &settings.notify.webhook_url {
                Some(url) => println!("  Notifications: webhook {}", url),
                None => println!("  Notifications: log only"),
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                lessor_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                lessor_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                lessor_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                lessor_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        lessor_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
