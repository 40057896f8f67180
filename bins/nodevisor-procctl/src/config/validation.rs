use super::*;
use anyhow::{anyhow, Result};

/// Validate the complete configuration
pub fn validate_config(config: &ProcctlConfig) -> Result<()> {
    validate_log_level(&config.log_level)?;
    validate_reaper_config(&config.reaper)?;

    if config.process_file.app_name.is_empty() {
        return Err(anyhow!("process_file.app_name cannot be empty"));
    }

    Ok(())
}

fn validate_log_level(level: &str) -> Result<()> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(anyhow!(
            "Invalid log level: {}, must be one of: trace, debug, info, warn, error",
            level
        )),
    }
}

fn validate_reaper_config(reaper: &ReaperConfig) -> Result<()> {
    // The marker is compared against parsed entries, which never start with '='.
    match reaper.marker.find('=') {
        Some(0) | None => {
            return Err(anyhow!(
                "Reaper marker must have the form NAME=VALUE, got: {}",
                reaper.marker
            ))
        }
        Some(_) => {}
    }

    if reaper.timeout.is_zero() {
        return Err(anyhow!("Reaper timeout must be greater than 0"));
    }

    if reaper.poll_interval.is_zero() || reaper.poll_interval > reaper.timeout {
        return Err(anyhow!(
            "Reaper poll interval must be greater than 0 and not exceed the timeout ({:?})",
            reaper.timeout
        ));
    }

    Ok(())
}
