//! CLI flag overrides on top of `doorlink_config`.
//!
//! This is the single boundary where CLI flags and config profiles are
//! merged into a `doorlink_core::ControllerConfig`.

use std::time::Duration;

use secrecy::SecretString;

use doorlink_config::{Config, parse_endpoint, profile_to_controller_config};
use doorlink_core::{AuthCredentials, ControllerConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Build a `ControllerConfig` from the config file, profile, and CLI overrides.
pub fn build_controller_config(global: &GlobalOpts) -> Result<ControllerConfig, CliError> {
    let cfg = doorlink_config::load_config_or_default();
    resolve(&cfg, global)
}

fn resolve(cfg: &Config, global: &GlobalOpts) -> Result<ControllerConfig, CliError> {
    let profile_name = cfg.active_profile_name(global.profile.as_deref());

    // If a profile exists, use it with CLI flag overrides
    if let Some(profile) = cfg.profiles.get(&profile_name) {
        let mut profile = profile.clone();
        if let Some(ref url) = global.api_url {
            profile.api_url.clone_from(url);
        }
        if let Some(ref url) = global.push_url {
            profile.push_url.clone_from(url);
        }
        if let Some(secs) = global.timeout {
            profile.timeout = Some(secs);
        }
        if let Some(ref token) = global.token {
            profile.auth_mode = "token".into();
            profile.token = Some(token.clone());
        }

        let mut config = profile_to_controller_config(&profile, &profile_name, &cfg.defaults)?;
        if let Some(ref token) = global.token {
            config.auth = AuthCredentials::Token(SecretString::from(token.clone()));
        }
        return Ok(config);
    }

    // An explicitly requested profile must exist
    if global.profile.is_some() {
        cfg.profile(&profile_name)?;
    }

    // No profile found -- try to build from CLI flags / env vars alone
    let no_config = || CliError::NoConfig {
        path: doorlink_config::config_path().display().to_string(),
    };
    let api_url = global.api_url.as_deref().ok_or_else(no_config)?;
    let push_url = global.push_url.as_deref().ok_or_else(no_config)?;
    let token = global.token.as_ref().ok_or_else(|| CliError::NoCredentials {
        profile: profile_name.clone(),
    })?;

    let mut config = ControllerConfig::new(
        parse_endpoint("api_url", api_url, &["http", "https"])?,
        parse_endpoint("push_url", push_url, &["ws", "wss"])?,
        AuthCredentials::Token(SecretString::from(token.clone())),
    );
    config.timeout = Duration::from_secs(global.timeout.unwrap_or(cfg.defaults.timeout));
    config.refresh_interval_secs = cfg.defaults.refresh_interval;
    Ok(config)
}
