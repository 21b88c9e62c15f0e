//! Config subcommand handlers.

use std::io::{self, BufRead};

use serde::Serialize;
use tabled::Tabled;

use doorlink_config::{self as config, Config, Profile, SecretKind};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, InitArgs};
use crate::error::CliError;
use crate::output;

const REDACTED: &str = "********";

// ── Helpers ─────────────────────────────────────────────────────────

/// Read a single secret line from stdin when no value was given.
fn secret_value(value: Option<String>, what: &str) -> Result<String, CliError> {
    let value = match value {
        Some(v) => v,
        None => {
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_owned()
        }
    };
    if value.is_empty() {
        return Err(CliError::Validation {
            field: what.into(),
            reason: format!("{what} cannot be empty"),
        });
    }
    Ok(value)
}

/// Copy of `cfg` with plaintext secrets masked.
fn redacted(cfg: &Config) -> Config {
    let mut out = cfg.clone();
    for profile in out.profiles.values_mut() {
        if profile.token.is_some() {
            profile.token = Some(REDACTED.into());
        }
        if profile.password.is_some() {
            profile.password = Some(REDACTED.into());
        }
    }
    out
}

#[derive(Clone, Serialize, Tabled)]
struct ProfileRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "DEFAULT")]
    default: String,
    #[tabled(rename = "AUTH")]
    auth_mode: String,
    #[tabled(rename = "API")]
    api_url: String,
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init(init) => init_profile(init, global),

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = redacted(&config::load_config()?);
            let out = output::render_single(
                global.output,
                &cfg,
                |c| output::render_toml(c).unwrap_or_default(),
                |_| config::config_path().display().to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Profiles ────────────────────────────────────────────────
        ConfigCommand::Profiles => {
            let cfg = config::load_config()?;
            let default = cfg.active_profile_name(None);
            let rows: Vec<ProfileRow> = cfg
                .profiles
                .iter()
                .map(|(name, p)| ProfileRow {
                    name: name.clone(),
                    default: if *name == default { "*".into() } else { String::new() },
                    auth_mode: p.auth_mode.clone(),
                    api_url: p.api_url.clone(),
                })
                .collect();
            let out = output::render_list(
                global.output,
                &rows,
                ProfileRow::clone,
                |r| r.name.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Use ─────────────────────────────────────────────────────
        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config()?;
            cfg.profile(&name)?;
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            if !global.quiet {
                eprintln!("Default profile set to '{name}'");
            }
            Ok(())
        }

        // ── Keyring secrets ─────────────────────────────────────────
        ConfigCommand::SetToken { value } => store(global, SecretKind::Token, value, "token"),
        ConfigCommand::SetPassword { value } => {
            store(global, SecretKind::Password, value, "password")
        }
    }
}

fn store(
    global: &GlobalOpts,
    kind: SecretKind,
    value: Option<String>,
    what: &str,
) -> Result<(), CliError> {
    let cfg = config::load_config_or_default();
    let profile_name = cfg.active_profile_name(global.profile.as_deref());
    let secret = secret_value(value, what)?;

    config::store_secret(&profile_name, kind, &secret)?;
    if !global.quiet {
        eprintln!("Stored {what} for profile '{profile_name}' in the system keyring");
    }
    Ok(())
}

fn init_profile(args: InitArgs, global: &GlobalOpts) -> Result<(), CliError> {
    config::parse_endpoint("api_url", &args.api, &["http", "https"])?;
    config::parse_endpoint("push_url", &args.push, &["ws", "wss"])?;

    let mut profile = Profile {
        api_url: args.api,
        push_url: args.push,
        ..Profile::default()
    };

    match (args.bearer, args.username) {
        (Some(token), _) => {
            profile.auth_mode = "token".into();
            if args.plaintext {
                profile.token = Some(token);
            } else {
                config::store_secret(&args.name, SecretKind::Token, &token)?;
            }
        }
        (None, Some(username)) => {
            profile.auth_mode = "password".into();
            profile.username = Some(username);
            if let Some(password) = args.password {
                if args.plaintext {
                    profile.password = Some(password);
                } else {
                    config::store_secret(&args.name, SecretKind::Password, &password)?;
                }
            }
        }
        (None, None) => {
            return Err(CliError::Validation {
                field: "credentials".into(),
                reason: "pass --bearer or --username".into(),
            });
        }
    }

    let mut cfg = config::load_config_or_default();
    cfg.profiles.insert(args.name.clone(), profile);
    let default_missing = cfg
        .default_profile
        .as_ref()
        .is_none_or(|name| !cfg.profiles.contains_key(name));
    if default_missing {
        cfg.default_profile = Some(args.name.clone());
    }

    let path = config::save_config(&cfg)?;
    if !global.quiet {
        eprintln!("Configuration written to {}", path.display());
        eprintln!("  Profile: {}", args.name);
        eprintln!("  Test it: doorlink doors --profile {}", args.name);
    }
    Ok(())
}
