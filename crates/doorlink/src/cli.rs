//! Clap derive structures for the `doorlink` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// doorlink -- watch and drive cloud-connected garage doors
#[derive(Debug, Parser)]
#[command(
    name = "doorlink",
    version,
    about = "Monitor and control garage doors from the command line",
    long_about = "Tracks garage doors through the door service's REST snapshots and\n\
        its push channel, and sends open/close commands.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Account profile to use
    #[arg(long, short = 'p', env = "DOORLINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// REST API root URL (overrides profile)
    #[arg(long, env = "DOORLINK_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Push endpoint URL (overrides profile)
    #[arg(long, env = "DOORLINK_PUSH_URL", global = true)]
    pub push_url: Option<String>,

    /// Pre-issued bearer token (overrides profile credentials)
    #[arg(long, env = "DOORLINK_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "DOORLINK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "DOORLINK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List every door on the account
    #[command(alias = "ls")]
    Doors,

    /// Show one door in detail
    Status(DoorArgs),

    /// Open a door
    Open(MoveArgs),

    /// Close a door
    Close(MoveArgs),

    /// Follow door changes live until interrupted
    Watch(WatchArgs),

    /// Manage configuration profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Door Arguments ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DoorArgs {
    /// Door id (533255/1), serial key (F0AD4E03A9AE/1), or door name
    pub door: String,
}

#[derive(Debug, Args)]
pub struct MoveArgs {
    #[command(flatten)]
    pub target: DoorArgs,

    /// Wait until the door reports the requested state
    #[arg(long)]
    pub wait: bool,

    /// Give up waiting after this many seconds
    #[arg(long, default_value = "60", requires = "wait")]
    pub wait_timeout: u64,

    /// Snapshot polling period while waiting, in seconds
    #[arg(long, default_value = "3", requires = "wait")]
    pub poll_interval: u64,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Poll snapshots only; do not open the push channel
    #[arg(long)]
    pub no_push: bool,

    /// Snapshot interval in seconds (0 disables periodic polling)
    #[arg(long)]
    pub interval: Option<u64>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or replace a profile
    Init(InitArgs),

    /// Display the configuration with secrets redacted
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a bearer token in the system keyring (reads stdin if omitted)
    SetToken {
        /// Token value
        value: Option<String>,
    },

    /// Store a password in the system keyring (reads stdin if omitted)
    SetPassword {
        /// Password value
        value: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Name of the profile to write
    #[arg(long = "name", default_value = "default")]
    pub name: String,

    /// REST API root URL
    #[arg(long = "api", value_name = "URL")]
    pub api: String,

    /// Push endpoint URL
    #[arg(long = "push", value_name = "URL")]
    pub push: String,

    /// Account username (password grant)
    #[arg(long, conflicts_with = "bearer")]
    pub username: Option<String>,

    /// Account password (password grant)
    #[arg(long, requires = "username")]
    pub password: Option<String>,

    /// Pre-issued bearer token
    #[arg(long = "bearer", value_name = "TOKEN")]
    pub bearer: Option<String>,

    /// Store secrets in the config file instead of the system keyring
    #[arg(long)]
    pub plaintext: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
