//! Command dispatch: bridges CLI args -> controller calls -> output formatting.

pub mod config_cmd;
pub mod control;
pub mod doors;
pub mod util;
pub mod watch;

use doorlink_core::{ControllerConfig, DoorCommand, DoorController};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a door-service command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    config: ControllerConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(config, args, global).await,
        Command::Doors => doors::list(&connect(config).await?, global),
        Command::Status(args) => doors::status(&connect(config).await?, &args, global),
        Command::Open(args) => {
            control::handle(&connect(config).await?, args, DoorCommand::Open, global).await
        }
        Command::Close(args) => {
            control::handle(&connect(config).await?, args, DoorCommand::Close, global).await
        }
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}

/// Log in for a single request-response cycle: no push, no refresh task.
async fn connect(mut config: ControllerConfig) -> Result<DoorController, CliError> {
    config.push_enabled = false;
    config.refresh_interval_secs = 0;

    let controller = DoorController::cloud(config)?;
    controller.login().await?;
    Ok(controller)
}
