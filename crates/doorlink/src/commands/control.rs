//! `open` and `close` handlers.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

use doorlink_core::{DoorCommand, DoorController, DoorStatus};

use crate::cli::{GlobalOpts, MoveArgs};
use crate::commands::util;
use crate::error::CliError;
use crate::output;

pub async fn handle(
    controller: &DoorController,
    args: MoveArgs,
    command: DoorCommand,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let door = util::resolve_door(controller, &args.target.door)?;
    let target = command.target_status();

    match command {
        DoorCommand::Open => controller.open_door(&door.id).await?,
        DoorCommand::Close => controller.close_door(&door.id).await?,
    }

    if !args.wait {
        if !global.quiet {
            eprintln!("{command} sent to {} ({})", door.name, door.id);
        }
        return Ok(());
    }

    let deadline = Instant::now() + Duration::from_secs(args.wait_timeout);
    let poll = Duration::from_secs(args.poll_interval.max(1));
    let color = output::should_color(global.color);

    loop {
        let snap = controller.refresh().await?;
        let status = snap
            .iter()
            .find(|d| d.id == door.id)
            .map_or(DoorStatus::Unknown, |d| d.status);
        debug!(id = %door.id, %status, "waiting for door");

        if status == target {
            output::print_output(
                &format!("{} is {}", door.name, output::paint_status(status, color)),
                global.quiet,
            );
            return Ok(());
        }

        if Instant::now() + poll > deadline {
            return Err(CliError::Timeout {
                expected: target.to_string(),
                seconds: args.wait_timeout,
            });
        }
        sleep(poll).await;
    }
}
