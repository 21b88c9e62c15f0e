//! `watch` handler: live door changes until Ctrl-C.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, Utc};
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, info};

use doorlink_core::{ConnectionState, ControllerConfig, DoorController, DoorId, DoorSnapshot, DoorStatus};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

/// One observed status transition.
#[derive(Debug, Serialize)]
struct DoorEvent {
    at: DateTime<Utc>,
    id: DoorId,
    name: String,
    /// `None` when the door first appears.
    previous: Option<DoorStatus>,
    /// `None` when the door disappeared from the account.
    status: Option<DoorStatus>,
}

/// Diff two status maps into events, in `DoorId` order.
fn diff(
    previous: &BTreeMap<DoorId, (String, DoorStatus)>,
    current: &BTreeMap<DoorId, (String, DoorStatus)>,
    at: DateTime<Utc>,
) -> Vec<DoorEvent> {
    let mut events = Vec::new();
    for (id, (name, status)) in current {
        let before = previous.get(id).map(|(_, s)| *s);
        if before != Some(*status) {
            events.push(DoorEvent {
                at,
                id: *id,
                name: name.clone(),
                previous: before,
                status: Some(*status),
            });
        }
    }
    for (id, (name, status)) in previous {
        if !current.contains_key(id) {
            events.push(DoorEvent {
                at,
                id: *id,
                name: name.clone(),
                previous: Some(*status),
                status: None,
            });
        }
    }
    events.sort_by_key(|e| e.id);
    events
}

fn statuses(snap: &DoorSnapshot) -> BTreeMap<DoorId, (String, DoorStatus)> {
    snap.iter()
        .map(|door| (door.id, (door.name.clone(), door.status)))
        .collect()
}

fn render_event(event: &DoorEvent, format: OutputFormat, color: bool) -> Result<String, CliError> {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json_compact(event),
        OutputFormat::Yaml => output::render_yaml(&[event]),
        OutputFormat::Plain => Ok(format!(
            "{} {}",
            event.id,
            event.status.map_or_else(|| "removed".into(), |s| s.to_string())
        )),
        OutputFormat::Table => {
            let time = event.at.with_timezone(&Local).format("%H:%M:%S");
            let before = event
                .previous
                .map_or_else(|| "-".into(), |s| output::paint_status(s, color));
            let after = event
                .status
                .map_or_else(|| "removed".into(), |s| output::paint_status(s, color));
            let id = event.id.to_string();
            Ok(format!("{time}  {id:<10} {:<16} {before} -> {after}", event.name))
        }
    }
}

fn print_connection_state(state: ConnectionState, color: bool, quiet: bool) {
    if quiet {
        return;
    }
    let text = match state {
        ConnectionState::Reconnecting { attempt } => format!("push: reconnecting (attempt {attempt})"),
        other => format!("push: {}", format!("{other:?}").to_lowercase()),
    };
    if color {
        eprintln!("{}", text.dimmed());
    } else {
        eprintln!("{text}");
    }
}

pub async fn handle(
    mut config: ControllerConfig,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.no_push {
        config.push_enabled = false;
    }
    if let Some(secs) = args.interval {
        config.refresh_interval_secs = secs;
    }
    if !config.push_enabled && config.refresh_interval().is_none() {
        return Err(CliError::Validation {
            field: "interval".into(),
            reason: "with --no-push a non-zero --interval is required".into(),
        });
    }

    let color = output::should_color(global.color);
    let controller = DoorController::cloud(config)?;
    controller.login().await?;

    let mut doors = controller.doors();
    let mut known = statuses(doors.current());
    for event in diff(&BTreeMap::new(), &known, Utc::now()) {
        output::print_output(&render_event(&event, global.output, color)?, global.quiet);
    }

    let mut state = controller.connection_state();
    controller.start().await?;
    info!("watching doors, press Ctrl-C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                debug!("interrupted");
                break;
            }
            snap = doors.changed() => {
                let Some(snap) = snap else { break };
                let current = statuses(&snap);
                for event in diff(&known, &current, Utc::now()) {
                    output::print_output(&render_event(&event, global.output, color)?, global.quiet);
                }
                known = current;
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                print_connection_state(current, color, global.quiet);
            }
        }
    }

    controller.stop().await;
    Ok(())
}
