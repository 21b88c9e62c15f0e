//! `doors` and `status` handlers.

use std::fmt::Write as _;
use std::sync::Arc;

use tabled::Tabled;

use doorlink_core::{Door, DoorController, DoorFault};

use crate::cli::{DoorArgs, GlobalOpts};
use crate::commands::util;
use crate::error::CliError;
use crate::output;

// ── Table row ────────────────────────────────────────────────────────

#[derive(Tabled)]
struct DoorRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "LINK")]
    link: String,
    #[tabled(rename = "BATTERY")]
    battery: String,
    #[tabled(rename = "FAULT")]
    fault: String,
    #[tabled(rename = "KEY")]
    key: String,
}

fn row(door: &Arc<Door>) -> DoorRow {
    DoorRow {
        id: door.id.to_string(),
        name: door.name.clone(),
        status: if door.device_online {
            door.status.to_string()
        } else {
            format!("{} (offline)", door.status)
        },
        link: door.link_status.to_string(),
        battery: format!("{}%", door.battery_level),
        fault: match door.fault {
            DoorFault::None => "-".into(),
            fault => fault.to_string(),
        },
        key: door.key.to_string(),
    }
}

// ── Detail view ──────────────────────────────────────────────────────

fn detail(door: &Arc<Door>, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({})", door.name, door.id);
    let _ = writeln!(out, "  status:   {}", output::paint_status(door.status, color));
    let _ = writeln!(out, "  link:     {}", output::paint_link(door.link_status, color));
    let _ = writeln!(
        out,
        "  device:   {}",
        if door.device_online { "online" } else { "offline" }
    );
    let _ = writeln!(out, "  battery:  {}%", door.battery_level);
    let _ = writeln!(out, "  rssi:     {} dBm", door.rssi);
    let _ = writeln!(out, "  fault:    {}", door.fault);
    let _ = writeln!(out, "  serial:   {}", door.serial);
    let _ = writeln!(out, "  key:      {}", door.key);
    if let Some(ref vendor) = door.vendor {
        let _ = write!(out, "  model:    {vendor}");
        if let Some(ref model) = door.model {
            let _ = write!(out, " {model}");
        }
        out.push('\n');
    }
    out.trim_end().to_owned()
}

// ── Handlers ─────────────────────────────────────────────────────────

pub fn list(controller: &DoorController, global: &GlobalOpts) -> Result<(), CliError> {
    let snap = controller.doors_snapshot();
    let out = output::render_list(
        global.output,
        snap.as_slice(),
        row,
        |door| door.id.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub fn status(
    controller: &DoorController,
    args: &DoorArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let door = util::resolve_door(controller, &args.door)?;
    let color = output::should_color(global.color);
    let out = output::render_single(
        global.output,
        &door,
        |d| detail(d, color),
        |d| d.status.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
