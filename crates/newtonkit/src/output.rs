use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use newton_dock::DockEvent;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    device: &'a str,
    timestamp: String,
    #[serde(flatten)]
    event: &'a DockEvent,
}

pub fn print_event(event: &DockEvent, device: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = EventOutput {
                device,
                timestamp: now_unix_seconds(),
                event,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "DEVICE", "DETAIL"])
                .add_row(vec![
                    event_name(event).to_string(),
                    device.to_string(),
                    event_detail(event),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{} {}", event_name(event), event_detail(event));
        }
    }
}

pub fn event_name(event: &DockEvent) -> &'static str {
    match event {
        DockEvent::StateChanged { .. } => "state",
        DockEvent::Connected { .. } => "connected",
        DockEvent::Disconnected { .. } => "disconnected",
        DockEvent::CallResult { .. } => "call-result",
    }
}

fn event_detail(event: &DockEvent) -> String {
    match event {
        DockEvent::StateChanged { from, to } => format!("{from:?} -> {to:?}"),
        DockEvent::Connected { connection } | DockEvent::Disconnected { connection } => format!(
            "{} (id {:#010x}, ROM {:#x})",
            connection.name, connection.info.newton_id, connection.info.rom_version
        ),
        DockEvent::CallResult { result } => {
            serde_json::to_string(result).unwrap_or_else(|_| format!("{result:?}"))
        }
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
