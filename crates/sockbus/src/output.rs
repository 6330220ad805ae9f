use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;
use sockbus_endpoint::Event;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    topic: &'a str,
    data: &'a Value,
    peer: String,
    remote: &'a str,
    timestamp: String,
}

/// Print one received message. Non-message events are ignored.
pub fn print_message(event: &Event, format: OutputFormat) {
    let Event::Message { topic, data, peer } = event else {
        return;
    };

    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                topic,
                data,
                peer: peer.id().to_string(),
                remote: peer.label(),
                timestamp: now_unix_seconds(),
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
                .set_header(vec!["TOPIC", "PEER", "DATA"])
                .add_row(vec![topic.clone(), peer.id().to_string(), data_preview(data)]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "topic={} peer={} ({}) data={}",
                topic,
                peer.id(),
                peer.label(),
                data_preview(data)
            );
        }
        OutputFormat::Raw => {
            let mut line = match data {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            line.push('\n');
            print_raw(line.as_bytes());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn data_preview(data: &Value) -> String {
    serde_json::to_string(data).unwrap_or_else(|_| "<unprintable>".to_string())
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
