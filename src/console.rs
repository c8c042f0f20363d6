//! Stdin event console.
//!
//! Each input line is one inbound event: a JSON object is a structured message, any
//! other line is raw log text. Messages starting with the command prefix are admin
//! commands; their replies go to stdout as JSON lines.

use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use pulseguard_monitor::{AdminCommand, AdminService, EntityId, InboundEvent, TemplateKind};

const USAGE: &str = "commands: status | monitor <id> [target] | unmonitor <id> | reload | \
                     test [id] | channel <wechat|sms|mail|webhook|cp> | heartbeat [id] | \
                     template <title|content|test_title|test_content> <text>";

/// One reply line on stdout.
#[derive(Debug, Serialize)]
pub(crate) struct ConsoleReply {
    /// Conversation the command came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub ok: bool,
    pub message: String,
}

/// Parse `line` into an event.
pub(crate) fn parse_event(line: &str) -> InboundEvent {
    let trimmed = line.trim();
    if trimmed.starts_with('{') {
        match serde_json::from_str::<InboundEvent>(trimmed) {
            Ok(event) => return event,
            Err(e) => debug!("Line is not a message event, treating as text: {}", e),
        }
    }
    InboundEvent::raw(line)
}

/// Parse a prefixed command. `None` when `content` is not a command at all.
pub(crate) fn parse_command(prefix: &str, content: &str) -> Option<Result<AdminCommand, String>> {
    let body = content.trim().strip_prefix(prefix)?;
    let (name, rest) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };
    let mut args = rest.split_whitespace();
    let optional_id = |arg: Option<&str>| arg.map(EntityId::from);

    let command = match name.to_lowercase().as_str() {
        "status" => Ok(AdminCommand::Status),
        "monitor" | "add" => match args.next() {
            Some(id) => Ok(AdminCommand::Add {
                id: id.into(),
                target: args.next().map(str::to_string),
            }),
            None => Err(format!("usage: {}monitor <id> [target]", prefix)),
        },
        "unmonitor" | "remove" => match args.next() {
            Some(id) => Ok(AdminCommand::Remove { id: id.into() }),
            None => Err(format!("usage: {}unmonitor <id>", prefix)),
        },
        "reload" => Ok(AdminCommand::Reload),
        "test" => Ok(AdminCommand::Test {
            id: optional_id(args.next()),
        }),
        "channel" => match args.next() {
            Some(channel) => Ok(AdminCommand::Channel {
                channel: channel.to_string(),
            }),
            None => Err(format!("usage: {}channel <name>", prefix)),
        },
        "heartbeat" => Ok(AdminCommand::Heartbeat {
            id: optional_id(args.next()),
        }),
        "template" => match rest.split_once(char::is_whitespace) {
            Some((kind, text)) if !text.trim().is_empty() => kind
                .parse::<TemplateKind>()
                .map(|kind| AdminCommand::Template {
                    kind,
                    text: text.trim().to_string(),
                }),
            _ => Err(format!("usage: {}template <kind> <text>", prefix)),
        },
        _ => Err(USAGE.to_string()),
    };
    Some(command)
}

/// Handle one line. Returns a reply when the line was a command.
pub(crate) async fn handle_line(
    admin: &AdminService,
    prefix: &str,
    line: &str,
) -> Option<ConsoleReply> {
    if line.trim().is_empty() {
        return None;
    }
    let event = parse_event(line);

    let Some(parsed) = parse_command(prefix, event.text()) else {
        admin.service().ingest(&event).await;
        return None;
    };

    let sender = event
        .sender
        .clone()
        .or_else(|| event.from.clone())
        .unwrap_or_default();
    let to = event.from.clone().or_else(|| event.sender.clone());

    let reply = match parsed {
        Ok(command) => match admin.execute(&sender, command).await {
            Ok(reply) => ConsoleReply {
                to,
                ok: true,
                message: reply.to_string(),
            },
            Err(e) => ConsoleReply {
                to,
                ok: false,
                message: e.to_string(),
            },
        },
        Err(usage) => ConsoleReply {
            to,
            ok: false,
            message: usage,
        },
    };
    Some(reply)
}

/// Read events until EOF.
pub(crate) async fn run_console<R, W>(
    admin: Arc<AdminService>,
    prefix: String,
    reader: R,
    mut writer: W,
) where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Cannot read input: {}", e);
                break;
            }
        };

        let Some(reply) = handle_line(&admin, &prefix, &line).await else {
            continue;
        };
        match serde_json::to_string(&reply) {
            Ok(json) => {
                if let Err(e) = writer.write_all(format!("{}\n", json).as_bytes()).await {
                    warn!("Cannot write reply: {}", e);
                    break;
                }
                let _ = writer.flush().await;
            }
            Err(e) => warn!("Cannot encode reply: {}", e),
        }
    }
    info!("Input closed; monitoring continues until shutdown");
}
