//! Line console for driving a running node.
//!
//! Any line without a leading slash is chat. Slash commands cover
//! the rest of the session surface: status, file broadcast, control
//! requests, capture tuning, and synthetic input. Callers skip blank
//! lines before parsing.

use std::net::SocketAddr;
use std::path::PathBuf;

use lantern_core::NodeCommand;
use lantern_core::protocol::screen::{CaptureRect, KeyboardEvent};

/// One parsed console line.
#[derive(Debug)]
pub enum ConsoleAction {
    /// Forward a command to the session as-is.
    Command(NodeCommand),
    /// Left-click at desktop coordinates (expands to move/down/up).
    Click { x: i32, y: i32 },
    /// Press and release one named key.
    Tap { key: String },
    /// Print the peer roster.
    Peers,
    /// Print the command list.
    Help,
    /// Stop the node.
    Quit,
}

/// Parse a console line into an action.
pub fn parse(input: &str) -> Result<ConsoleAction, String> {
    let input = input.trim();
    if !input.starts_with('/') {
        return Ok(ConsoleAction::Command(NodeCommand::SendChat(
            input.to_string(),
        )));
    }

    let (word, rest) = match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    };

    match word {
        "/status" => Ok(ConsoleAction::Command(NodeCommand::SetStatus(
            rest.to_string(),
        ))),

        "/send" => {
            if rest.is_empty() {
                return Err("send requires a file path".into());
            }
            Ok(ConsoleAction::Command(NodeCommand::SendFile(
                PathBuf::from(rest),
            )))
        }

        "/peers" => Ok(ConsoleAction::Peers),

        "/control" => {
            let addr: SocketAddr = rest
                .parse()
                .map_err(|_| format!("not an ip:port address: '{rest}'"))?;
            Ok(ConsoleAction::Command(NodeCommand::RequestControl(
                addr.into(),
            )))
        }

        "/release" => Ok(ConsoleAction::Command(NodeCommand::ReleaseControl)),

        "/allow" => match rest {
            "on" => Ok(ConsoleAction::Command(NodeCommand::AllowRemoteControl(
                true,
            ))),
            "off" => Ok(ConsoleAction::Command(NodeCommand::AllowRemoteControl(
                false,
            ))),
            _ => Err("allow takes on|off".into()),
        },

        "/fps" => Ok(ConsoleAction::Command(NodeCommand::SetFps(number(rest)?))),

        "/monitor" => Ok(ConsoleAction::Command(NodeCommand::SelectMonitor(number(
            rest,
        )?))),

        "/region" => {
            let mut tokens = rest.split_whitespace();
            let mut next = || tokens.next().ok_or("region takes <x> <y> <w> <h>".to_string());
            let rect = CaptureRect::new(
                number(next()?)?,
                number(next()?)?,
                number(next()?)?,
                number(next()?)?,
            );
            Ok(ConsoleAction::Command(NodeCommand::SetCaptureRegion(rect)))
        }

        "/click" => {
            let mut tokens = rest.split_whitespace();
            let mut next = || tokens.next().ok_or("click takes <x> <y>".to_string());
            Ok(ConsoleAction::Click {
                x: number(next()?)?,
                y: number(next()?)?,
            })
        }

        "/tap" => {
            if rest.is_empty() {
                return Err("tap requires a key name".into());
            }
            Ok(ConsoleAction::Tap {
                key: rest.to_string(),
            })
        }

        "/chord" => {
            let keys: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
            if keys.is_empty() {
                return Err("chord requires at least one key".into());
            }
            Ok(ConsoleAction::Command(NodeCommand::SendKeyboard(
                KeyboardEvent::Chord { keys },
            )))
        }

        "/help" => Ok(ConsoleAction::Help),

        "/quit" => Ok(ConsoleAction::Quit),

        _ => Err(format!("unknown command: '{word}'; /help lists them")),
    }
}

fn number<T: std::str::FromStr>(token: &str) -> Result<T, String> {
    token
        .trim()
        .parse()
        .map_err(|_| format!("not a number: '{token}'"))
}

/// Command list printed by `/help`.
pub fn help() -> &'static str {
    "\
<text>                   Broadcast a chat line to every peer
/status [text]           Broadcast a status change (empty clears it)
/send <path>             Broadcast a file to every peer
/peers                   List every peer seen so far
/control <ip:port>       Ask a peer for control of its screen
/release                 End the active control session
/fps <n>                 Retime the controlled peer's capture loop
/monitor <i>             Capture one monitor (-1 for all)
/region <x> <y> <w> <h>  Capture a rectangle of the controlled desktop
/click <x> <y>           Left-click at desktop coordinates
/tap <key>               Press and release a named key
/chord <key> <key>...    Press a chord (e.g. /chord ctrl alt del)
/allow <on|off>          Toggle whether peers may take control here
/help                    Show this list
/quit                    Stop the node"
}

// ── Tests ────────────────────────────────────────────────────────
