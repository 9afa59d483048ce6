//! Line-command parsing and dispatch
//!
//! A bare line is a text send to the selected peer; slash commands drive
//! everything else.

use console_core::{DeviceAddress, Direction, PeerKey};
use console_runtime::Engine;

use crate::error::Result;

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Send text to the selected peer
    Send(String),
    /// Select a peer by address and connect if needed
    Select(DeviceAddress),
    /// Tear down the active link
    Disconnect,
    /// Show the inbox and clear its unread counter
    Inbox,
    /// Print the status line
    Status,
    /// List known peers
    Peers,
    /// Print command help
    Help,
    /// Exit the console
    Quit,
}

/// Parse one input line. Empty lines parse to `None`; a malformed command
/// returns the error text to show the user.
pub fn parse_line(line: &str) -> std::result::Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if !line.starts_with('/') {
        return Ok(Some(ConsoleCommand::Send(line.to_string())));
    }
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    match verb {
        "/select" => {
            if rest.is_empty() {
                return Err("usage: /select <AA:BB:CC:DD:EE:FF>".to_string());
            }
            let address = rest
                .parse::<DeviceAddress>()
                .map_err(|e| e.to_string())?;
            Ok(Some(ConsoleCommand::Select(address)))
        }
        "/send" => {
            if rest.is_empty() {
                return Err("usage: /send <text>".to_string());
            }
            Ok(Some(ConsoleCommand::Send(rest.to_string())))
        }
        "/disconnect" => Ok(Some(ConsoleCommand::Disconnect)),
        "/inbox" => Ok(Some(ConsoleCommand::Inbox)),
        "/status" => Ok(Some(ConsoleCommand::Status)),
        "/peers" => Ok(Some(ConsoleCommand::Peers)),
        "/help" => Ok(Some(ConsoleCommand::Help)),
        "/quit" | "/exit" => Ok(Some(ConsoleCommand::Quit)),
        other => Err(format!("unknown command {other}, try /help")),
    }
}

// ----------------------------------------------------------------------------
// Dispatch
// ----------------------------------------------------------------------------

const HELP: &str = "\
commands:
  <text>                 send to the selected peer
  /select <address>      select a peer and connect
  /disconnect            drop the active link
  /inbox                 show the inbox (clears unread)
  /status                show the status line
  /peers                 list known peers
  /quit                  exit";

/// Run one command against the engine. Returns false when the console
/// should exit.
pub async fn dispatch(engine: &Engine, command: ConsoleCommand) -> Result<bool> {
    match command {
        ConsoleCommand::Send(text) => {
            if let Err(e) = engine.send_text(&text).await {
                println!("! {e}");
            }
        }
        ConsoleCommand::Select(address) => {
            engine.select_peer(address).await;
            print_conversation(engine).await;
        }
        ConsoleCommand::Disconnect => engine.disconnect().await,
        ConsoleCommand::Inbox => {
            engine.view_inbox().await;
            print_conversation(engine).await;
        }
        ConsoleCommand::Status => println!("{}", engine.status_summary().await),
        ConsoleCommand::Peers => {
            let snapshot = engine.snapshot().await;
            let mut peers: Vec<_> = snapshot
                .directory
                .peers()
                .filter(|p| p.key != PeerKey::Inbox)
                .collect();
            peers.sort_by(|a, b| a.display.cmp(&b.display));
            if peers.is_empty() {
                println!("no peers known yet");
            }
            for peer in peers {
                let marker = if peer.connected { "*" } else { " " };
                println!("{} {}  {}", marker, peer.key, peer.display);
            }
        }
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => return Ok(false),
    }
    Ok(true)
}

/// Print the tail of the selected conversation
async fn print_conversation(engine: &Engine) {
    let snapshot = engine.snapshot().await;
    let selected = snapshot.directory.selected();
    let Some(peer) = snapshot.directory.get(selected) else {
        return;
    };
    println!("-- {} --", peer.display);
    for message in peer.history.iter().rev().take(20).rev() {
        let prefix = match message.direction {
            Direction::In => message.sender.as_deref().unwrap_or("<"),
            Direction::Out => ">",
            Direction::System => "*",
        };
        println!("{prefix} {}", message.text);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_line_is_a_send() {
        assert_eq!(
            parse_line("hello world").unwrap(),
            Some(ConsoleCommand::Send("hello world".to_string()))
        );
        assert_eq!(parse_line("   ").unwrap(), None);
    }

    #[test]
    fn test_select_parses_and_validates_address() {
        assert_eq!(
            parse_line("/select aa:bb:cc:dd:ee:ff").unwrap(),
            Some(ConsoleCommand::Select(
                "AA:BB:CC:DD:EE:FF".parse().unwrap()
            ))
        );
        assert!(parse_line("/select").is_err());
        assert!(parse_line("/select not-an-address").is_err());
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(
            parse_line("/disconnect").unwrap(),
            Some(ConsoleCommand::Disconnect)
        );
        assert_eq!(parse_line("/inbox").unwrap(), Some(ConsoleCommand::Inbox));
        assert_eq!(parse_line("/status").unwrap(), Some(ConsoleCommand::Status));
        assert_eq!(parse_line("/peers").unwrap(), Some(ConsoleCommand::Peers));
        assert_eq!(parse_line("/quit").unwrap(), Some(ConsoleCommand::Quit));
        assert_eq!(parse_line("/exit").unwrap(), Some(ConsoleCommand::Quit));
    }

    #[test]
    fn test_explicit_send_keeps_leading_slash_text_sendable() {
        assert_eq!(
            parse_line("/send /etc/motd contents").unwrap(),
            Some(ConsoleCommand::Send("/etc/motd contents".to_string()))
        );
    }

    #[test]
    fn test_unknown_command_is_an_error() {
        assert!(parse_line("/frobnicate").is_err());
    }
}
