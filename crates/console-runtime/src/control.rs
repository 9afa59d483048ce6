//! Daemon control channel
//!
//! Each daemon listens on an AF_UNIX socket and accepts exactly one
//! newline-terminated uppercase command per connection, writes any reply and
//! closes. `ControlClient` speaks that protocol: connect, write the line,
//! drain until the daemon closes, all bounded by one timeout.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use console_core::{ControlError, DeviceAddress};

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// Commands understood by the daemon's control listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Enable payload echoing into the daemon log
    TailOn,
    /// Dump the cached peer list into the daemon log
    Peers,
    /// Connect the central link to a device
    Connect(DeviceAddress),
    /// Tear down the active link
    Disconnect,
    /// Send a text payload over the active link
    Send(String),
    /// Ask the daemon to exit
    Quit,
}

impl ControlCommand {
    /// Wire form, newline-terminated
    pub fn wire_line(&self) -> String {
        match self {
            ControlCommand::TailOn => "TAIL on\n".to_string(),
            ControlCommand::Peers => "PEERS\n".to_string(),
            ControlCommand::Connect(address) => format!("CONNECT {}\n", address),
            ControlCommand::Disconnect => "DISCONNECT\n".to_string(),
            ControlCommand::Send(text) => format!("SEND {}\n", text),
            ControlCommand::Quit => "QUIT\n".to_string(),
        }
    }

    /// Command verb, for error reporting
    pub fn verb(&self) -> &'static str {
        match self {
            ControlCommand::TailOn => "TAIL",
            ControlCommand::Peers => "PEERS",
            ControlCommand::Connect(_) => "CONNECT",
            ControlCommand::Disconnect => "DISCONNECT",
            ControlCommand::Send(_) => "SEND",
            ControlCommand::Quit => "QUIT",
        }
    }
}

// ----------------------------------------------------------------------------
// Client
// ----------------------------------------------------------------------------

/// One-shot command channel to a daemon control socket
#[derive(Debug, Clone)]
pub struct ControlClient {
    path: PathBuf,
    timeout: Duration,
}

impl ControlClient {
    /// Create a client for the socket at `path`
    pub fn new<P: Into<PathBuf>>(path: P, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    /// Issue one command: connect, write, drain the reply until the daemon
    /// closes. A reply starting with `ERR` is a rejection carrying the
    /// drained output as detail.
    pub async fn send(&self, command: &ControlCommand) -> Result<String, ControlError> {
        debug!(path = %self.path.display(), verb = command.verb(), "control send");
        let round_trip = async {
            let mut stream = UnixStream::connect(&self.path).await?;
            stream.write_all(command.wire_line().as_bytes()).await?;
            let mut reply = String::new();
            stream.read_to_string(&mut reply).await?;
            Ok::<String, ControlError>(reply)
        };
        let reply = timeout(self.timeout, round_trip)
            .await
            .map_err(|_| ControlError::timeout(self.timeout))??;
        let reply = reply.trim().to_string();
        if reply.starts_with("ERR") {
            return Err(ControlError::rejected(command.verb(), reply));
        }
        Ok(reply)
    }

    /// Poll until the socket accepts connections. The daemon creates its
    /// socket some time after launch; commands issued earlier would fail.
    pub async fn wait_ready(&self, total: Duration, poll: Duration) -> Result<(), ControlError> {
        let deadline = Instant::now() + total;
        loop {
            if let Ok(stream) = UnixStream::connect(&self.path).await {
                drop(stream);
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ControlError::NotListening {
                    path: self.path.display().to_string(),
                });
            }
            sleep(poll).await;
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
