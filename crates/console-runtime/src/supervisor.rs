//! Daemon process supervision
//!
//! `DaemonSupervisor` owns one worker daemon: it launches the binary as a
//! process-group leader with the role environment injected, forwards its
//! stdout and stderr line by line into one channel while mirroring them to a
//! per-role log file, and tears it down through an escalating three-stage
//! stop (graceful quit over the control socket, terminate signal to the
//! group, kill signal to the group).

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use console_core::{ConsoleConfig, Role, SupervisorError};

use crate::control::{ControlClient, ControlCommand};

// ----------------------------------------------------------------------------
// Supervisor
// ----------------------------------------------------------------------------

/// Supervises one worker daemon for its whole lifecycle
pub struct DaemonSupervisor {
    role: Role,
    binary: PathBuf,
    socket: PathBuf,
    mirror_path: PathBuf,
    log_level: String,
    quit_wait: Duration,
    term_wait: Duration,
    child: Option<Child>,
    mirror: Option<Arc<Mutex<File>>>,
}

impl DaemonSupervisor {
    /// Create a supervisor for `role` from the console configuration
    pub fn new(role: Role, config: &ConsoleConfig) -> Self {
        Self {
            role,
            binary: config.resolve_daemon_bin(),
            socket: config.socket_for(role).to_path_buf(),
            mirror_path: config.mirror_path(role),
            log_level: config.log_level.clone(),
            quit_wait: config.quit_wait(),
            term_wait: config.term_wait(),
            child: None,
            mirror: None,
        }
    }

    /// Override the daemon binary (tests use a scripted stand-in)
    pub fn with_binary<P: Into<PathBuf>>(mut self, binary: P) -> Self {
        self.binary = binary.into();
        self
    }

    /// Whether the daemon has been started and not yet stopped or reaped
    pub fn is_running(&mut self) -> bool {
        match &mut self.child {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Launch the daemon and return the channel carrying its output lines.
    /// Both stdout and stderr are forwarded; each is also appended to the
    /// per-role mirror file.
    pub async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<String>, SupervisorError> {
        if let Some(parent) = self.socket.parent() {
            fs::create_dir_all(parent).await?;
        }
        if let Some(parent) = self.mirror_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mirror = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.mirror_path)
            .await?;
        let mirror = Arc::new(Mutex::new(mirror));
        self.mirror = Some(mirror.clone());

        let mut command = Command::new(&self.binary);
        command
            .env("BITCHAT_TRANSPORT", "bluez")
            .env("BITCHAT_ROLE", self.role.as_str())
            .env("BITCHAT_CTL_SOCK", &self.socket)
            .env("BITCHAT_LOG_LEVEL", &self.log_level)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| SupervisorError::Spawn {
            role: self.role.as_str().to_string(),
            source,
        })?;
        info!(role = %self.role, binary = %self.binary.display(), "daemon started");

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone(), mirror.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx, mirror));
        }

        self.child = Some(child);
        Ok(rx)
    }

    /// Stop the daemon: graceful quit over the control socket, then a
    /// terminate signal to the process group, then a kill signal. Each
    /// stage is skipped when the daemon has already exited. Calling stop on
    /// a stopped supervisor is a no-op.
    pub async fn stop(&mut self, quit_client: Option<&ControlClient>) -> Result<(), SupervisorError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        // Stage 1: ask nicely over the control socket
        if matches!(child.try_wait(), Ok(None)) {
            if let Some(client) = quit_client {
                if let Err(e) = client.send(&ControlCommand::Quit).await {
                    debug!(role = %self.role, error = %e, "graceful quit not delivered");
                }
            }
            if timeout(self.quit_wait, child.wait()).await.is_ok() {
                info!(role = %self.role, "daemon exited after quit");
                self.flush_mirror().await;
                return Ok(());
            }
        }

        // Stage 2: terminate the process group
        if matches!(child.try_wait(), Ok(None)) {
            if let Some(pid) = child.id() {
                // The daemon may vanish between the check and the signal
                let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
            if timeout(self.term_wait, child.wait()).await.is_ok() {
                info!(role = %self.role, "daemon exited after terminate");
                self.flush_mirror().await;
                return Ok(());
            }
        }

        // Stage 3: kill the process group and wait unconditionally
        if let Some(pid) = child.id() {
            warn!(role = %self.role, "daemon did not exit, killing process group");
            let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
        }
        let _ = child.wait().await;
        self.flush_mirror().await;
        Ok(())
    }

    async fn flush_mirror(&mut self) {
        if let Some(mirror) = self.mirror.take() {
            let mut file = mirror.lock().await;
            let _ = file.flush().await;
        }
    }
}

/// Forward one output stream line by line, teeing into the mirror file.
/// Ends when the stream closes; the channel closing with it tells the
/// reader the daemon is gone.
async fn forward_lines<R: AsyncRead + Unpin>(
    stream: R,
    tx: mpsc::UnboundedSender<String>,
    mirror: Arc<Mutex<File>>,
) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        {
            let mut file = mirror.lock().await;
            let _ = file.write_all(line.as_bytes()).await;
            let _ = file.write_all(b"\n").await;
        }
        if tx.send(line).is_err() {
            break;
        }
    }
    let mut file = mirror.lock().await;
    let _ = file.flush().await;
}
