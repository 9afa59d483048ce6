//! Console engine
//!
//! Owns the shared `ConsoleState` and the two daemon supervisors. One task
//! per daemon reads output lines, classifies them and folds the events into
//! the state; that path is the state's only writer for log events. A setup
//! task enables payload tailing once both control sockets listen, and a
//! background task polls the peer list. User intents run against whichever
//! control socket the daemon last announced, falling back to the configured
//! default.

use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use console_core::{
    classify, ConsoleConfig, ConsoleError, ConsoleState, DeviceAddress, Result, Role,
    SelectOutcome,
};

use crate::control::{ControlClient, ControlCommand};
use crate::supervisor::DaemonSupervisor;

// ----------------------------------------------------------------------------
// Engine
// ----------------------------------------------------------------------------

/// Supervises both daemons and maintains the reconstructed state
pub struct Engine {
    config: ConsoleConfig,
    state: Arc<RwLock<ConsoleState>>,
    central: DaemonSupervisor,
    peripheral: DaemonSupervisor,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    stopped: bool,
}

impl Engine {
    /// Create an engine from configuration; nothing runs until `start`
    pub fn new(config: ConsoleConfig) -> Self {
        let state = ConsoleState::new(config.local_id(), config.psk_configured);
        let (shutdown_tx, _) = watch::channel(false);
        let central = DaemonSupervisor::new(Role::Central, &config);
        let peripheral = DaemonSupervisor::new(Role::Peripheral, &config);
        Self {
            config,
            state: Arc::new(RwLock::new(state)),
            central,
            peripheral,
            shutdown_tx,
            tasks: Vec::new(),
            stopped: false,
        }
    }

    /// Replace a supervisor before start (tests inject scripted daemons)
    pub fn with_supervisors(mut self, central: DaemonSupervisor, peripheral: DaemonSupervisor) -> Self {
        self.central = central;
        self.peripheral = peripheral;
        self
    }

    /// Shared state handle for presentation code
    pub fn state(&self) -> Arc<RwLock<ConsoleState>> {
        self.state.clone()
    }

    /// Clone of the current state
    pub async fn snapshot(&self) -> ConsoleState {
        self.state.read().await.clone()
    }

    /// Current one-line status summary
    pub async fn status_summary(&self) -> String {
        self.state.read().await.status_summary()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Launch both daemons and all background tasks
    pub async fn start(&mut self) -> Result<()> {
        info!("starting console engine");
        let central_rx = self.central.start().await?;
        let peripheral_rx = self.peripheral.start().await?;

        for (role, mut rx) in [
            (Role::Central, central_rx),
            (Role::Peripheral, peripheral_rx),
        ] {
            let state = self.state.clone();
            let mut shutdown = self.shutdown_tx.subscribe();
            self.tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        line = rx.recv() => match line {
                            Some(line) => {
                                if let Some(event) = classify(&line) {
                                    state.write().await.apply(role, &event);
                                }
                            }
                            None => {
                                debug!(role = %role, "daemon output closed");
                                state.write().await.apply_stream_closed(role);
                                break;
                            }
                        },
                        _ = shutdown.changed() => break,
                    }
                }
            }));
        }

        self.spawn_tail_enable();
        self.spawn_peer_poll();
        Ok(())
    }

    /// Stop everything: background tasks first, then both daemons through
    /// the escalating shutdown. Safe to call more than once; duplicate
    /// requests (signal handler racing normal exit) are no-ops.
    pub async fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        info!("stopping console engine");
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            task.abort();
        }

        let central_client = self.control_client(Role::Central).await;
        let peripheral_client = self.control_client(Role::Peripheral).await;
        self.central.stop(Some(&central_client)).await?;
        self.peripheral.stop(Some(&peripheral_client)).await?;

        let mut state = self.state.write().await;
        state.apply_stream_closed(Role::Central);
        state.apply_stream_closed(Role::Peripheral);
        Ok(())
    }

    // ------------------------------------------------------------------
    // User intents
    // ------------------------------------------------------------------

    /// Select a peer; issues a connect when the link does not already
    /// serve it. Control failures surface as system messages, not errors.
    pub async fn select_peer(&self, address: DeviceAddress) {
        let outcome = self.state.write().await.select_device(address.clone());
        if outcome == SelectOutcome::ViewOnly {
            return;
        }
        let client = self.control_client(Role::Central).await;
        if let Err(e) = self
            .ready_send(&client, &ControlCommand::Connect(address))
            .await
        {
            warn!(error = %e, "connect request failed");
            self.state
                .write()
                .await
                .append_system(&format!("connect failed: {}", e));
        }
    }

    /// Tear down the active link. A control failure surfaces as a system
    /// message; local link state is cleared either way.
    pub async fn disconnect(&self) {
        let client = self.control_client(Role::Central).await;
        if let Err(e) = self.ready_send(&client, &ControlCommand::Disconnect).await {
            warn!(error = %e, "disconnect request failed");
            self.state
                .write()
                .await
                .append_system(&format!("disconnect failed: {}", e));
        }
        self.state.write().await.on_user_disconnect();
    }

    /// Send a text payload to the selected peer. The message is appended to
    /// the conversation before the send; a failed send appends a system
    /// note and reports the error.
    pub async fn send_text(&self, text: &str) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if let Err(reason) = state.can_send() {
                return Err(ConsoleError::not_ready(reason));
            }
            state.append_outgoing(text);
        }
        let client = self.control_client(Role::Central).await;
        if let Err(e) = client.send(&ControlCommand::Send(text.to_string())).await {
            self.state
                .write()
                .await
                .append_system(&format!("send failed: {}", e));
            return Err(e.into());
        }
        Ok(())
    }

    /// Show the inbox and clear its unread counter
    pub async fn view_inbox(&self) {
        self.state.write().await.directory.view_inbox();
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Client for the control socket the daemon last announced for `role`,
    /// else the configured default
    async fn control_client(&self, role: Role) -> ControlClient {
        let announced = self
            .state
            .read()
            .await
            .announced_socket(role)
            .map(String::from);
        let path = announced.unwrap_or_else(|| {
            self.config.socket_for(role).display().to_string()
        });
        ControlClient::new(path, self.config.control_timeout())
    }

    /// Wait for the socket, then send
    async fn ready_send(
        &self,
        client: &ControlClient,
        command: &ControlCommand,
    ) -> std::result::Result<String, console_core::ControlError> {
        client
            .wait_ready(self.config.socket_wait(), self.config.socket_poll())
            .await?;
        client.send(command).await
    }

    /// Enable payload tailing on both daemons once their sockets listen.
    /// Best-effort; a daemon that never comes up only loses its echo.
    fn spawn_tail_enable(&mut self) {
        let config = self.config.clone();
        let state = self.state.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        self.tasks.push(tokio::spawn(async move {
            let enable = async {
                for role in [Role::Central, Role::Peripheral] {
                    let client = client_for(&config, &state, role).await;
                    if let Err(e) = client
                        .wait_ready(config.socket_wait(), config.socket_poll())
                        .await
                    {
                        warn!(role = %role, error = %e, "control socket never came up");
                        continue;
                    }
                    if let Err(e) = client.send(&ControlCommand::TailOn).await {
                        warn!(role = %role, error = %e, "enabling tail failed");
                    }
                }
            };
            tokio::select! {
                _ = enable => {}
                _ = shutdown.changed() => {}
            }
        }));
    }

    /// Poll the central daemon's peer list so the directory populates even
    /// without discovery logs. The daemon caches peers for 120 s; a 10 s
    /// default keeps the list fresh.
    fn spawn_peer_poll(&mut self) {
        let config = self.config.clone();
        let state = self.state.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = interval(config.peer_poll_interval());
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let client = client_for(&config, &state, Role::Central).await;
                        if let Err(e) = client.send(&ControlCommand::Peers).await {
                            debug!(error = %e, "peer poll failed");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        }));
    }
}

/// Free-function variant of `control_client` for spawned tasks
async fn client_for(
    config: &ConsoleConfig,
    state: &Arc<RwLock<ConsoleState>>,
    role: Role,
) -> ControlClient {
    let announced = state.read().await.announced_socket(role).map(String::from);
    let path = announced.unwrap_or_else(|| config.socket_for(role).display().to_string());
    ControlClient::new(path, config.control_timeout())
}
