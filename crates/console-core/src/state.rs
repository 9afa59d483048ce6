//! Consolidated console state and the event reducer
//!
//! `ConsoleState` is the one passable object holding everything the console
//! reconstructs from daemon logs: both link machines, the peer directory and
//! the security state. `apply` is the sole mutation path for log events;
//! the runtime calls it line by line and presentation code only ever reads
//! snapshots.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::directory::PeerDirectory;
use crate::events::LogEvent;
use crate::link::{CentralLink, PeripheralLink};
use crate::security::SecurityState;
use crate::types::{DeviceAddress, Message, PeerKey, Role};

// ----------------------------------------------------------------------------
// Select outcome
// ----------------------------------------------------------------------------

/// What a peer selection requires from the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The link already serves this peer; only the view changed
    ViewOnly,
    /// The link must be (re)established; issue a connect
    NeedsConnect,
}

// ----------------------------------------------------------------------------
// Console state
// ----------------------------------------------------------------------------

/// Everything reconstructed from the two daemons' logs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleState {
    /// Central link machine
    pub central: CentralLink,
    /// Peripheral link machine
    pub peripheral: PeripheralLink,
    /// Peers, conversations, identity tables
    pub directory: PeerDirectory,
    /// Encrypted-session knowledge
    pub security: SecurityState,
    /// Local identity shown in the status line
    pub local_id: String,
    /// Control socket paths announced by the daemons; overrides the
    /// configured defaults for that role
    announced_sockets: HashMap<Role, String>,
}

impl ConsoleState {
    /// Create state for a console with the given local identity and local
    /// encryption capability
    pub fn new(local_id: String, local_capable: bool) -> Self {
        Self {
            central: CentralLink::default(),
            peripheral: PeripheralLink::default(),
            directory: PeerDirectory::new(),
            security: SecurityState::with_local_capability(local_capable),
            local_id,
            announced_sockets: HashMap::new(),
        }
    }

    /// Control socket path announced by the daemon for `role`, if any
    pub fn announced_socket(&self, role: Role) -> Option<&str> {
        self.announced_sockets.get(&role).map(String::as_str)
    }

    // ------------------------------------------------------------------
    // Reducer
    // ------------------------------------------------------------------

    /// Fold one classified log line from the daemon running `role` into the
    /// state. Never fails; unresolvable events degrade to the placeholder
    /// peer.
    pub fn apply(&mut self, role: Role, event: &LogEvent) {
        debug!(role = %role, ?event, "applying event");
        match event {
            LogEvent::DecryptFailure => {
                self.security.on_decrypt_failure();
                let target = self.security_target();
                self.directory.add_message(
                    target,
                    Message::system(
                        "PSK mismatch: decryption failed, messages are being dropped...",
                    ),
                    true,
                );
            }
            LogEvent::HandshakeComplete => {
                self.security.on_handshake_complete();
                let target = self.security_target();
                self.directory
                    .add_message(target, Message::system("AEAD enabled"), true);
            }
            LogEvent::HandshakeFailed => {
                self.security.on_handshake_failed();
                let target = self.security_target();
                self.directory.add_message(
                    target,
                    Message::system("KEX failed. Please check BITCHAT_PSK and retry again"),
                    true,
                );
            }
            LogEvent::SocketPathAnnounced { path } => {
                self.announced_sockets.insert(role, path.clone());
            }
            LogEvent::PayloadReceived { text } => self.on_payload(role, text),
            LogEvent::PeerDiscovered { handle, address } => {
                self.directory.bind_handle(handle, address.clone());
                let display = self.directory.display_for(address);
                self.directory
                    .upsert(PeerKey::Device(address.clone()), Some(&display));
            }
            LogEvent::PeerListEntry { address, .. } => {
                let display = self.directory.display_for(address);
                self.directory
                    .upsert(PeerKey::Device(address.clone()), Some(&display));
            }
            LogEvent::PeerListEmpty => {}
            LogEvent::LinkConnected { handle } => self.on_link_connected(handle),
            LogEvent::LinkReady => {
                if role == Role::Central {
                    self.on_link_ready();
                }
            }
            LogEvent::LinkDisconnected { handle } => self.on_link_disconnected(handle),
            LogEvent::DiscoveryStarted => {
                if role == Role::Central {
                    self.central.discovering = true;
                }
            }
            LogEvent::DiscoveryStopped => {
                if role == Role::Central {
                    self.central.discovering = false;
                }
            }
            LogEvent::AdvertisingStarted => {
                if role == Role::Peripheral {
                    self.peripheral.advertising = true;
                }
            }
            LogEvent::HelloInbound { user, caps } => {
                let encrypting = caps.supports_encryption();
                match role {
                    Role::Central => {
                        if let Some(active) = self.central.active.clone() {
                            self.apply_hello(&active, user, encrypting);
                        }
                    }
                    Role::Peripheral => {
                        self.directory.set_inbox_sender(Some(user.clone()));
                        self.directory.add_message(
                            PeerKey::Inbox,
                            Message::system(format!(
                                "(hello) peer id is '{}'",
                                display_or_none(user)
                            )),
                            true,
                        );
                        // A peripheral-side hello can describe the peer the
                        // central link is talking to; merge it once per link.
                        if self.central.ready {
                            if let Some(active) = self.central.active.clone() {
                                if !self.directory.hello_applied(&active) {
                                    self.apply_hello(&active, user, encrypting);
                                }
                            }
                        }
                    }
                }
            }
            LogEvent::HelloOutbound { caps, .. } => {
                if role == Role::Central {
                    self.security.local_capable = caps.supports_encryption();
                }
            }
        }
    }

    /// A daemon's output stream closed: everything that daemon reported is
    /// stale until it logs again. For the central role that includes the
    /// link, the handle table and the remote security knowledge.
    pub fn apply_stream_closed(&mut self, role: Role) {
        match role {
            Role::Central => {
                self.central.on_stream_closed();
                self.directory.clear_handles();
                self.security.on_link_down();
            }
            Role::Peripheral => self.peripheral.on_stream_closed(),
        }
    }

    // ------------------------------------------------------------------
    // Event handlers
    // ------------------------------------------------------------------

    fn on_payload(&mut self, role: Role, text: &str) {
        match role {
            Role::Peripheral => {
                let sender = self.directory.inbox_sender().map(String::from);
                self.directory
                    .add_message(PeerKey::Inbox, Message::incoming(text, sender), true);
                // Mirror into the active conversation when the central link
                // is serving a peer right now.
                if self.central.ready {
                    if let Some(active) = self.central.active.clone() {
                        let key = PeerKey::Device(active.clone());
                        let current = self
                            .directory
                            .get(&key)
                            .map(|p| p.display.clone())
                            .unwrap_or_else(|| active.to_string());
                        let sender = self
                            .directory
                            .inbox_sender()
                            .map(String::from)
                            .unwrap_or_else(|| self.directory.display_for(&active));
                        let display = self.directory.display_for(&active);
                        if display != current {
                            self.directory.upsert(key.clone(), Some(&display));
                        }
                        self.directory
                            .add_message(key, Message::incoming(text, Some(sender)), true);
                    }
                }
            }
            Role::Central => {
                let key = match self.central.active.clone() {
                    Some(address) => PeerKey::Device(address),
                    None => self.directory.selected().clone(),
                };
                let sender = self.directory.get(&key).map(|p| p.display.clone());
                self.directory
                    .add_message(key.clone(), Message::incoming(text, sender.clone()), true);
                // Mirrored inbox copy for completeness; it is not unread.
                if key != PeerKey::Inbox {
                    self.directory
                        .add_message(PeerKey::Inbox, Message::incoming(text, sender), false);
                }
            }
        }
    }

    fn on_link_connected(&mut self, handle: &str) {
        let key = self.directory.resolve_handle(handle);
        if let Some(address) = key.device().cloned() {
            let display = self.directory.display_for(&address);
            let peer = self.directory.upsert(key.clone(), Some(&display));
            peer.connected = true;
            self.central.on_connected(address);
        } else {
            self.central.connected = true;
            self.central.ready = false;
        }
        self.directory.add_message(
            key,
            Message::system("link up, resolving services..."),
            true,
        );
    }

    fn on_link_ready(&mut self) {
        self.central.on_ready();
        let key = self.directory.selected().clone();
        if let Some(address) = key.device().cloned() {
            let current = self
                .directory
                .get(&key)
                .map(|p| p.display.clone())
                .unwrap_or_else(|| address.to_string());
            let peer = self.directory.upsert(key.clone(), None);
            peer.connected = true;
            let display = self.directory.display_for(&address);
            if display != current {
                self.directory.upsert(key.clone(), Some(&display));
                self.directory.add_message(
                    key.clone(),
                    Message::system(format!("(hello) peer {}'s id is '{}'", address, display)),
                    true,
                );
            }
        }
        self.directory
            .add_message(key, Message::system("ready - notifications enabled"), true);
    }

    fn on_link_disconnected(&mut self, handle: &str) {
        let key = self.directory.resolve_handle(handle);
        // The handle is dead; a later reuse may name a different device.
        self.directory.unbind_handle(handle);
        if let Some(address) = key.device().cloned() {
            let display = self.directory.display_for(&address);
            let peer = self.directory.upsert(key.clone(), Some(&display));
            peer.connected = false;
            self.directory.clear_hello_applied(&address);
        }
        self.central.on_disconnected();
        self.security.on_link_down();
        self.directory.set_inbox_sender(None);
        self.directory
            .add_message(key, Message::system("link down"), true);
    }

    /// Apply a handshake announcement for the active peer: learn the name,
    /// upgrade the display, record remote capability, note it in the
    /// conversation and arm the once-per-link guard.
    fn apply_hello(&mut self, address: &DeviceAddress, user: &str, encrypting: bool) {
        self.directory.learn_name(address, user);
        let display = self.directory.display_for(address);
        self.directory
            .upsert(PeerKey::Device(address.clone()), Some(&display));
        self.security.remote_capable = encrypting;
        self.directory.add_message(
            PeerKey::Device(address.clone()),
            Message::system(format!(
                "(hello) peer {}'s id is '{}'",
                address,
                display_or_none(user)
            )),
            true,
        );
        self.directory.mark_hello_applied(address);
    }

    /// Conversation that security notices belong to: the active peer, else
    /// whatever is selected.
    fn security_target(&self) -> PeerKey {
        match self.central.active.clone() {
            Some(address) => PeerKey::Device(address),
            None => self.directory.selected().clone(),
        }
    }

    // ------------------------------------------------------------------
    // User intents (pure state part)
    // ------------------------------------------------------------------

    /// Switch the view to `address`, reporting whether the runtime must
    /// issue a connect. Selecting the peer the live link already serves is
    /// a pure view switch; anything else tears down local link state first.
    pub fn select_device(&mut self, address: DeviceAddress) -> SelectOutcome {
        let key = PeerKey::Device(address.clone());
        if self.central.active.as_ref() == Some(&address) && self.central.ready {
            self.directory.select(key);
            return SelectOutcome::ViewOnly;
        }
        if self.directory.selected() == &key && (self.central.ready || self.central.connected) {
            return SelectOutcome::ViewOnly;
        }
        self.directory.select(key);
        self.central.clear_active();
        SelectOutcome::NeedsConnect
    }

    /// Local state change for a user-initiated disconnect
    pub fn on_user_disconnect(&mut self) {
        self.central.clear_active();
    }

    /// Whether a text send is currently possible, and if not, why
    pub fn can_send(&self) -> Result<&DeviceAddress, &'static str> {
        match self.directory.selected() {
            PeerKey::Inbox => Err("inbox is incoming-only"),
            PeerKey::Unknown => Err("no peer selected"),
            PeerKey::Device(address) => {
                if self.central.ready {
                    Ok(address)
                } else {
                    Err("not connected/subscribed")
                }
            }
        }
    }

    /// Append an outgoing message to the selected conversation
    pub fn append_outgoing(&mut self, text: &str) {
        let key = self.directory.selected().clone();
        self.directory.add_message(key, Message::outgoing(text), true);
    }

    /// Append a system note to the selected conversation
    pub fn append_system(&mut self, text: &str) {
        let key = self.directory.selected().clone();
        self.directory.add_message(key, Message::system(text), true);
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    /// One-line status summary for the status bar
    pub fn status_summary(&self) -> String {
        let peer_display = self
            .directory
            .get(self.directory.selected())
            .map(|p| p.display.clone())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "My ID: {} | central: {} | peripheral: {} | peer: {} | sec: {} | inbox:{}",
            self.local_id,
            self.central.status().as_str(),
            self.peripheral.status_str(),
            peer_display,
            self.security.badge().as_str(),
            self.directory.inbox_unread(),
        )
    }
}

fn display_or_none(user: &str) -> &str {
    if user.is_empty() {
        "<none>"
    } else {
        user
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::classify;
    use crate::link::CentralStatus;
    use crate::security::SecurityBadge;
    use crate::types::{CapabilityFlags, Direction};

    fn addr(s: &str) -> DeviceAddress {
        s.parse().unwrap()
    }

    fn state() -> ConsoleState {
        ConsoleState::new("me".to_string(), true)
    }

    fn feed(state: &mut ConsoleState, role: Role, line: &str) {
        let event = classify(line).expect("line must classify");
        state.apply(role, &event);
    }

    #[test]
    fn test_full_link_lifecycle() {
        let mut st = state();
        let a = addr("11:22:33:44:55:66");

        feed(&mut st, Role::Central, "StartDiscovery OK");
        assert_eq!(st.central.status(), CentralStatus::Scanning);

        feed(
            &mut st,
            Role::Central,
            "found dev_11_22 addr=11:22:33:44:55:66",
        );
        assert!(st.directory.get(&PeerKey::Device(a.clone())).is_some());

        feed(&mut st, Role::Central, "Device connected: dev_11_22");
        assert_eq!(st.central.status(), CentralStatus::Linked);
        assert_eq!(st.central.active, Some(a.clone()));

        st.directory.select(PeerKey::Device(a.clone()));
        feed(&mut st, Role::Central, "Notifications enabled; ready");
        assert_eq!(st.central.status(), CentralStatus::Ready);

        feed(
            &mut st,
            Role::Central,
            "[CTRL] HELLO in: user='alice' caps=0x00000001",
        );
        assert_eq!(
            st.directory.get(&PeerKey::Device(a.clone())).unwrap().display,
            "alice"
        );
        assert!(st.security.remote_capable);

        feed(&mut st, Role::Central, "[KEX] complete.");
        assert_eq!(st.security.badge(), SecurityBadge::Secure);

        feed(&mut st, Role::Central, "Disconnected (dev_11_22)");
        assert_eq!(st.central.status(), CentralStatus::Idle);
        assert!(st.central.active.is_none());
        assert_eq!(st.security.badge(), SecurityBadge::Plaintext);
        let peer = st.directory.get(&PeerKey::Device(a.clone())).unwrap();
        assert!(!peer.connected);
        // The name survives the link
        assert_eq!(peer.display, "alice");
        assert_eq!(
            peer.history.last().unwrap().text,
            "link down"
        );
        // The dead handle no longer resolves
        assert_eq!(st.directory.handle_address("dev_11_22"), None);
    }

    #[test]
    fn test_peripheral_payload_goes_to_inbox_with_unread() {
        let mut st = state();
        feed(
            &mut st,
            Role::Peripheral,
            "[CTRL] HELLO in: user='bob' caps=0x00000000",
        );
        feed(&mut st, Role::Peripheral, "[RECV] hi there");

        assert_eq!(st.directory.inbox_unread(), 1);
        let inbox = st.directory.get(&PeerKey::Inbox).unwrap();
        let last = inbox.history.last().unwrap();
        assert_eq!(last.direction, Direction::In);
        assert_eq!(last.text, "hi there");
        assert_eq!(last.sender.as_deref(), Some("bob"));

        st.directory.view_inbox();
        assert_eq!(st.directory.inbox_unread(), 0);
    }

    #[test]
    fn test_peripheral_payload_mirrors_to_active_peer_when_ready() {
        let mut st = state();
        let a = addr("11:22:33:44:55:66");
        feed(&mut st, Role::Central, "found dev_A addr=11:22:33:44:55:66");
        feed(&mut st, Role::Central, "Device connected: dev_A");
        feed(&mut st, Role::Central, "Notifications enabled; ready");
        feed(&mut st, Role::Peripheral, "[RECV] mirrored");

        let peer = st.directory.get(&PeerKey::Device(a)).unwrap();
        assert_eq!(peer.history.last().unwrap().text, "mirrored");
        // The inbox copy still counts as unread
        assert_eq!(st.directory.inbox_unread(), 1);
    }

    #[test]
    fn test_central_payload_mirrors_to_inbox_without_unread() {
        let mut st = state();
        let a = addr("11:22:33:44:55:66");
        feed(&mut st, Role::Central, "found dev_A addr=11:22:33:44:55:66");
        feed(&mut st, Role::Central, "Device connected: dev_A");
        feed(&mut st, Role::Central, "[RECV] reply");

        let peer = st.directory.get(&PeerKey::Device(a)).unwrap();
        assert_eq!(peer.history.last().unwrap().text, "reply");
        let inbox = st.directory.get(&PeerKey::Inbox).unwrap();
        assert_eq!(inbox.history.last().unwrap().text, "reply");
        assert_eq!(st.directory.inbox_unread(), 0);
    }

    #[test]
    fn test_peripheral_hello_merges_into_active_conversation_once() {
        let mut st = state();
        let a = addr("11:22:33:44:55:66");
        feed(&mut st, Role::Central, "found dev_A addr=11:22:33:44:55:66");
        feed(&mut st, Role::Central, "Device connected: dev_A");
        feed(&mut st, Role::Central, "Notifications enabled; ready");

        feed(
            &mut st,
            Role::Peripheral,
            "[CTRL] HELLO in: user='alice' caps=0x00000001",
        );
        let key = PeerKey::Device(a.clone());
        assert_eq!(st.directory.get(&key).unwrap().display, "alice");
        assert!(st.security.remote_capable);
        let count = st.directory.get(&key).unwrap().history.len();

        // A second peripheral hello touches the inbox but not the peer
        feed(
            &mut st,
            Role::Peripheral,
            "[CTRL] HELLO in: user='alice' caps=0x00000001",
        );
        assert_eq!(st.directory.get(&key).unwrap().history.len(), count);
    }

    #[test]
    fn test_hello_with_empty_name_keeps_address_display() {
        let mut st = state();
        let a = addr("11:22:33:44:55:66");
        feed(&mut st, Role::Central, "found dev_A addr=11:22:33:44:55:66");
        feed(&mut st, Role::Central, "Device connected: dev_A");
        feed(
            &mut st,
            Role::Central,
            "[CTRL] HELLO in: user='' caps=0x00000001",
        );
        let peer = st.directory.get(&PeerKey::Device(a.clone())).unwrap();
        assert_eq!(peer.display, "11:22:33:44:55:66");
        assert!(st.security.remote_capable);
        assert!(peer
            .history
            .last()
            .unwrap()
            .text
            .contains("id is '<none>'"));
    }

    #[test]
    fn test_decrypt_failure_degrades_badge_and_notes_it() {
        let mut st = state();
        let a = addr("11:22:33:44:55:66");
        feed(&mut st, Role::Central, "found dev_A addr=11:22:33:44:55:66");
        feed(&mut st, Role::Central, "Device connected: dev_A");
        feed(
            &mut st,
            Role::Central,
            "[CTRL] HELLO in: user='alice' caps=0x00000001",
        );
        feed(&mut st, Role::Central, "[KEX] complete.");
        assert_eq!(st.security.badge(), SecurityBadge::Secure);

        feed(
            &mut st,
            Role::Central,
            "[SEC] AEAD decrypt failed, dropping frame",
        );
        assert_eq!(st.security.badge(), SecurityBadge::Warning);
        let peer = st.directory.get(&PeerKey::Device(a)).unwrap();
        assert!(peer
            .history
            .last()
            .unwrap()
            .text
            .starts_with("PSK mismatch"));
    }

    #[test]
    fn test_hello_outbound_sets_local_capability() {
        let mut st = ConsoleState::new("me".to_string(), false);
        st.apply(
            Role::Central,
            &LogEvent::HelloOutbound {
                user: "me".to_string(),
                caps: CapabilityFlags::new(1),
            },
        );
        assert!(st.security.local_capable);
    }

    #[test]
    fn test_socket_announcement_rebinds_per_role() {
        let mut st = state();
        feed(&mut st, Role::Central, "Listening on /tmp/c.sock");
        assert_eq!(st.announced_socket(Role::Central), Some("/tmp/c.sock"));
        assert_eq!(st.announced_socket(Role::Peripheral), None);
    }

    #[test]
    fn test_stream_closed_resets_role_state() {
        let mut st = state();
        feed(&mut st, Role::Central, "Device connected: dev_A");
        feed(&mut st, Role::Peripheral, "LE advertisement registered successfully");
        st.apply_stream_closed(Role::Central);
        assert_eq!(st.central.status(), CentralStatus::Idle);
        assert!(st.peripheral.advertising);
        st.apply_stream_closed(Role::Peripheral);
        assert!(!st.peripheral.advertising);
    }

    #[test]
    fn test_select_device_semantics() {
        let mut st = state();
        let a = addr("11:22:33:44:55:66");
        let b = addr("AA:BB:CC:DD:EE:FF");

        // Nothing connected: selection needs a connect
        assert_eq!(st.select_device(a.clone()), SelectOutcome::NeedsConnect);
        assert_eq!(st.directory.selected(), &PeerKey::Device(a.clone()));

        // Link comes up and is ready
        feed(&mut st, Role::Central, "found dev_A addr=11:22:33:44:55:66");
        feed(&mut st, Role::Central, "Device connected: dev_A");
        feed(&mut st, Role::Central, "Notifications enabled; ready");

        // Re-selecting the served peer is a view switch
        assert_eq!(st.select_device(a.clone()), SelectOutcome::ViewOnly);

        // Selecting a different peer tears down local link state
        assert_eq!(st.select_device(b.clone()), SelectOutcome::NeedsConnect);
        assert!(st.central.active.is_none());
        assert!(!st.central.ready);
        assert_eq!(st.directory.selected(), &PeerKey::Device(b));
    }

    #[test]
    fn test_can_send_gating() {
        let mut st = state();
        assert_eq!(st.can_send().unwrap_err(), "inbox is incoming-only");

        let a = addr("11:22:33:44:55:66");
        st.select_device(a.clone());
        assert_eq!(st.can_send().unwrap_err(), "not connected/subscribed");

        feed(&mut st, Role::Central, "found dev_A addr=11:22:33:44:55:66");
        feed(&mut st, Role::Central, "Device connected: dev_A");
        feed(&mut st, Role::Central, "Notifications enabled; ready");
        assert_eq!(st.can_send().unwrap(), &a);

        st.append_outgoing("hello");
        let peer = st.directory.get(&PeerKey::Device(a)).unwrap();
        let last = peer.history.last().unwrap();
        assert_eq!(last.direction, Direction::Out);
        assert_eq!(last.text, "hello");
    }

    #[test]
    fn test_status_summary_shape() {
        let mut st = state();
        feed(&mut st, Role::Peripheral, "LE advertisement registered successfully");
        let summary = st.status_summary();
        assert_eq!(
            summary,
            "My ID: me | central: idle | peripheral: adv | peer: Inbox | sec: 🔓 | inbox:0"
        );
    }

    #[test]
    fn test_unresolvable_disconnect_degrades_to_placeholder() {
        let mut st = state();
        feed(&mut st, Role::Central, "Disconnected (dev_never_seen)");
        let peer = st.directory.get(&PeerKey::Unknown).unwrap();
        assert_eq!(peer.history.last().unwrap().text, "link down");
    }
}
