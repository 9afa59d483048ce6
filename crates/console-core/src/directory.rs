//! Peer directory and identity resolution
//!
//! Owns every conversation the console knows about: real devices, the
//! reserved inbox, and the placeholder used when an event resolves to no
//! device. Peers are created lazily and never deleted. Alongside the
//! conversations it keeps the identity-resolution tables: the transient
//! handle table (handle -> address, at most one live identity per handle),
//! the name book (address -> announced user name, freshest announcement
//! wins), and the per-address guard that keeps a handshake announcement from
//! being applied to the same peer twice per link.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::{DeviceAddress, Direction, Message, Peer, PeerKey, Timestamp};

// ----------------------------------------------------------------------------
// Directory
// ----------------------------------------------------------------------------

/// All known peers plus the identity tables used to resolve log events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerDirectory {
    peers: HashMap<PeerKey, Peer>,
    /// Conversation currently shown; always a key present in `peers`
    selected: PeerKey,
    inbox_unread: u32,
    /// Transient handle -> stable address; entries die with their handle
    handles: HashMap<String, DeviceAddress>,
    /// Announced user names, keyed by address; the latest announcement wins
    namebook: HashMap<DeviceAddress, String>,
    /// Addresses whose handshake announcement was already applied this link
    hello_applied: HashSet<DeviceAddress>,
    /// Sender label for inbox entries, learned from the peripheral handshake
    inbox_sender: Option<String>,
}

impl Default for PeerDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerDirectory {
    /// Create a directory holding only the inbox, selected
    pub fn new() -> Self {
        let mut peers = HashMap::new();
        peers.insert(PeerKey::Inbox, Peer::new(PeerKey::Inbox));
        Self {
            peers,
            selected: PeerKey::Inbox,
            inbox_unread: 0,
            handles: HashMap::new(),
            namebook: HashMap::new(),
            hello_applied: HashSet::new(),
            inbox_sender: None,
        }
    }

    // ------------------------------------------------------------------
    // Peers
    // ------------------------------------------------------------------

    /// Get or create the peer under `key`, refreshing its last-seen stamp.
    /// A non-empty `display` replaces the current display name.
    pub fn upsert(&mut self, key: PeerKey, display: Option<&str>) -> &mut Peer {
        let peer = self
            .peers
            .entry(key.clone())
            .or_insert_with(|| Peer::new(key));
        if let Some(name) = display {
            if !name.is_empty() {
                peer.display = name.to_string();
            }
        }
        peer.last_seen = Some(Timestamp::now());
        peer
    }

    /// The peer under `key`, if it exists
    pub fn get(&self, key: &PeerKey) -> Option<&Peer> {
        self.peers.get(key)
    }

    /// All known peers, unordered
    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    /// Append a message to the peer under `key`, creating it if needed.
    /// Inbound inbox entries bump the unread counter unless suppressed
    /// (mirrored copies do not count as unread).
    pub fn add_message(&mut self, key: PeerKey, message: Message, count_unread: bool) {
        let is_inbox_in = key == PeerKey::Inbox && message.direction == Direction::In;
        self.upsert(key, None).push(message);
        if is_inbox_in && count_unread {
            self.inbox_unread += 1;
        }
    }

    // ------------------------------------------------------------------
    // Selection and inbox
    // ------------------------------------------------------------------

    /// The conversation currently shown
    pub fn selected(&self) -> &PeerKey {
        &self.selected
    }

    /// Switch the shown conversation, creating the peer if needed
    pub fn select(&mut self, key: PeerKey) {
        self.upsert(key.clone(), None);
        self.selected = key;
    }

    /// Unread count of the inbox
    pub fn inbox_unread(&self) -> u32 {
        self.inbox_unread
    }

    /// Switch to the inbox and clear its unread counter. Only this explicit
    /// view resets the counter.
    pub fn view_inbox(&mut self) {
        self.selected = PeerKey::Inbox;
        self.inbox_unread = 0;
    }

    // ------------------------------------------------------------------
    // Identity resolution
    // ------------------------------------------------------------------

    /// Record that `handle` currently names `address`
    pub fn bind_handle(&mut self, handle: &str, address: DeviceAddress) {
        self.handles.insert(handle.to_string(), address);
    }

    /// Address currently bound to `handle`, if any
    pub fn handle_address(&self, handle: &str) -> Option<&DeviceAddress> {
        self.handles.get(handle)
    }

    /// Drop the binding for `handle`; the handle is dead once its device
    /// disconnects and a future reuse may name a different device.
    pub fn unbind_handle(&mut self, handle: &str) {
        self.handles.remove(handle);
    }

    /// Drop every handle binding. Handles are scoped to one daemon run;
    /// none survive the daemon that issued them.
    pub fn clear_handles(&mut self) {
        self.handles.clear();
    }

    /// Resolve a handle to a peer key, degrading rather than failing:
    /// exact binding first, then the selected peer if it is a real device,
    /// then the placeholder.
    pub fn resolve_handle(&self, handle: &str) -> PeerKey {
        if let Some(address) = self.handles.get(handle) {
            return PeerKey::Device(address.clone());
        }
        if self.selected.device().is_some() {
            return self.selected.clone();
        }
        PeerKey::Unknown
    }

    // ------------------------------------------------------------------
    // Name book
    // ------------------------------------------------------------------

    /// Record an announced user name for `address`. Empty names are ignored;
    /// a repeated announcement overwrites the previous one.
    pub fn learn_name(&mut self, address: &DeviceAddress, name: &str) {
        if !name.is_empty() {
            self.namebook.insert(address.clone(), name.to_string());
        }
    }

    /// Best display name for `address`: the name book, else the address
    pub fn display_for(&self, address: &DeviceAddress) -> String {
        self.namebook
            .get(address)
            .cloned()
            .unwrap_or_else(|| address.to_string())
    }

    /// Whether a handshake announcement was already applied to `address`
    /// during the current link
    pub fn hello_applied(&self, address: &DeviceAddress) -> bool {
        self.hello_applied.contains(address)
    }

    /// Mark the handshake announcement for `address` as applied
    pub fn mark_hello_applied(&mut self, address: &DeviceAddress) {
        self.hello_applied.insert(address.clone());
    }

    /// Forget the applied-handshake guard for `address`; the next link may
    /// announce again
    pub fn clear_hello_applied(&mut self, address: &DeviceAddress) {
        self.hello_applied.remove(address);
    }

    // ------------------------------------------------------------------
    // Inbox sender label
    // ------------------------------------------------------------------

    /// Sender label attached to inbox entries, if one was learned
    pub fn inbox_sender(&self) -> Option<&str> {
        self.inbox_sender.as_deref()
    }

    /// Record the sender label for future inbox entries; `None` for an
    /// empty announcement
    pub fn set_inbox_sender(&mut self, sender: Option<String>) {
        self.inbox_sender = sender.filter(|s| !s.is_empty());
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> DeviceAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_new_directory_has_selected_inbox() {
        let dir = PeerDirectory::new();
        assert_eq!(dir.selected(), &PeerKey::Inbox);
        assert_eq!(dir.get(&PeerKey::Inbox).unwrap().display, "Inbox");
        assert_eq!(dir.inbox_unread(), 0);
    }

    #[test]
    fn test_upsert_creates_then_updates() {
        let mut dir = PeerDirectory::new();
        let key = PeerKey::Device(addr("11:22:33:44:55:66"));

        let peer = dir.upsert(key.clone(), None);
        assert_eq!(peer.display, "11:22:33:44:55:66");
        assert!(peer.last_seen.is_some());

        dir.upsert(key.clone(), Some("alice"));
        assert_eq!(dir.get(&key).unwrap().display, "alice");

        // Empty display does not erase a learned name
        dir.upsert(key.clone(), Some(""));
        assert_eq!(dir.get(&key).unwrap().display, "alice");
    }

    #[test]
    fn test_unread_counts_only_true_inbound_inbox_entries() {
        let mut dir = PeerDirectory::new();
        dir.add_message(PeerKey::Inbox, Message::incoming("a", None), true);
        dir.add_message(PeerKey::Inbox, Message::incoming("b", None), false);
        dir.add_message(PeerKey::Inbox, Message::system("note"), true);
        dir.add_message(
            PeerKey::Device(addr("11:22:33:44:55:66")),
            Message::incoming("c", None),
            true,
        );
        assert_eq!(dir.inbox_unread(), 1);

        dir.view_inbox();
        assert_eq!(dir.inbox_unread(), 0);
        assert_eq!(dir.selected(), &PeerKey::Inbox);
    }

    #[test]
    fn test_selecting_inbox_without_view_keeps_unread() {
        let mut dir = PeerDirectory::new();
        dir.add_message(PeerKey::Inbox, Message::incoming("a", None), true);
        dir.select(PeerKey::Inbox);
        assert_eq!(dir.inbox_unread(), 1);
    }

    #[test]
    fn test_handle_resolution_fallback_order() {
        let mut dir = PeerDirectory::new();
        let a = addr("11:22:33:44:55:66");

        // Unknown handle, selection is the inbox: placeholder
        assert_eq!(dir.resolve_handle("dev_X"), PeerKey::Unknown);

        // Unknown handle, a device is selected: the selected device
        dir.select(PeerKey::Device(a.clone()));
        assert_eq!(dir.resolve_handle("dev_X"), PeerKey::Device(a.clone()));

        // Bound handle wins over the selection
        let b = addr("AA:BB:CC:DD:EE:FF");
        dir.bind_handle("dev_X", b.clone());
        assert_eq!(dir.resolve_handle("dev_X"), PeerKey::Device(b.clone()));

        // Unbinding drops the exact match again
        dir.unbind_handle("dev_X");
        assert_eq!(dir.resolve_handle("dev_X"), PeerKey::Device(a));
    }

    #[test]
    fn test_namebook_freshest_wins_and_ignores_empty() {
        let mut dir = PeerDirectory::new();
        let a = addr("11:22:33:44:55:66");
        assert_eq!(dir.display_for(&a), "11:22:33:44:55:66");

        dir.learn_name(&a, "alice");
        assert_eq!(dir.display_for(&a), "alice");

        dir.learn_name(&a, "");
        assert_eq!(dir.display_for(&a), "alice");

        dir.learn_name(&a, "alice2");
        assert_eq!(dir.display_for(&a), "alice2");
    }

    #[test]
    fn test_hello_applied_guard() {
        let mut dir = PeerDirectory::new();
        let a = addr("11:22:33:44:55:66");
        assert!(!dir.hello_applied(&a));
        dir.mark_hello_applied(&a);
        assert!(dir.hello_applied(&a));
        dir.clear_hello_applied(&a);
        assert!(!dir.hello_applied(&a));
    }

    #[test]
    fn test_inbox_sender_filters_empty() {
        let mut dir = PeerDirectory::new();
        dir.set_inbox_sender(Some("alice".to_string()));
        assert_eq!(dir.inbox_sender(), Some("alice"));
        dir.set_inbox_sender(Some(String::new()));
        assert_eq!(dir.inbox_sender(), None);
    }
}
