//! Core types for the bitchat console
//!
//! This module defines the fundamental types used throughout the engine,
//! using newtype patterns for semantic validation and type safety.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Roles
// ----------------------------------------------------------------------------

/// Operating mode of one supervised daemon process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Scans, connects and drives the active link
    Central,
    /// Advertises and accepts inbound traffic
    Peripheral,
}

impl Role {
    /// Role name as passed to the daemon via `BITCHAT_ROLE`
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Central => "central",
            Role::Peripheral => "peripheral",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Device Address
// ----------------------------------------------------------------------------

/// Stable transport address used as the canonical peer identity
///
/// The daemons report addresses as 17-character colon-separated hex tokens
/// (`AA:BB:CC:DD:EE:FF`). Stored uppercased so the same device discovered
/// through different log shapes resolves to one identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// Number of characters in a well-formed address
    pub const LEN: usize = 17;

    /// Get the address string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_well_formed(s: &str) -> bool {
        if s.len() != Self::LEN {
            return false;
        }
        s.split(':').count() == 6
            && s.split(':')
                .all(|g| g.len() == 2 && g.chars().all(|c| c.is_ascii_hexdigit()))
    }
}

impl FromStr for DeviceAddress {
    type Err = crate::ConsoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !Self::is_well_formed(s) {
            return Err(crate::ConsoleError::invalid_address(s));
        }
        Ok(Self(s.to_ascii_uppercase()))
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ----------------------------------------------------------------------------
// Peer Key
// ----------------------------------------------------------------------------

/// Logical key a conversation is filed under
///
/// Besides real devices there are two reserved identities: the inbox, which
/// collects untargeted inbound traffic, and a placeholder used when an event
/// cannot be resolved to any known device (best-effort degradation, never
/// fatal).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerKey {
    /// Reserved incoming-only mailbox
    Inbox,
    /// A concrete device identity
    Device(DeviceAddress),
    /// Placeholder for events that resolve to no device
    Unknown,
}

impl PeerKey {
    /// The device address, if this key names a concrete device
    pub fn device(&self) -> Option<&DeviceAddress> {
        match self {
            PeerKey::Device(addr) => Some(addr),
            _ => None,
        }
    }

    /// Default display name for a freshly created peer under this key
    pub fn default_display(&self) -> String {
        match self {
            PeerKey::Inbox => "Inbox".to_string(),
            PeerKey::Device(addr) => addr.to_string(),
            PeerKey::Unknown => "peer".to_string(),
        }
    }
}

impl fmt::Display for PeerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerKey::Inbox => f.write_str("inbox"),
            PeerKey::Device(addr) => addr.fmt(f),
            PeerKey::Unknown => f.write_str("peer"),
        }
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Milliseconds since the UNIX epoch
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a timestamp from raw milliseconds
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self(millis)
    }

    /// Raw milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

// ----------------------------------------------------------------------------
// Capability Flags
// ----------------------------------------------------------------------------

/// Capability bitmask exchanged during the daemons' hello handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CapabilityFlags(u32);

impl CapabilityFlags {
    /// Bit 0: peer supports the pre-shared-key encrypted session
    pub const AEAD_PSK_SUPPORTED: u32 = 0x1;

    /// Create flags from the raw mask
    pub fn new(mask: u32) -> Self {
        Self(mask)
    }

    /// Raw mask value
    pub fn mask(&self) -> u32 {
        self.0
    }

    /// Whether the encrypted-session capability bit is set
    pub fn supports_encryption(&self) -> bool {
        self.0 & Self::AEAD_PSK_SUPPORTED != 0
    }
}

impl fmt::Display for CapabilityFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Messages
// ----------------------------------------------------------------------------

/// Direction of a conversation entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Received from the remote side
    In,
    /// Sent by the local user
    Out,
    /// Engine-generated status note
    System,
}

/// One immutable conversation entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// When the entry was appended
    pub timestamp: Timestamp,
    /// Who produced it
    pub direction: Direction,
    /// Entry text
    pub text: String,
    /// Sender label, when it differs from the owning peer's display name
    /// (e.g. entries mirrored into the inbox)
    pub sender: Option<String>,
}

impl Message {
    /// Create an incoming message with an optional sender label
    pub fn incoming<T: Into<String>>(text: T, sender: Option<String>) -> Self {
        Self {
            timestamp: Timestamp::now(),
            direction: Direction::In,
            text: text.into(),
            sender,
        }
    }

    /// Create an outgoing message
    pub fn outgoing<T: Into<String>>(text: T) -> Self {
        Self {
            timestamp: Timestamp::now(),
            direction: Direction::Out,
            text: text.into(),
            sender: None,
        }
    }

    /// Create a system note
    pub fn system<T: Into<String>>(text: T) -> Self {
        Self {
            timestamp: Timestamp::now(),
            direction: Direction::System,
            text: text.into(),
            sender: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Peers
// ----------------------------------------------------------------------------

/// Maximum conversation entries retained per peer; older entries are dropped
/// from the front.
pub const MAX_HISTORY: usize = 1000;

/// One known remote endpoint and its conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    /// Stable logical identity
    pub key: PeerKey,
    /// Human-readable name; defaults to the identity until a better name
    /// is learned
    pub display: String,
    /// Whether a live link to this peer exists right now
    pub connected: bool,
    /// Last time any event referenced this peer
    pub last_seen: Option<Timestamp>,
    /// Bounded conversation history, oldest first
    pub history: Vec<Message>,
}

impl Peer {
    /// Create a peer with the default display for its key
    pub fn new(key: PeerKey) -> Self {
        let display = key.default_display();
        Self {
            key,
            display,
            connected: false,
            last_seen: None,
            history: Vec::new(),
        }
    }

    /// Append an entry, dropping the oldest once the cap is exceeded
    pub fn push(&mut self, message: Message) {
        self.history.push(message);
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
