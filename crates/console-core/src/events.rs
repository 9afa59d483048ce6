//! Log line classification
//!
//! The daemons expose no structured IPC; everything the console knows it
//! learns by matching their free-text log lines. This module turns one line
//! into at most one typed [`LogEvent`] using a fixed, ordered set of
//! patterns. First match wins; security/handshake patterns are checked
//! before everything else because their lines carry log tags that could
//! otherwise shadow later shapes. Unmatched lines are discarded.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::{CapabilityFlags, DeviceAddress};

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// One classified daemon log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    /// `Listening on <path>` — daemon (re)announced its control socket
    SocketPathAnnounced { path: String },
    /// `[RECV] <payload>` — inbound payload text
    PayloadReceived { text: String },
    /// `found <handle> addr=<address>` — discovery hit pairing a transient
    /// handle with a stable address
    PeerDiscovered {
        handle: String,
        address: DeviceAddress,
    },
    /// `[PEER] <address> rssi=<int>` — one line of a peer-list dump
    PeerListEntry { address: DeviceAddress, rssi: i32 },
    /// `[PEERS] no peers found`
    PeerListEmpty,
    /// `Device connected: <handle>` or
    /// `Connected property became true (<handle>)`
    LinkConnected { handle: String },
    /// `Notifications enabled; ready`
    LinkReady,
    /// `Disconnected (<handle>)` or
    /// `InterfacesRemoved -> cleared device <handle>`
    LinkDisconnected { handle: String },
    /// `StartDiscovery OK`
    DiscoveryStarted,
    /// `StopDiscovery OK`
    DiscoveryStopped,
    /// `LE advertisement registered successfully`
    AdvertisingStarted,
    /// `[CTRL] HELLO in: user='<name>' caps=0x<8-hex>`
    HelloInbound {
        user: String,
        caps: CapabilityFlags,
    },
    /// `[CTRL] HELLO out: user='<name>' caps=0x<8-hex>`
    HelloOutbound {
        user: String,
        caps: CapabilityFlags,
    },
    /// `[KEX] complete.`
    HandshakeComplete,
    /// `[KEX] ... install failed` / `[KEX] ... no/invalid PSK`
    HandshakeFailed,
    /// `[SEC] ... AEAD decrypt failed ... dropping frame`
    DecryptFailure,
}

// ----------------------------------------------------------------------------
// Classifier
// ----------------------------------------------------------------------------

/// Compiled pattern table; order of checks in [`Classifier::classify`] is the
/// priority order.
pub struct Classifier {
    decrypt_failure: Regex,
    kex_complete: Regex,
    kex_failed: Regex,
    listening: Regex,
    recv: Regex,
    found: Regex,
    peer_entry: Regex,
    peers_empty: Regex,
    connected: Regex,
    connected_prop: Regex,
    ready: Regex,
    disconnected: Regex,
    iface_removed: Regex,
    discovery_start: Regex,
    discovery_stop: Regex,
    advertising: Regex,
    hello_in: Regex,
    hello_out: Regex,
}

impl Classifier {
    fn new() -> Self {
        // Patterns are unanchored on purpose: daemon lines may carry
        // level/timestamp prefixes added by the logging layer.
        Self {
            decrypt_failure: Regex::new(r"(?i)\[SEC\].*AEAD decrypt failed.*dropping frame")
                .expect("valid regex"),
            kex_complete: Regex::new(r"(?i)\[KEX\]\s+complete\.").expect("valid regex"),
            kex_failed: Regex::new(r"(?i)\[KEX\].*(install failed|no/invalid PSK)")
                .expect("valid regex"),
            listening: Regex::new(r"Listening on\s+(\S+)").expect("valid regex"),
            recv: Regex::new(r"\[RECV\]\s+(.*)$").expect("valid regex"),
            found: Regex::new(r"(?i)found\s+(\S+)\s+addr=([0-9A-F:]{17})").expect("valid regex"),
            peer_entry: Regex::new(r"(?i)\[PEER\]\s+([0-9A-F:]{17})\s+rssi=(-?\d+)")
                .expect("valid regex"),
            peers_empty: Regex::new(r"(?i)\[PEERS\]\s+no peers found").expect("valid regex"),
            connected: Regex::new(r"Device connected:\s+(\S+)").expect("valid regex"),
            connected_prop: Regex::new(r"Connected property became true \((\S+)\)")
                .expect("valid regex"),
            ready: Regex::new(r"Notifications enabled; ready").expect("valid regex"),
            disconnected: Regex::new(r"Disconnected\s+\((\S+)\)").expect("valid regex"),
            iface_removed: Regex::new(r"InterfacesRemoved -> cleared device (\S+)")
                .expect("valid regex"),
            discovery_start: Regex::new(r"(?i)StartDiscovery OK").expect("valid regex"),
            discovery_stop: Regex::new(r"(?i)StopDiscovery OK").expect("valid regex"),
            advertising: Regex::new(r"LE advertisement registered successfully")
                .expect("valid regex"),
            hello_in: Regex::new(r"\[CTRL\]\s+HELLO in:\s+user='([^']*)'\s+caps=0x([0-9A-Fa-f]{8})")
                .expect("valid regex"),
            hello_out: Regex::new(
                r"\[CTRL\]\s+HELLO out:\s+user='([^']*)'\s+caps=0x([0-9A-Fa-f]{8})",
            )
            .expect("valid regex"),
        }
    }

    /// Shared classifier instance
    pub fn global() -> &'static Classifier {
        static CLASSIFIER: OnceLock<Classifier> = OnceLock::new();
        CLASSIFIER.get_or_init(Classifier::new)
    }

    /// Classify one log line into at most one event
    pub fn classify(&self, line: &str) -> Option<LogEvent> {
        // Security / handshake shapes short-circuit everything else.
        if self.decrypt_failure.is_match(line) {
            return Some(LogEvent::DecryptFailure);
        }
        if self.kex_complete.is_match(line) {
            return Some(LogEvent::HandshakeComplete);
        }
        if self.kex_failed.is_match(line) {
            return Some(LogEvent::HandshakeFailed);
        }

        if let Some(caps) = self.listening.captures(line) {
            return Some(LogEvent::SocketPathAnnounced {
                path: caps[1].to_string(),
            });
        }
        if let Some(caps) = self.recv.captures(line) {
            return Some(LogEvent::PayloadReceived {
                text: caps[1].to_string(),
            });
        }
        if let Some(caps) = self.found.captures(line) {
            let address = caps[2].parse().ok()?;
            return Some(LogEvent::PeerDiscovered {
                handle: caps[1].to_string(),
                address,
            });
        }
        if let Some(caps) = self.peer_entry.captures(line) {
            let address = caps[1].parse().ok()?;
            let rssi = caps[2].parse().ok()?;
            return Some(LogEvent::PeerListEntry { address, rssi });
        }
        if self.peers_empty.is_match(line) {
            return Some(LogEvent::PeerListEmpty);
        }
        if let Some(caps) = self
            .connected
            .captures(line)
            .or_else(|| self.connected_prop.captures(line))
        {
            return Some(LogEvent::LinkConnected {
                handle: caps[1].to_string(),
            });
        }
        if self.ready.is_match(line) {
            return Some(LogEvent::LinkReady);
        }
        if let Some(caps) = self
            .disconnected
            .captures(line)
            .or_else(|| self.iface_removed.captures(line))
        {
            return Some(LogEvent::LinkDisconnected {
                handle: caps[1].to_string(),
            });
        }
        if self.discovery_start.is_match(line) {
            return Some(LogEvent::DiscoveryStarted);
        }
        if self.discovery_stop.is_match(line) {
            return Some(LogEvent::DiscoveryStopped);
        }
        if self.advertising.is_match(line) {
            return Some(LogEvent::AdvertisingStarted);
        }
        if let Some(caps) = self.hello_in.captures(line) {
            let mask = u32::from_str_radix(&caps[2], 16).ok()?;
            return Some(LogEvent::HelloInbound {
                user: caps[1].to_string(),
                caps: CapabilityFlags::new(mask),
            });
        }
        if let Some(caps) = self.hello_out.captures(line) {
            let mask = u32::from_str_radix(&caps[2], 16).ok()?;
            return Some(LogEvent::HelloOutbound {
                user: caps[1].to_string(),
                caps: CapabilityFlags::new(mask),
            });
        }

        None
    }
}

/// Classify one log line using the shared classifier
pub fn classify(line: &str) -> Option<LogEvent> {
    Classifier::global().classify(line)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
