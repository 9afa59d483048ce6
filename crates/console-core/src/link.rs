//! Per-role link state machines
//!
//! The central role drives the active link; its status is derived from three
//! flags plus the identity of the peer the link belongs to. The peripheral
//! role only advertises. Both machines accept any event in any order: a
//! daemon restart replays the lifecycle from an arbitrary point, so invalid
//! transitions are absorbed, never rejected.

use serde::{Deserialize, Serialize};

use crate::types::DeviceAddress;

// ----------------------------------------------------------------------------
// Central
// ----------------------------------------------------------------------------

/// Summary word for the central role, in strictly increasing precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CentralStatus {
    /// No link, not scanning
    Idle,
    /// Discovery in progress
    Scanning,
    /// Physical link up, services not yet resolved
    Linked,
    /// Notifications enabled, payloads can flow
    Ready,
}

impl CentralStatus {
    /// Status word as shown in the status line
    pub fn as_str(&self) -> &'static str {
        match self {
            CentralStatus::Idle => "idle",
            CentralStatus::Scanning => "scan",
            CentralStatus::Linked => "link",
            CentralStatus::Ready => "ready",
        }
    }
}

/// Live state of the central daemon's link
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CentralLink {
    /// Discovery is running
    pub discovering: bool,
    /// Physical link established
    pub connected: bool,
    /// Notifications enabled on the established link
    pub ready: bool,
    /// The peer the live link belongs to, if any
    pub active: Option<DeviceAddress>,
}

impl CentralLink {
    /// Derived status word: ready > link > scan > idle
    pub fn status(&self) -> CentralStatus {
        if self.ready {
            CentralStatus::Ready
        } else if self.connected {
            CentralStatus::Linked
        } else if self.discovering {
            CentralStatus::Scanning
        } else {
            CentralStatus::Idle
        }
    }

    /// Link came up to `address`; readiness must be re-earned
    pub fn on_connected(&mut self, address: DeviceAddress) {
        self.connected = true;
        self.ready = false;
        self.active = Some(address);
    }

    /// Services resolved and notifications enabled
    pub fn on_ready(&mut self) {
        self.ready = true;
    }

    /// Link went down; the active peer is forgotten
    pub fn on_disconnected(&mut self) {
        self.connected = false;
        self.ready = false;
        self.active = None;
    }

    /// Local teardown before issuing a connect to a different peer
    pub fn clear_active(&mut self) {
        self.connected = false;
        self.ready = false;
        self.active = None;
    }

    /// Daemon stream closed: nothing reported by it can be trusted
    pub fn on_stream_closed(&mut self) {
        self.discovering = false;
        self.on_disconnected();
    }
}

// ----------------------------------------------------------------------------
// Peripheral
// ----------------------------------------------------------------------------

/// Live state of the peripheral daemon
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeripheralLink {
    /// Advertisement registered with the transport stack
    pub advertising: bool,
}

impl PeripheralLink {
    /// Status word as shown in the status line
    pub fn status_str(&self) -> &'static str {
        if self.advertising {
            "adv"
        } else {
            "no-adv"
        }
    }

    /// Daemon stream closed
    pub fn on_stream_closed(&mut self) {
        self.advertising = false;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
