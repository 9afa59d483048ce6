//! Security state and badge
//!
//! Tracks what the console can infer about the encrypted session from daemon
//! logs: whether each side advertises the pre-shared-key capability, whether
//! a handshake completed, and whether a security warning is in effect. The
//! badge collapses those into the three-way indicator shown in the status
//! line.

use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Badge
// ----------------------------------------------------------------------------

/// Three-way security indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityBadge {
    /// Encrypted session installed and healthy
    Secure,
    /// Both sides support encryption but the session is degraded
    /// (handshake failure or dropped frames)
    Warning,
    /// Traffic is plaintext
    Plaintext,
}

impl SecurityBadge {
    /// Badge glyph as shown in the status line
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityBadge::Secure => "🔐",
            SecurityBadge::Warning => "🔐⚠",
            SecurityBadge::Plaintext => "🔓",
        }
    }
}

// ----------------------------------------------------------------------------
// State
// ----------------------------------------------------------------------------

/// What the console knows about the encrypted session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityState {
    /// Local side advertises the pre-shared-key capability
    pub local_capable: bool,
    /// Active peer advertises the pre-shared-key capability
    pub remote_capable: bool,
    /// An encrypted session is installed
    pub session_established: bool,
    /// A security warning is in effect
    pub warning: bool,
}

impl SecurityState {
    /// Create state seeded with local capability (presence of the local
    /// pre-shared key)
    pub fn with_local_capability(local_capable: bool) -> Self {
        Self {
            local_capable,
            ..Default::default()
        }
    }

    /// Handshake completed: session is up, any prior warning is cleared
    pub fn on_handshake_complete(&mut self) {
        self.session_established = true;
        self.warning = false;
    }

    /// Handshake failed: no session, warning raised
    pub fn on_handshake_failed(&mut self) {
        self.session_established = false;
        self.warning = true;
    }

    /// Inbound frame failed authenticated decryption. Capability knowledge
    /// is retained; only session health changes.
    pub fn on_decrypt_failure(&mut self) {
        self.session_established = false;
        self.warning = true;
    }

    /// Link teardown: everything learned about the remote side is stale.
    /// Local capability is a property of our own configuration and survives.
    pub fn on_link_down(&mut self) {
        self.remote_capable = false;
        self.session_established = false;
        self.warning = false;
    }

    /// Current badge
    pub fn badge(&self) -> SecurityBadge {
        if self.session_established && self.local_capable && self.remote_capable && !self.warning {
            SecurityBadge::Secure
        } else if self.local_capable && self.remote_capable && self.warning {
            SecurityBadge::Warning
        } else {
            SecurityBadge::Plaintext
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_badge_requires_both_capabilities_and_session() {
        let mut sec = SecurityState::with_local_capability(true);
        assert_eq!(sec.badge(), SecurityBadge::Plaintext);

        sec.remote_capable = true;
        assert_eq!(sec.badge(), SecurityBadge::Plaintext);

        sec.on_handshake_complete();
        assert_eq!(sec.badge(), SecurityBadge::Secure);
    }

    #[test]
    fn test_decrypt_failure_degrades_to_warning() {
        let mut sec = SecurityState::with_local_capability(true);
        sec.remote_capable = true;
        sec.on_handshake_complete();
        assert_eq!(sec.badge(), SecurityBadge::Secure);

        sec.on_decrypt_failure();
        assert_eq!(sec.badge(), SecurityBadge::Warning);
        // Capabilities survive the failure
        assert!(sec.local_capable);
        assert!(sec.remote_capable);
    }

    #[test]
    fn test_warning_without_remote_capability_is_plaintext() {
        let mut sec = SecurityState::with_local_capability(true);
        sec.on_handshake_failed();
        assert_eq!(sec.badge(), SecurityBadge::Plaintext);
    }

    #[test]
    fn test_handshake_complete_clears_warning() {
        let mut sec = SecurityState::with_local_capability(true);
        sec.remote_capable = true;
        sec.on_decrypt_failure();
        assert_eq!(sec.badge(), SecurityBadge::Warning);

        sec.on_handshake_complete();
        assert_eq!(sec.badge(), SecurityBadge::Secure);
    }

    #[test]
    fn test_link_down_keeps_local_capability_only() {
        let mut sec = SecurityState::with_local_capability(true);
        sec.remote_capable = true;
        sec.on_handshake_complete();
        sec.warning = true;

        sec.on_link_down();
        assert!(sec.local_capable);
        assert!(!sec.remote_capable);
        assert!(!sec.session_established);
        assert!(!sec.warning);
        assert_eq!(sec.badge(), SecurityBadge::Plaintext);
    }
}
