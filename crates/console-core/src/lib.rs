//! Console state engine
//!
//! This crate provides the synchronous core of the bitchat console: typed
//! log events and their classifier, the per-role link state machines, the
//! peer directory with identity resolution, security tracking, and the
//! consolidated `ConsoleState` reducer. It performs no I/O beyond reading
//! configuration; the async runtime crate feeds it lines and reads
//! snapshots.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod directory;
pub mod errors;
pub mod events;
pub mod link;
pub mod security;
pub mod state;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::ConsoleConfig;
pub use directory::PeerDirectory;
pub use errors::{ConsoleError, ControlError, Result, SupervisorError};
pub use events::{classify, Classifier, LogEvent};
pub use link::{CentralLink, CentralStatus, PeripheralLink};
pub use security::{SecurityBadge, SecurityState};
pub use state::{ConsoleState, SelectOutcome};
pub use types::{
    CapabilityFlags, DeviceAddress, Direction, Message, Peer, PeerKey, Role, Timestamp,
    MAX_HISTORY,
};
