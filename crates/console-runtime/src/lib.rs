//! Async orchestration for the bitchat console
//!
//! This crate supervises the two worker daemons, speaks their unix-socket
//! control protocol and drives the state engine from their log output.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod control;
pub mod engine;
pub mod supervisor;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use control::{ControlClient, ControlCommand};
pub use engine::Engine;
pub use supervisor::DaemonSupervisor;
