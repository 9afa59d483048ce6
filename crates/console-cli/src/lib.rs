//! Console binary support library

pub mod cli;
pub mod commands;
pub mod error;
