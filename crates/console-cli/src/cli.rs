//! Command-line interface definitions and parsing

use clap::Parser;

#[derive(Parser)]
#[command(author, version, about = "Supervises the bitchat daemons and tracks their state", long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,
}
