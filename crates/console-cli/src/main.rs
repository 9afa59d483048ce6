//! bitchat-console - supervises the worker daemons and tracks their state

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use console_cli::{cli::Cli, commands, error::CliError};
use console_core::ConsoleConfig;
use console_runtime::Engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = load_configuration(&cli)?;
    let mut engine = Engine::new(config);
    engine.start().await.map_err(CliError::Console)?;
    println!("{}", engine.status_summary().await);
    println!("type /help for commands");

    run_repl(&mut engine).await?;

    engine.stop().await.map_err(CliError::Console)?;
    info!("console exited");
    Ok(())
}

/// Read stdin line by line until quit or ctrl-c
async fn run_repl(engine: &mut Engine) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    // stdin closed
                    return Ok(());
                };
                match commands::parse_line(&line) {
                    Ok(Some(command)) => {
                        if !commands::dispatch(engine, command).await? {
                            return Ok(());
                        }
                    }
                    Ok(None) => {}
                    Err(message) => println!("! {message}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                return Ok(());
            }
        }
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from file or environment defaults
fn load_configuration(cli: &Cli) -> Result<ConsoleConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("loading configuration from {path}");
            ConsoleConfig::load_from_file(std::path::Path::new(path)).map_err(|e| {
                error!("failed to load configuration: {e}");
                CliError::Config(e.to_string())
            })?
        }
        None => ConsoleConfig::default(),
    };
    // Environment always wins over the file
    config.apply_env();
    Ok(config)
}
