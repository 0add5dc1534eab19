//! pkgd - transaction engine for native package managers
//!
//! Parses the command line, builds an engine from configuration and runs a
//! single transaction while rendering its events.

mod cli;
mod error;
mod events;
mod logging;

use crate::cli::{Cli, Commands, GlobalArgs};
use crate::error::CliError;
use crate::events::EventHandler;
use crate::logging::init_tracing;
use clap::Parser;
use pkgd_config::Config;
use pkgd_events::EventReceiver;
use pkgd_ops::{Engine, EngineBuilder};
use pkgd_types::{OutputFormat, TransactionOutcome};
use std::process;
use tokio::select;
use tracing::{error, info};

/// Exit status for a transaction interrupted by the user
const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    init_tracing(json_mode, cli.global.debug);

    match run(cli).await {
        Ok(outcome) => process::exit(exit_code(&outcome)),
        Err(e) => {
            error!("Application error: {}", e);
            if !json_mode {
                eprintln!("Error: {e}");
            }
            process::exit(1);
        }
    }
}

/// Main application logic
async fn run(cli: Cli) -> Result<TransactionOutcome, CliError> {
    info!("Starting pkgd v{}", env!("CARGO_PKG_VERSION"));

    // File config (or defaults), then environment, then CLI flags
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;
    config.merge_env()?;
    apply_cli_config(&mut config, &cli.global);
    config.validate()?;

    let (event_sender, event_receiver) = pkgd_events::channel();
    let mut engine = EngineBuilder::new()
        .with_config(config)
        .with_event_sender(event_sender)
        .build()?;

    let handle = engine.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let format = output_format(&cli.global);
    let mut event_handler = EventHandler::new(format, cli.global.debug);

    let outcome =
        execute_command_with_events(cli.command, &mut engine, event_receiver, &mut event_handler)
            .await;

    engine.shutdown();
    info!(%outcome, "command completed");
    Ok(outcome)
}

fn apply_cli_config(config: &mut Config, global: &GlobalArgs) {
    if let Some(catalog) = &global.catalog {
        config.paths.catalog = Some(catalog.clone());
    }
    if let Some(backend) = global.backend {
        config.general.backend = backend;
    }
}

fn output_format(global: &GlobalArgs) -> OutputFormat {
    if global.json {
        OutputFormat::Json
    } else if console::Term::stderr().is_term() {
        OutputFormat::Tty
    } else {
        OutputFormat::Plain
    }
}

fn exit_code(outcome: &TransactionOutcome) -> i32 {
    match outcome {
        TransactionOutcome::Success => 0,
        TransactionOutcome::Cancelled => EXIT_CANCELLED,
        TransactionOutcome::Failed { .. } | TransactionOutcome::Killed { .. } => 1,
    }
}

/// Execute command with concurrent event handling
async fn execute_command_with_events(
    command: Commands,
    engine: &mut Engine,
    mut event_receiver: EventReceiver,
    event_handler: &mut EventHandler,
) -> TransactionOutcome {
    let mut command_future = Box::pin(execute_command(command, engine));

    loop {
        select! {
            outcome = &mut command_future => {
                while let Ok(event) = event_receiver.try_recv() {
                    event_handler.handle_event(event);
                }
                return outcome;
            }

            event = event_receiver.recv() => {
                if let Some(event) = event {
                    event_handler.handle_event(event);
                }
            }
        }
    }
}

/// Execute the specified command
async fn execute_command(command: Commands, engine: &mut Engine) -> TransactionOutcome {
    match command {
        Commands::Install { packages } => engine.install_packages(&packages).await,
        Commands::Remove {
            packages,
            allow_deps,
        } => engine.remove_packages(&packages, allow_deps).await,
        Commands::Update { packages } => engine.update_packages(&packages).await,
        Commands::UpgradeSystem => engine.update_system().await,
        Commands::Refresh => engine.refresh_cache().await,
        Commands::Search { terms, filter } => engine.search_name(filter, &terms),
        Commands::Resolve { names, filter } => engine.resolve(filter, &names),
        Commands::Download { dest, packages } => {
            engine.download_packages(&packages, &dest).await
        }
    }
}
