//! lamel CLI entry point.
//!
//! Binary name: `lamel`
//!
//! Parses CLI arguments, initializes the database and services, then
//! dispatches to the appropriate command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,lamel=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "lamel", &mut std::io::stdout());
        return Ok(());
    }

    // Initialize application state (DB, secret chain, config)
    let state = AppState::init().await?;

    match cli.command {
        Commands::Validate { file } => {
            cli::flow::handle_validate(&file, cli.json)?;
        }

        Commands::Run {
            flow,
            event,
            branch,
            payload,
        } => {
            cli::flow::handle_run(&flow, event, &branch, payload.as_deref(), &state, cli.json)
                .await?;
        }

        Commands::Deploy { dir } => {
            cli::flow::handle_deploy(&dir, &state, cli.json).await?;
        }

        Commands::List => {
            cli::flow::handle_list(&state, cli.json).await?;
        }

        Commands::Runs { name, limit } => {
            cli::flow::handle_runs(&name, limit, &state, cli.json).await?;
        }

        Commands::Logs { run_id } => {
            cli::flow::handle_logs(&run_id, &state, cli.json).await?;
        }

        Commands::Login { workspace, key } => {
            cli::auth::handle_login(workspace.as_deref(), key.as_deref(), &state, cli.json).await?;
        }

        Commands::Secret { action } => {
            cli::secret::handle_secret_command(action, &state, cli.json).await?;
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}
