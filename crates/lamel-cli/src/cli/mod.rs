//! CLI command definitions and dispatch for the `lamel` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod auth;
pub mod flow;
pub mod secret;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use lamel_types::flow::{EventKind, TriggerEvent};

/// Orchestrate and run ETL flows.
#[derive(Parser)]
#[command(name = "lamel", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and validate a flow definition file.
    Validate {
        /// Path to the flow YAML file.
        file: PathBuf,
    },

    /// Execute a flow for a triggering event.
    Run {
        /// Path to a flow YAML file, or the name of a deployed flow.
        flow: String,

        /// The event kind starting this run.
        #[arg(long, value_enum, default_value = "manual")]
        event: EventArg,

        /// Branch the event concerns (push source / pull request target).
        #[arg(long, default_value = "main")]
        branch: String,

        /// Optional JSON payload attached to the event.
        #[arg(long)]
        payload: Option<String>,
    },

    /// Register (deploy) every flow definition found under a directory.
    Deploy {
        /// Directory to scan for flow YAML files.
        #[arg(default_value = "flows")]
        dir: PathBuf,
    },

    /// List deployed flows.
    #[command(alias = "ls")]
    List,

    /// Show recent runs for a flow.
    Runs {
        /// Flow name.
        name: String,

        /// Maximum number of runs to display.
        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Show step logs for a specific run.
    Logs {
        /// Flow run UUID.
        run_id: String,
    },

    /// Authenticate against a workspace (stores the workspace API key).
    Login {
        /// Workspace to log in to (e.g. "lamel-mo/default").
        #[arg(long)]
        workspace: Option<String>,

        /// API key. Prompted for interactively when omitted.
        #[arg(long)]
        key: Option<String>,
    },

    /// Manage stored secrets.
    Secret {
        #[command(subcommand)]
        action: secret::SecretCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

/// CLI surface for the triggering event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EventArg {
    Push,
    PullRequest,
    Manual,
}

impl EventArg {
    /// Build the trigger event for this argument.
    pub fn to_event(self, branch: &str, payload: Option<serde_json::Value>) -> TriggerEvent {
        let kind = match self {
            EventArg::Push => EventKind::Push,
            EventArg::PullRequest => EventKind::PullRequest,
            EventArg::Manual => EventKind::Manual,
        };
        TriggerEvent {
            kind,
            branch: match kind {
                EventKind::Manual => None,
                _ => Some(branch.to_string()),
            },
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_arg_to_event() {
        let event = EventArg::Push.to_event("main", None);
        assert_eq!(event.kind, EventKind::Push);
        assert_eq!(event.branch.as_deref(), Some("main"));

        let event = EventArg::Manual.to_event("main", None);
        assert_eq!(event.kind, EventKind::Manual);
        assert!(event.branch.is_none());
    }

    #[test]
    fn test_cli_parses_run_command() {
        let cli = Cli::try_parse_from([
            "lamel",
            "run",
            "flows/sales-etl.yaml",
            "--event",
            "pull-request",
            "--branch",
            "main",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { flow, event, branch, .. } => {
                assert_eq!(flow, "flows/sales-etl.yaml");
                assert_eq!(event, EventArg::PullRequest);
                assert_eq!(branch, "main");
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_cli_parses_deploy_default_dir() {
        let cli = Cli::try_parse_from(["lamel", "deploy"]).unwrap();
        match cli.command {
            Commands::Deploy { dir } => assert_eq!(dir, PathBuf::from("flows")),
            _ => panic!("expected deploy command"),
        }
    }
}
