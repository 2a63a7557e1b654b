//! Secret management subcommands.

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use comfy_table::{ContentArrangement, Table, presets};
use console::style;
use lamel_types::secret::SecretScope;

use crate::state::AppState;

/// Secret management subcommands.
#[derive(Subcommand)]
pub enum SecretCommand {
    /// Store a secret in the active workspace.
    Set {
        /// Secret key (e.g. EXTRACT_API_KEY).
        key: String,

        /// Secret value. Prompted for interactively when omitted.
        value: Option<String>,
    },

    /// List stored secret keys (values are never shown).
    List,
}

/// Handle a secret subcommand.
pub async fn handle_secret_command(
    cmd: SecretCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        SecretCommand::Set { key, value } => handle_set(&key, value.as_deref(), state, json).await,
        SecretCommand::List => handle_list(state, json).await,
    }
}

async fn handle_set(key: &str, value: Option<&str>, state: &AppState, json: bool) -> Result<()> {
    if key.trim().is_empty() {
        bail!("secret key must not be empty");
    }

    let value = match value {
        Some(value) => value.to_string(),
        None => dialoguer::Password::new()
            .with_prompt(format!("Value for {key}"))
            .interact()
            .context("failed to read secret value")?,
    };

    if value.trim().is_empty() {
        bail!("secret value must not be empty");
    }

    let scope = state.workspace_scope();
    state
        .secret_service
        .set_secret(key, value.trim(), &scope)
        .await
        .context("failed to store the secret")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "key": key,
                "stored": true,
            }))?
        );
    } else {
        println!("  {} Stored secret {}", style("✓").green(), style(key).cyan());
    }
    Ok(())
}

async fn handle_list(state: &AppState, json: bool) -> Result<()> {
    let scope = state.workspace_scope();
    let mut entries = state.secret_service.list_secrets(&scope).await?;
    // Include globals when a workspace is active
    if matches!(scope, SecretScope::Workspace(_)) {
        for entry in state.secret_service.list_secrets(&SecretScope::Global).await? {
            if !entries.iter().any(|e| e.key == entry.key) {
                entries.push(entry);
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("  No secrets stored. Use `lamel secret set <KEY>` to add one.");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Key", "Scope"]);
    for entry in &entries {
        let scope = match &entry.scope {
            SecretScope::Global => "global".to_string(),
            SecretScope::Workspace(name) => name.clone(),
        };
        table.add_row(vec![entry.key.clone(), scope]);
    }
    println!("{table}");
    Ok(())
}
