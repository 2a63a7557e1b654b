//! Workspace login: stores the workspace API key in the credentials file.

use anyhow::{Context, Result, bail};
use console::style;
use lamel_infra::credentials::API_KEY;
use lamel_types::secret::SecretScope;

use crate::state::AppState;

/// Authenticate against a workspace.
///
/// The key is taken from `--key` or prompted for interactively (hidden
/// input). An empty key is rejected outright so a misconfigured runner fails
/// here rather than at deploy time.
pub async fn handle_login(
    workspace: Option<&str>,
    key: Option<&str>,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let workspace = match workspace.or(state.config.workspace.as_deref()) {
        Some(ws) => ws.to_string(),
        None => bail!(
            "no workspace given (pass --workspace or set `workspace` in {})",
            state.data_dir.join("config.toml").display()
        ),
    };

    let key = match key {
        Some(key) => key.to_string(),
        None => dialoguer::Password::new()
            .with_prompt(format!("API key for {workspace}"))
            .interact()
            .context("failed to read API key")?,
    };

    if key.trim().is_empty() {
        bail!("API key must not be empty");
    }

    let scope = SecretScope::Workspace(workspace.clone());
    state
        .secret_service
        .set_secret(API_KEY, key.trim(), &scope)
        .await
        .context("failed to store the API key")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "workspace": workspace,
                "logged_in": true,
            }))?
        );
    } else {
        println!(
            "  {} Logged in to workspace {}",
            style("✓").green(),
            style(&workspace).cyan()
        );
    }
    Ok(())
}
