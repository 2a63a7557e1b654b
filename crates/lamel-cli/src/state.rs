//! Application state wiring services together.
//!
//! AppState holds the shared pieces used by the CLI command handlers: the
//! database pool, the secret resolution chain, and the loaded configuration.

use std::path::PathBuf;
use std::sync::Arc;

use lamel_core::service::secret::SecretService;
use lamel_infra::config::load_global_config;
use lamel_infra::resolve_data_dir;
use lamel_infra::secret::chain::build_secret_chain;
use lamel_infra::secret::file::CredentialsFileProvider;
use lamel_infra::sqlite::pool::DatabasePool;
use lamel_types::config::GlobalConfig;
use lamel_types::secret::SecretScope;

/// Shared application state for CLI command handlers.
#[derive(Clone)]
pub struct AppState {
    pub secret_service: Arc<SecretService>,
    pub config: GlobalConfig,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state: connect to the DB, build the secret
    /// chain, load configuration.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();

        // Ensure the data directory exists
        tokio::fs::create_dir_all(&data_dir).await?;

        // Initialize the database
        let db_url = format!("sqlite://{}?mode=rwc", data_dir.join("lamel.db").display());
        let db_pool = DatabasePool::new(&db_url).await?;

        // Load configuration
        let config = load_global_config(&data_dir).await;

        // Wire the secret chain: env vars override the credentials file
        let file_provider = CredentialsFileProvider::new(data_dir.join("credentials.toml"));
        let secret_service = SecretService::new(build_secret_chain(file_provider, true));

        Ok(Self {
            secret_service: Arc::new(secret_service),
            config,
            data_dir,
            db_pool,
        })
    }

    /// The secret scope for the active workspace.
    pub fn workspace_scope(&self) -> SecretScope {
        match &self.config.workspace {
            Some(workspace) => SecretScope::Workspace(workspace.clone()),
            None => SecretScope::Global,
        }
    }
}
