use std::sync::Arc;

use db::{DBService, DbErr, default_database_url};
use services::services::config::Config;
use tokio::sync::RwLock;

pub mod error;
pub mod http;
pub mod middleware;
pub mod routes;
#[cfg(test)]
pub mod test_support;

/// Shared handles every request handler receives.
#[derive(Clone)]
pub struct AppState {
    db: DBService,
    config: Arc<RwLock<Config>>,
}

impl AppState {
    pub fn new(db: DBService, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// Connects to the configured database and runs pending migrations.
    pub async fn connect(config: Config) -> Result<Self, DbErr> {
        let database_url = resolve_database_url(&config);
        let db = DBService::connect(&database_url).await?;
        Ok(Self::new(db, config))
    }

    pub fn db(&self) -> &DBService {
        &self.db
    }

    pub fn config(&self) -> &Arc<RwLock<Config>> {
        &self.config
    }
}

/// `DATABASE_URL` wins over the config file, which wins over the SQLite file
/// in the asset directory.
pub fn resolve_database_url(config: &Config) -> String {
    std::env::var("DATABASE_URL")
        .ok()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .or_else(|| config.database_url.clone())
        .unwrap_or_else(default_database_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestEnvGuard;

    #[test]
    fn database_url_prefers_environment() {
        let temp_root = tempfile::tempdir().unwrap();
        let _guard = TestEnvGuard::new(temp_root.path(), Some("sqlite::memory:".to_string()));

        let config = Config {
            database_url: Some("postgres://localhost/fixdesk".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_database_url(&config), "sqlite::memory:");
    }

    #[test]
    fn database_url_falls_back_to_config_then_asset_dir() {
        let temp_root = tempfile::tempdir().unwrap();
        let _guard = TestEnvGuard::new(temp_root.path(), None);

        let config = Config {
            database_url: Some("postgres://localhost/fixdesk".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_database_url(&config), "postgres://localhost/fixdesk");

        let url = resolve_database_url(&Config::default());
        assert!(url.starts_with("sqlite://"));
        assert!(url.contains(&*temp_root.path().to_string_lossy()));
        assert!(url.ends_with("db.sqlite?mode=rwc"));
    }
}
