use std::time::Duration;

use db_migration::Migrator;
use sea_orm::{ConnectOptions, Database, DatabaseBackend, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use utils::assets::asset_dir;

pub mod entities;
pub mod models;
pub mod types;

pub use sea_orm::{ConnectionTrait, DbErr, TransactionTrait};

pub type DbPool = DatabaseConnection;

#[derive(Clone)]
pub struct DBService {
    pub pool: DbPool,
}

/// SQLite file inside the asset directory, created on first connect.
pub fn default_database_url() -> String {
    format!(
        "sqlite://{}?mode=rwc",
        asset_dir().join("db.sqlite").to_string_lossy()
    )
}

impl DBService {
    pub async fn new() -> Result<DBService, DbErr> {
        Self::connect(&default_database_url()).await
    }

    pub async fn connect(database_url: &str) -> Result<DBService, DbErr> {
        let mut options = ConnectOptions::new(database_url.to_string());
        options
            .connect_timeout(Duration::from_secs(30))
            .acquire_timeout(Duration::from_secs(30))
            .sqlx_logging(false);

        let pool = Database::connect(options).await?;

        if pool.get_database_backend() == DatabaseBackend::Sqlite
            && !database_url.contains(":memory:")
        {
            pool.execute_unprepared("PRAGMA journal_mode = WAL;").await?;
        }

        Migrator::up(&pool, None).await?;
        tracing::debug!(
            backend = ?pool.get_database_backend(),
            "Database connected and migrated"
        );
        Ok(DBService { pool })
    }
}
