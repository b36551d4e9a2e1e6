use sea_orm_migration::{prelude::*, sea_orm::DatabaseBackend};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // At most one current ledger row per order, even under concurrent appends.
        let backend = manager.get_database_backend();
        let sql = match backend {
            DatabaseBackend::Sqlite => {
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_order_statuses_single_current \
                 ON order_statuses (order_id) \
                 WHERE is_current = 1;"
            }
            _ => {
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_order_statuses_single_current \
                 ON order_statuses (order_id) \
                 WHERE is_current;"
            }
        };

        manager.get_connection().execute_unprepared(sql).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP INDEX IF EXISTS idx_order_statuses_single_current;")
            .await?;
        Ok(())
    }
}
