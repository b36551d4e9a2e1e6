use sea_orm_migration::prelude::*;

mod m20250101000000_baseline;
mod m20250220000000_order_status_current_unique;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101000000_baseline::Migration),
            Box::new(m20250220000000_order_status_current_unique::Migration),
        ]
    }
}
