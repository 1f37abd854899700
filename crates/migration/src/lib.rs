pub use sea_orm_migration::prelude::*;

mod m20250601_000001_ledger;
mod m20250605_000001_documents;
mod m20250610_000001_sync_log;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_ledger::Migration),
            Box::new(m20250605_000001_documents::Migration),
            Box::new(m20250610_000001_sync_log::Migration),
        ]
    }
}
