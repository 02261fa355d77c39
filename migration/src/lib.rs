pub use sea_orm_migration::prelude::*;

mod m20240101_000001_create_users_table;
mod m20240101_000002_create_tokens_table;
mod m20240101_000003_create_channels_table;
mod m20251218_000001_add_group_priorities_to_tokens_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_users_table::Migration),
            Box::new(m20240101_000002_create_tokens_table::Migration),
            Box::new(m20240101_000003_create_channels_table::Migration),
            Box::new(m20251218_000001_add_group_priorities_to_tokens_table::Migration),
        ]
    }
}
