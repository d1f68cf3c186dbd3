pub use sea_orm_migration::prelude::*;

mod m20260105_000001_create_organizations;
mod m20260105_000002_create_raffles;
mod m20260105_000003_create_orders;
mod m20260112_000001_create_domains_and_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260105_000001_create_organizations::Migration),
            Box::new(m20260105_000002_create_raffles::Migration),
            Box::new(m20260105_000003_create_orders::Migration),
            Box::new(m20260112_000001_create_domains_and_events::Migration),
        ]
    }
}
