//! Shared fixtures: a SQLite-backed broadcast stack with a seeded catalog

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sendflow_core::application::{BroadcastService, DispatchSettings, StartBroadcast};
use sendflow_core::domain::{Destination, Item};
use sendflow_core::port::id_provider::UuidProvider;
use sendflow_core::port::time_provider::SystemTimeProvider;
use sendflow_core::port::{MessagingGateway, PlaceholderRenderer};
use sendflow_infra_sqlite::{
    create_pool, database_url_for_path, run_migrations, SqliteCatalog, SqliteJobStore,
};
use sqlx::SqlitePool;

/// Fast timing so real-clock scenarios finish in milliseconds
pub fn fast_settings() -> DispatchSettings {
    DispatchSettings {
        tick: Duration::from_millis(10),
        poll_every_ticks: 2,
        paused_poll_interval: Duration::from_millis(20),
    }
}

/// Unique database file under the temp dir
pub fn temp_db_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("sendflow_it_{}_{}.db", name, uuid::Uuid::new_v4()))
}

pub async fn open_pool(path: Option<&PathBuf>) -> SqlitePool {
    let url = match path {
        Some(path) => database_url_for_path(path).unwrap(),
        None => "sqlite::memory:".to_string(),
    };
    let pool = create_pool(&url).await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}

/// Items shoe, bag, hat; destinations g1, g2
pub async fn seed_catalog(pool: &SqlitePool) -> Arc<SqliteCatalog> {
    let catalog = SqliteCatalog::new(pool.clone());
    for item in [
        Item::new("shoe", "Runner", "SH-1", 49.9).with_image("img/shoe.png"),
        Item::new("bag", "Tote", "BG-2", 19.0),
        Item::new("hat", "Cap", "HT-3", 9.5).with_variant("color", "red"),
    ] {
        catalog.upsert_item(&item).await.unwrap();
    }
    for destination in [
        Destination::new("g1", "Group 1", "chat:1"),
        Destination::new("g2", "Group 2", "chat:2"),
    ] {
        catalog.upsert_destination(&destination).await.unwrap();
    }
    Arc::new(catalog)
}

pub fn job_store(pool: &SqlitePool) -> Arc<SqliteJobStore> {
    Arc::new(SqliteJobStore::new(
        pool.clone(),
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
    ))
}

pub fn service(
    pool: &SqlitePool,
    catalog: Arc<SqliteCatalog>,
    gateway: Arc<dyn MessagingGateway>,
) -> BroadcastService {
    BroadcastService::new(
        job_store(pool),
        catalog,
        gateway,
        Arc::new(PlaceholderRenderer),
        fast_settings(),
    )
}

/// 3 items x 2 destinations, no delays
pub fn three_by_two() -> StartBroadcast {
    StartBroadcast {
        item_ids: vec!["shoe".into(), "bag".into(), "hat".into()],
        destination_ids: vec!["g1".into(), "g2".into()],
        template: "{name} {price}".into(),
        inter_destination_delay_seconds: 0,
        inter_item_delay_minutes: 0,
    }
}
