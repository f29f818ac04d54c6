// SendFlow Infrastructure - SQLite Adapter
// Implements: JobRecordStore, Catalog

mod catalog;
mod connection;
mod error;
mod job_store;
mod migration;

pub use catalog::SqliteCatalog;
pub use connection::{create_pool, database_url_for_path};
pub use job_store::SqliteJobStore;
pub use migration::{current_version, run_migrations};

// Note: sqlx::Error conversion is handled by wrapping in helper functions
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
