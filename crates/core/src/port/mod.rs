// Port Layer - Interfaces for external dependencies

pub mod catalog;
pub mod id_provider; // For deterministic testing
pub mod job_store;
pub mod messaging_gateway;
pub mod renderer;
pub mod time_provider;

// Re-exports
pub use catalog::Catalog;
pub use id_provider::IdProvider;
pub use job_store::JobRecordStore;
pub use messaging_gateway::{DeliveryError, MessagingGateway};
pub use renderer::{MessageRenderer, PlaceholderRenderer};
pub use time_provider::TimeProvider;
