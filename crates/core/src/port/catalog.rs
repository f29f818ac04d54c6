// Catalog Port
// Items and destinations are maintained by the back office; the engine only reads them

use crate::domain::{Destination, Item};
use crate::error::Result;
use async_trait::async_trait;

/// Resolves persisted identifiers against current catalog data
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolve items in the given order
    ///
    /// # Errors
    /// - `AppError::Unresolvable` naming every id that no longer exists
    async fn resolve_items(&self, ids: &[String]) -> Result<Vec<Item>>;

    /// Resolve destinations in the given order
    ///
    /// # Errors
    /// - `AppError::Unresolvable` naming every id that no longer exists
    async fn resolve_destinations(&self, ids: &[String]) -> Result<Vec<Destination>>;
}

/// Order `found` by `ids`, failing with the list of missing ids
pub fn order_by_ids<T, F>(ids: &[String], found: Vec<T>, key: F, kind: &str) -> Result<Vec<T>>
where
    F: Fn(&T) -> &str,
{
    use std::collections::HashMap;

    let mut by_id: HashMap<String, T> = found
        .into_iter()
        .map(|entry| (key(&entry).to_string(), entry))
        .collect();

    let mut ordered = Vec::with_capacity(ids.len());
    let mut missing = Vec::new();
    for id in ids {
        match by_id.remove(id) {
            Some(entry) => ordered.push(entry),
            None => missing.push(id.as_str()),
        }
    }

    if !missing.is_empty() {
        return Err(crate::error::AppError::Unresolvable(format!(
            "unknown {}: {}",
            kind,
            missing.join(", ")
        )));
    }
    Ok(ordered)
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Catalog backed by plain vectors
    #[derive(Default)]
    pub struct InMemoryCatalog {
        items: Mutex<Vec<Item>>,
        destinations: Mutex<Vec<Destination>>,
    }

    impl InMemoryCatalog {
        pub fn new(items: Vec<Item>, destinations: Vec<Destination>) -> Self {
            Self {
                items: Mutex::new(items),
                destinations: Mutex::new(destinations),
            }
        }

        /// Drop an item (simulates deletion in the back office)
        pub fn remove_item(&self, id: &str) {
            self.items.lock().unwrap().retain(|i| i.id != id);
        }
    }

    #[async_trait]
    impl Catalog for InMemoryCatalog {
        async fn resolve_items(&self, ids: &[String]) -> Result<Vec<Item>> {
            let items = self.items.lock().unwrap().clone();
            order_by_ids(ids, items, |i| i.id.as_str(), "items")
        }

        async fn resolve_destinations(&self, ids: &[String]) -> Result<Vec<Destination>> {
            let destinations = self.destinations.lock().unwrap().clone();
            order_by_ids(ids, destinations, |d| d.id.as_str(), "destinations")
        }
    }
}
