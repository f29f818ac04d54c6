// Catalog Domain Model (read-only to the engine)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Subject of a broadcast message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub code: String,
    pub price: f64,
    pub image_ref: Option<String>,
    /// Variant attributes available to templates (e.g. size, color)
    #[serde(default)]
    pub variants: BTreeMap<String, String>,
}

impl Item {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        code: impl Into<String>,
        price: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            code: code.into(),
            price,
            image_ref: None,
            variants: BTreeMap::new(),
        }
    }

    pub fn with_image(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    pub fn with_variant(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variants.insert(key.into(), value.into());
        self
    }
}

/// Delivery target (group, channel, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub id: String,
    pub name: String,
    /// Opaque routing address understood by the messaging gateway
    pub address: String,
}

impl Destination {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
        }
    }
}
