// SQLite Catalog Implementation (reads the back-office tables)

use crate::error::{map_sqlx_error, placeholders};
use async_trait::async_trait;
use sendflow_core::domain::{Destination, Item};
use sendflow_core::error::Result;
use sendflow_core::port::catalog::order_by_ids;
use sendflow_core::port::Catalog;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace an item (back-office side; used for seeding)
    pub async fn upsert_item(&self, item: &Item) -> Result<()> {
        let variants = serde_json::to_string(&item.variants)?;

        sqlx::query(
            r#"
            INSERT INTO catalog_items (id, name, code, price, image_ref, variants)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                code = excluded.code,
                price = excluded.price,
                image_ref = excluded.image_ref,
                variants = excluded.variants
            "#,
        )
        .bind(&item.id)
        .bind(&item.name)
        .bind(&item.code)
        .bind(item.price)
        .bind(&item.image_ref)
        .bind(&variants)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    /// Insert or replace a destination (back-office side; used for seeding)
    pub async fn upsert_destination(&self, destination: &Destination) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO catalog_destinations (id, name, address)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                address = excluded.address
            "#,
        )
        .bind(&destination.id)
        .bind(&destination.name)
        .bind(&destination.address)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    pub async fn delete_item(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM catalog_items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn resolve_items(&self, ids: &[String]) -> Result<Vec<Item>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT * FROM catalog_items WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query_as::<_, ItemRow>(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(map_sqlx_error)?;

        let items = rows
            .into_iter()
            .map(ItemRow::into_item)
            .collect::<Result<Vec<_>>>()?;
        order_by_ids(ids, items, |i| i.id.as_str(), "items")
    }

    async fn resolve_destinations(&self, ids: &[String]) -> Result<Vec<Destination>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT * FROM catalog_destinations WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query_as::<_, DestinationRow>(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(map_sqlx_error)?;

        let destinations = rows
            .into_iter()
            .map(|row| Destination::new(row.id, row.name, row.address))
            .collect();
        order_by_ids(ids, destinations, |d| d.id.as_str(), "destinations")
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: String,
    name: String,
    code: String,
    price: f64,
    image_ref: Option<String>,
    variants: String,
}

impl ItemRow {
    fn into_item(self) -> Result<Item> {
        let variants: BTreeMap<String, String> = serde_json::from_str(&self.variants)?;
        Ok(Item {
            id: self.id,
            name: self.name,
            code: self.code,
            price: self.price,
            image_ref: self.image_ref,
            variants,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DestinationRow {
    id: String,
    name: String,
    address: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use sendflow_core::error::AppError;

    async fn setup_catalog() -> SqliteCatalog {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let catalog = SqliteCatalog::new(pool);

        catalog
            .upsert_item(
                &Item::new("shoe", "Runner", "SH-1", 49.9)
                    .with_image("img/shoe.png")
                    .with_variant("size", "42"),
            )
            .await
            .unwrap();
        catalog
            .upsert_item(&Item::new("bag", "Tote", "BG-2", 19.0))
            .await
            .unwrap();
        catalog
            .upsert_destination(&Destination::new("g1", "Group 1", "chat:1"))
            .await
            .unwrap();
        catalog
            .upsert_destination(&Destination::new("g2", "Group 2", "chat:2"))
            .await
            .unwrap();
        catalog
    }

    #[tokio::test]
    async fn test_resolve_keeps_requested_order() {
        let catalog = setup_catalog().await;

        let items = catalog
            .resolve_items(&["bag".to_string(), "shoe".to_string()])
            .await
            .unwrap();
        assert_eq!(items[0].id, "bag");
        assert_eq!(items[1].id, "shoe");
        assert_eq!(items[1].image_ref.as_deref(), Some("img/shoe.png"));
        assert_eq!(items[1].variants.get("size").map(String::as_str), Some("42"));

        let destinations = catalog
            .resolve_destinations(&["g2".to_string(), "g1".to_string()])
            .await
            .unwrap();
        assert_eq!(destinations[0].address, "chat:2");
        assert_eq!(destinations[1].address, "chat:1");
    }

    #[tokio::test]
    async fn test_upsert_replaces_item() {
        let catalog = setup_catalog().await;
        catalog
            .upsert_item(&Item::new("bag", "Tote XL", "BG-3", 25.0))
            .await
            .unwrap();

        let items = catalog.resolve_items(&["bag".to_string()]).await.unwrap();
        assert_eq!(items[0].name, "Tote XL");
        assert_eq!(items[0].price, 25.0);
    }

    #[tokio::test]
    async fn test_deleted_item_is_unresolvable() {
        let catalog = setup_catalog().await;
        assert!(catalog.delete_item("bag").await.unwrap());

        let err = catalog
            .resolve_items(&["shoe".to_string(), "bag".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unresolvable(_)));
        assert!(err.to_string().contains("bag"));
    }
}
