//! # Catalog Cache Repository
//!
//! Local read-model of catalog entities. Filled by the catalog service (or
//! the `seed` binary); the sync engine only reads it and writes `status`.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use shopline_core::{CachedProduct, Money, ProductStatus};

#[derive(Debug, FromRow)]
struct CachedProductRow {
    id: String,
    brand: String,
    model: String,
    storage: Option<String>,
    color: Option<String>,
    condition: Option<String>,
    identifier: Option<String>,
    price_cents: i64,
    status: ProductStatus,
    updated_at: DateTime<Utc>,
}

impl From<CachedProductRow> for CachedProduct {
    fn from(row: CachedProductRow) -> Self {
        CachedProduct {
            id: row.id,
            brand: row.brand,
            model: row.model,
            storage: row.storage,
            color: row.color,
            condition: row.condition,
            identifier: row.identifier,
            price: Money::from_cents(row.price_cents),
            status: row.status,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for `cached_products`.
#[derive(Debug, Clone)]
pub struct CatalogCacheRepository {
    pool: SqlitePool,
}

impl CatalogCacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogCacheRepository { pool }
    }

    pub async fn upsert(&self, product: &CachedProduct) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cached_products (
                id, brand, model, storage, color, condition, identifier,
                price_cents, status, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                brand = excluded.brand,
                model = excluded.model,
                storage = excluded.storage,
                color = excluded.color,
                condition = excluded.condition,
                identifier = excluded.identifier,
                price_cents = excluded.price_cents,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&product.id)
        .bind(&product.brand)
        .bind(&product.model)
        .bind(&product.storage)
        .bind(&product.color)
        .bind(&product.condition)
        .bind(&product.identifier)
        .bind(product.price.cents())
        .bind(product.status)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<CachedProduct>> {
        let row: Option<CachedProductRow> = sqlx::query_as(
            r#"
            SELECT id, brand, model, storage, color, condition, identifier,
                   price_cents, status, updated_at
            FROM cached_products WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CachedProduct::from))
    }

    pub async fn list_by_status(&self, status: ProductStatus) -> DbResult<Vec<CachedProduct>> {
        let rows: Vec<CachedProductRow> = sqlx::query_as(
            r#"
            SELECT id, brand, model, storage, color, condition, identifier,
                   price_cents, status, updated_at
            FROM cached_products WHERE status = ?1
            ORDER BY brand, model
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CachedProduct::from).collect())
    }

    /// Updates the cached status. Returns false if the product is not cached.
    pub async fn set_status(&self, id: &str, status: ProductStatus) -> DbResult<bool> {
        debug!(product_id = %id, status = %status, "Updating cached product status");

        let result = sqlx::query("UPDATE cached_products SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cached_products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn handset(id: &str, status: ProductStatus) -> CachedProduct {
        CachedProduct {
            id: id.to_string(),
            brand: "Samsung".to_string(),
            model: "Galaxy S23".to_string(),
            storage: Some("256GB".to_string()),
            color: Some("Black".to_string()),
            condition: Some("Grade B".to_string()),
            identifier: Some(format!("35{id}")),
            price: Money::from_cents(42_000),
            status,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_set_status() {
        let repo = Database::new(DbConfig::in_memory()).await.unwrap().catalog();
        repo.upsert(&handset("P1", ProductStatus::Sold)).await.unwrap();

        assert!(repo.set_status("P1", ProductStatus::Available).await.unwrap());
        assert_eq!(
            repo.get("P1").await.unwrap().unwrap().status,
            ProductStatus::Available
        );
        assert!(!repo.set_status("P404", ProductStatus::Available).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let repo = Database::new(DbConfig::in_memory()).await.unwrap().catalog();
        repo.upsert(&handset("P1", ProductStatus::Available)).await.unwrap();
        repo.upsert(&handset("P2", ProductStatus::Sold)).await.unwrap();

        let available = repo.list_by_status(ProductStatus::Available).await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, "P1");
        assert_eq!(available[0].price.cents(), 42_000);
        assert_eq!(repo.count().await.unwrap(), 2);
    }
}
