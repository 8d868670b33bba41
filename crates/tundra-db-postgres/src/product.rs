//! Product catalog storage.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;
use time::OffsetDateTime;
use tracing::instrument;
use tundra_core::{NewProduct, Product, ProductPatch};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult, is_foreign_key_violation};

pub const PRODUCT_NOT_FOUND: &str = "Product not found";
pub const PRODUCT_REFERENCED: &str = "Product is referenced by existing orders";

pub(crate) type ProductTuple = (
    Uuid,
    String,
    String,
    f64,
    i64,
    String,
    Option<String>,
    Uuid,
    OffsetDateTime,
    OffsetDateTime,
);

pub(crate) const PRODUCT_COLUMNS: &str =
    "id, name, description, price, stock, category, image_url, user_id, created_at, updated_at";

pub(crate) fn from_tuple(row: ProductTuple) -> Product {
    Product {
        id: row.0,
        name: row.1,
        description: row.2,
        price: row.3,
        stock: row.4,
        category: row.5,
        image_url: row.6,
        user_id: row.7,
        created_at: row.8,
        updated_at: row.9,
    }
}

/// Escapes `\`, `%` and `_` so user input matches literally inside `LIKE`.
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Paging and search parameters for [`ProductStorage::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductQuery {
    /// 1-based page number.
    pub page: u32,
    pub size: u32,
    /// Case-insensitive substring of the product name.
    pub search: Option<String>,
}

impl ProductQuery {
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.size)
    }

    fn pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)))
    }
}

/// Product storage backed by the `products` table.
pub struct ProductStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> StorageResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row: Option<ProductTuple> = query_as(&sql).bind(id).fetch_optional(self.pool).await?;
        Ok(row.map(from_tuple))
    }

    #[instrument(skip(self))]
    pub async fn find_by_name(&self, name: &str) -> StorageResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE name = $1 LIMIT 1");
        let row: Option<ProductTuple> = query_as(&sql)
            .bind(name)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(from_tuple))
    }

    /// Returns one page of products, newest first, and the total match count.
    #[instrument(skip(self))]
    pub async fn list(&self, q: &ProductQuery) -> StorageResult<(Vec<Product>, u64)> {
        let pattern = q.pattern();
        let filter = if pattern.is_some() {
            "WHERE lower(name) LIKE lower($1) ESCAPE '\\'"
        } else {
            ""
        };

        let count_sql = format!("SELECT COUNT(*) FROM products {filter}");
        let mut count_query = query_scalar::<_, i64>(&count_sql);
        if let Some(p) = &pattern {
            count_query = count_query.bind(p);
        }
        let total = count_query.fetch_one(self.pool).await?;

        let (limit_arg, offset_arg) = if pattern.is_some() { (2, 3) } else { (1, 2) };
        let page_sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products {filter} \
             ORDER BY created_at DESC, id LIMIT ${limit_arg} OFFSET ${offset_arg}"
        );
        let mut page_query = query_as::<_, ProductTuple>(&page_sql);
        if let Some(p) = &pattern {
            page_query = page_query.bind(p);
        }
        let rows = page_query
            .bind(i64::from(q.size))
            .bind(q.offset())
            .fetch_all(self.pool)
            .await?;

        Ok((
            rows.into_iter().map(from_tuple).collect(),
            u64::try_from(total).unwrap_or(0),
        ))
    }

    #[instrument(skip(self, product), fields(name = %product.name))]
    pub async fn create(&self, product: NewProduct) -> StorageResult<Product> {
        let sql = format!(
            "INSERT INTO products (name, description, price, stock, category, image_url, user_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {PRODUCT_COLUMNS}"
        );
        let row: ProductTuple = query_as(&sql)
            .bind(&product.name)
            .bind(&product.description)
            .bind(product.price)
            .bind(product.stock)
            .bind(&product.category)
            .bind(&product.image_url)
            .bind(product.user_id)
            .fetch_one(self.pool)
            .await?;
        Ok(from_tuple(row))
    }

    /// Applies the fields present in `patch`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the product does not exist.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: Uuid, patch: &ProductPatch) -> StorageResult<Product> {
        let sql = format!(
            "UPDATE products SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description), \
                price = COALESCE($4, price), \
                stock = COALESCE($5, stock), \
                category = COALESCE($6, category), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        );
        let row: Option<ProductTuple> = query_as(&sql)
            .bind(id)
            .bind(&patch.name)
            .bind(&patch.description)
            .bind(patch.price)
            .bind(patch.stock)
            .bind(&patch.category)
            .fetch_optional(self.pool)
            .await?;

        row.map(from_tuple)
            .ok_or_else(|| StorageError::not_found(PRODUCT_NOT_FOUND))
    }

    #[instrument(skip(self))]
    pub async fn set_image_url(&self, id: Uuid, url: &str) -> StorageResult<Product> {
        let sql = format!(
            "UPDATE products SET image_url = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        );
        let row: Option<ProductTuple> = query_as(&sql)
            .bind(id)
            .bind(url)
            .fetch_optional(self.pool)
            .await?;

        row.map(from_tuple)
            .ok_or_else(|| StorageError::not_found(PRODUCT_NOT_FOUND))
    }

    /// Deletes a product.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it does not exist and `Conflict` if order lines
    /// still reference it.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> StorageResult<()> {
        let result = query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    return StorageError::conflict(PRODUCT_REFERENCED);
                }
                StorageError::from(e)
            })?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(PRODUCT_NOT_FOUND));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("laptop"), "laptop");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("c:\\"), "c:\\\\");
    }

    #[test]
    fn test_query_offset_and_pattern() {
        let q = ProductQuery {
            page: 3,
            size: 10,
            search: Some("50%".into()),
        };
        assert_eq!(q.offset(), 20);
        assert_eq!(q.pattern().as_deref(), Some("%50\\%%"));

        let q = ProductQuery {
            page: 0,
            size: 10,
            search: Some(String::new()),
        };
        assert_eq!(q.offset(), 0);
        assert_eq!(q.pattern(), None);
    }
}
