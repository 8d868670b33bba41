//! Order storage and the stock-deducting order transaction.

use std::collections::HashMap;

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::PgPool;
use time::OffsetDateTime;
use tracing::{debug, info, instrument};
use tundra_core::{Order, OrderLine, OrderProduct, OrderStatus, Product, order_description};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::product::{PRODUCT_COLUMNS, ProductTuple, from_tuple as product_from_tuple};

pub const ORDER_NOT_FOUND: &str = "Order not found";

type OrderTuple = (Uuid, Uuid, String, f64, String, OffsetDateTime, OffsetDateTime);

const ORDER_COLUMNS: &str = "id, user_id, description, total_price, status, created_at, updated_at";

/// `order_products` row joined with its product.
type LineTuple = (
    Uuid,
    Uuid,
    i32,
    f64,
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

const LINE_SELECT: &str = "SELECT op.order_id, op.product_id, op.quantity, op.price, \
    p.id, p.name, p.description, p.price, p.stock, p.category, p.image_url, p.user_id, \
    p.created_at, p.updated_at \
    FROM order_products op JOIN products p ON p.id = op.product_id";

fn order_from_tuple(row: OrderTuple, order_products: Vec<OrderProduct>) -> StorageResult<Order> {
    let status: OrderStatus = row
        .4
        .parse()
        .map_err(|e: tundra_core::ValidationError| StorageError::invalid_input(e.to_string()))?;
    Ok(Order {
        id: row.0,
        user_id: row.1,
        description: row.2,
        total_price: row.3,
        status,
        created_at: row.5,
        updated_at: row.6,
        order_products,
    })
}

fn line_from_tuple(row: LineTuple) -> OrderProduct {
    OrderProduct {
        order_id: row.0,
        product_id: row.1,
        quantity: row.2,
        price: row.3,
        product: product_from_tuple((
            row.4, row.5, row.6, row.7, row.8, row.9, row.10, row.11, row.12, row.13,
        )),
    }
}

/// Sum of unit price times quantity over the locked lines.
pub fn order_total(lines: &[(OrderLine, Product)]) -> f64 {
    lines
        .iter()
        .map(|(line, product)| product.price * f64::from(line.quantity))
        .sum()
}

/// Order storage backed by `orders` and `order_products`.
pub struct OrderStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Places an order for `user_id` in a single transaction.
    ///
    /// Product rows are locked with `SELECT ... FOR UPDATE` in the order the
    /// lines are given, so the first failing line is the one reported. Each row is checked for stock and decremented before the next one is
    /// touched. Any error returns early and drops the transaction, which rolls
    /// back every deduction made so far.
    ///
    /// # Errors
    ///
    /// - `NotFound` if a product does not exist
    /// - `InsufficientStock` if a product has less stock than requested
    /// - `Database` for any query failure
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn place_order(&self, user_id: Uuid, lines: &[OrderLine]) -> StorageResult<Order> {
        if lines.is_empty() {
            return Err(StorageError::invalid_input(
                "Order must contain at least one item",
            ));
        }

        let mut tx = self.pool.begin().await?;

        let lock_sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE");
        let deduct_sql = format!(
            "UPDATE products SET stock = stock - $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        );

        let mut locked: Vec<(OrderLine, Product)> = Vec::with_capacity(lines.len());
        for line in lines {
            let row: Option<ProductTuple> = query_as(&lock_sql)
                .bind(line.product_id)
                .fetch_optional(&mut *tx)
                .await?;
            let product = row.map(product_from_tuple).ok_or_else(|| {
                StorageError::not_found(format!("Product with ID {} not found", line.product_id))
            })?;

            if product.stock < i64::from(line.quantity) {
                debug!(
                    product_id = %product.id,
                    available = product.stock,
                    requested = line.quantity,
                    "Insufficient stock, rolling back"
                );
                return Err(StorageError::insufficient_stock(
                    product.name,
                    product.stock,
                    line.quantity,
                ));
            }

            let updated: ProductTuple = query_as(&deduct_sql)
                .bind(line.product_id)
                .bind(i64::from(line.quantity))
                .fetch_one(&mut *tx)
                .await?;
            locked.push((*line, product_from_tuple(updated)));
        }

        let order_sql = format!(
            "INSERT INTO orders (user_id, description, total_price, status) \
             VALUES ($1, $2, $3, $4) RETURNING {ORDER_COLUMNS}"
        );
        let order_row: OrderTuple = query_as(&order_sql)
            .bind(user_id)
            .bind(order_description(locked.len()))
            .bind(order_total(&locked))
            .bind(OrderStatus::Pending.as_str())
            .fetch_one(&mut *tx)
            .await?;
        let order_id = order_row.0;

        let mut order_products = Vec::with_capacity(locked.len());
        for (line, product) in locked {
            query(
                "INSERT INTO order_products (order_id, product_id, quantity, price) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(order_id)
            .bind(line.product_id)
            .bind(line.quantity)
            .bind(product.price)
            .execute(&mut *tx)
            .await?;

            order_products.push(OrderProduct {
                order_id,
                product_id: line.product_id,
                quantity: line.quantity,
                price: product.price,
                product,
            });
        }

        tx.commit().await?;

        order_products.sort_by(|a, b| a.product.name.cmp(&b.product.name));
        info!(%order_id, %user_id, "Order placed");
        order_from_tuple(order_row, order_products)
    }

    /// Orders of `user_id`, newest first, each with its lines and products.
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: Uuid) -> StorageResult<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id"
        );
        let rows: Vec<OrderTuple> = query_as(&sql).bind(user_id).fetch_all(self.pool).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.0).collect();
        let mut lines = self.lines_for(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let order_products = lines.remove(&row.0).unwrap_or_default();
                order_from_tuple(row, order_products)
            })
            .collect()
    }

    /// One order of `user_id`. Orders of other users are reported as missing.
    #[instrument(skip(self))]
    pub async fn find_for_user(&self, user_id: Uuid, order_id: Uuid) -> StorageResult<Order> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND user_id = $2");
        let row: Option<OrderTuple> = query_as(&sql)
            .bind(order_id)
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?;
        let row = row.ok_or_else(|| StorageError::not_found(ORDER_NOT_FOUND))?;

        let mut lines = self.lines_for(&[order_id]).await?;
        order_from_tuple(row, lines.remove(&order_id).unwrap_or_default())
    }

    async fn lines_for(&self, order_ids: &[Uuid]) -> StorageResult<HashMap<Uuid, Vec<OrderProduct>>> {
        let sql = format!("{LINE_SELECT} WHERE op.order_id = ANY($1) ORDER BY op.order_id, p.name");
        let rows: Vec<LineTuple> = query_as(&sql)
            .bind(order_ids)
            .fetch_all(self.pool)
            .await?;

        let mut grouped: HashMap<Uuid, Vec<OrderProduct>> = HashMap::new();
        for row in rows {
            let line = line_from_tuple(row);
            grouped.entry(line.order_id).or_default().push(line);
        }
        Ok(grouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(price: f64) -> Product {
        let now = OffsetDateTime::now_utc();
        Product {
            id: Uuid::new_v4(),
            name: "Mechanical Keyboard".into(),
            description: "RGB".into(),
            price,
            stock: 10,
            category: "Accessories".into(),
            image_url: None,
            user_id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_order_total() {
        let a = product(129.99);
        let b = product(49.99);
        let lines = vec![
            (
                OrderLine {
                    product_id: a.id,
                    quantity: 2,
                },
                a,
            ),
            (
                OrderLine {
                    product_id: b.id,
                    quantity: 1,
                },
                b,
            ),
        ];
        assert!((order_total(&lines) - 309.97).abs() < 1e-9);
        assert_eq!(order_total(&[]), 0.0);
    }

    #[test]
    fn test_order_from_tuple_rejects_unknown_status() {
        let now = OffsetDateTime::now_utc();
        let row: OrderTuple = (
            Uuid::new_v4(),
            Uuid::new_v4(),
            "Order with 1 item(s)".into(),
            10.0,
            "shipped".into(),
            now,
            now,
        );
        assert!(order_from_tuple(row, Vec::new()).is_err());
    }
}
