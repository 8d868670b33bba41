//! Order request items and their normalization before placement.

use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

/// One entry of an order request body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderItem {
    #[serde(rename = "productId")]
    pub product_id: String,
    pub quantity: i32,
}

/// A validated order line, ready for the stock transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderItemError {
    #[error("Order must contain at least one item")]
    Empty,

    /// A non-positive quantity or a blank product id.
    #[error("Invalid request body")]
    InvalidItem,

    #[error("Product with ID {0} not found")]
    UnknownProduct(String),
}

/// Validates request items and merges repeated products.
///
/// The whole body is shape-checked (positive quantity, non-blank id) before
/// any id is parsed. Lines keep the position of the first occurrence of each
/// product, which is the order row locks are taken in.
pub fn normalize_items(items: &[OrderItem]) -> Result<Vec<OrderLine>, OrderItemError> {
    if items.is_empty() {
        return Err(OrderItemError::Empty);
    }
    if items
        .iter()
        .any(|item| item.quantity <= 0 || item.product_id.trim().is_empty())
    {
        return Err(OrderItemError::InvalidItem);
    }

    let mut lines: Vec<OrderLine> = Vec::with_capacity(items.len());
    for item in items {
        let product_id = Uuid::parse_str(item.product_id.trim())
            .map_err(|_| OrderItemError::UnknownProduct(item.product_id.clone()))?;

        match lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => {
                line.quantity = line
                    .quantity
                    .checked_add(item.quantity)
                    .ok_or(OrderItemError::InvalidItem)?;
            }
            None => lines.push(OrderLine {
                product_id,
                quantity: item.quantity,
            }),
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, quantity: i32) -> OrderItem {
        OrderItem {
            product_id: id.to_string(),
            quantity,
        }
    }

    const A: &str = "5f1e8a8e-3a4b-4c55-9d77-0d1f2b3c4d5e";
    const B: &str = "9a0b1c2d-3e4f-4a5b-8c6d-7e8f9a0b1c2d";

    #[test]
    fn empty_order_is_rejected() {
        assert_eq!(normalize_items(&[]), Err(OrderItemError::Empty));
        assert_eq!(
            OrderItemError::Empty.to_string(),
            "Order must contain at least one item"
        );
    }

    #[test]
    fn non_positive_quantity_is_invalid_body() {
        assert_eq!(
            normalize_items(&[item(A, 0)]),
            Err(OrderItemError::InvalidItem)
        );
        assert_eq!(
            normalize_items(&[item(A, -3)]),
            Err(OrderItemError::InvalidItem)
        );
    }

    #[test]
    fn body_shape_is_checked_before_ids() {
        assert_eq!(
            normalize_items(&[item("bad", 1), item(A, 0)]),
            Err(OrderItemError::InvalidItem)
        );
        assert_eq!(
            normalize_items(&[item("bad", 1), item("  ", 2)]),
            Err(OrderItemError::InvalidItem)
        );
    }

    #[test]
    fn malformed_id_reports_not_found() {
        let err = normalize_items(&[item("not-a-uuid", 1)]).unwrap_err();
        assert_eq!(err.to_string(), "Product with ID not-a-uuid not found");
    }

    #[test]
    fn duplicates_merge_in_first_occurrence_order() {
        let lines = normalize_items(&[item(B, 1), item(A, 2), item(B, 3)]).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].product_id.to_string(), B);
        assert_eq!(lines[0].quantity, 4);
        assert_eq!(lines[1].product_id.to_string(), A);
        assert_eq!(lines[1].quantity, 2);
    }

    #[test]
    fn merged_overflow_is_rejected() {
        assert_eq!(
            normalize_items(&[item(A, i32::MAX), item(A, 1)]),
            Err(OrderItemError::InvalidItem)
        );
    }

    #[test]
    fn deserializes_wire_shape() {
        let items: Vec<OrderItem> =
            serde_json::from_str(&format!(r#"[{{"productId":"{A}","quantity":2}}]"#)).unwrap();
        assert_eq!(items, vec![item(A, 2)]);
    }
}
