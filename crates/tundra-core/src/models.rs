use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{ValidationError, ValidationResult};

// =============================================================================
// Users
// =============================================================================

/// Account role. Admins manage the catalog; users place orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(ValidationError::new("role", format!("unknown role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Insert payload for a user whose password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

// =============================================================================
// Products
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub stock: i64,
    pub category: String,
    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: f64,
    pub stock: i64,
    pub category: String,
    pub image_url: Option<String>,
    pub user_id: Uuid,
}

/// Partial product update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub category: Option<String>,
}

impl ProductPatch {
    /// Checks every provided field, reporting the first offending one in
    /// declaration order.
    pub fn validate(&self) -> ValidationResult<()> {
        if let Some(name) = &self.name
            && name.is_empty()
        {
            return Err(ValidationError::new("name", "Name must be a non-empty string"));
        }
        if let Some(description) = &self.description
            && description.is_empty()
        {
            return Err(ValidationError::new(
                "description",
                "Description must be a non-empty string",
            ));
        }
        if let Some(price) = self.price
            && !(price.is_finite() && price > 0.0)
        {
            return Err(ValidationError::new("price", "Price must be a positive number"));
        }
        if let Some(stock) = self.stock
            && stock < 0
        {
            return Err(ValidationError::new(
                "stock",
                "Stock must be a non-negative integer",
            ));
        }
        if let Some(category) = &self.category
            && category.is_empty()
        {
            return Err(ValidationError::new(
                "category",
                "Category must be a non-empty string",
            ));
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies the patch on top of an existing product.
    pub fn apply_to(&self, product: &mut Product) {
        if let Some(name) = &self.name {
            product.name = name.clone();
        }
        if let Some(description) = &self.description {
            product.description = description.clone();
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(stock) = self.stock {
            product.stock = stock;
        }
        if let Some(category) = &self.category {
            product.category = category.clone();
        }
    }
}

/// One page of the product listing, in the wire shape clients expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPage {
    #[serde(rename = "currentPage")]
    pub current_page: u32,
    /// Number of products actually returned on this page.
    #[serde(rename = "pageSize")]
    pub page_size: usize,
    #[serde(rename = "totalPages")]
    pub total_pages: u64,
    #[serde(rename = "totalProducts")]
    pub total_products: u64,
    pub products: Vec<Product>,
}

impl ProductPage {
    pub fn new(page: u32, requested_size: u32, total: u64, products: Vec<Product>) -> Self {
        Self {
            current_page: page,
            page_size: products.len(),
            total_pages: total_pages(total, requested_size),
            total_products: total,
            products,
        }
    }
}

/// Ceiling division, with zero pages for an empty result.
pub fn total_pages(total: u64, page_size: u32) -> u64 {
    if total == 0 || page_size == 0 {
        return 0;
    }
    total.div_ceil(u64::from(page_size))
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(ValidationError::new(
                "status",
                format!("unknown order status: {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub description: String,
    pub total_price: f64,
    pub status: OrderStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub order_products: Vec<OrderProduct>,
}

/// A line of a placed order. `price` is the unit price at the time of
/// ordering, independent of later catalog changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderProduct {
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: f64,
    pub product: Product,
}

/// Human-readable order summary stored with each order.
pub fn order_description(item_count: usize) -> String {
    format!("Order with {item_count} item(s)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_product() -> Product {
        Product {
            id: Uuid::nil(),
            name: "Wireless Mouse".into(),
            description: "Ergonomic".into(),
            price: 49.99,
            stock: 150,
            category: "Accessories".into(),
            image_url: None,
            user_id: Uuid::nil(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn role_round_trips_through_str() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(Role::User.to_string(), "user");
        assert!("root".parse::<Role>().is_err());
        assert_eq!(Role::default(), Role::User);
    }

    #[test]
    fn product_omits_missing_image_url() {
        let value = serde_json::to_value(sample_product()).unwrap();
        assert!(value.get("imageUrl").is_none());
        assert_eq!(value["user_id"], json!(Uuid::nil()));

        let mut with_image = sample_product();
        with_image.image_url = Some("https://res.cloudinary.com/x.png".into());
        let value = serde_json::to_value(with_image).unwrap();
        assert_eq!(value["imageUrl"], "https://res.cloudinary.com/x.png");
    }

    #[test]
    fn user_never_serializes_password_hash() {
        let user = User {
            id: Uuid::nil(),
            username: "admin".into(),
            email: "admin@tundra.com".into(),
            password_hash: "$argon2id$secret".into(),
            role: Role::Admin,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        };
        let text = serde_json::to_string(&user).unwrap();
        assert!(!text.contains("argon2"));
        assert!(text.contains("\"role\":\"admin\""));
    }

    #[test]
    fn total_pages_rounds_up_and_handles_empty() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(1, 100), 1);
    }

    #[test]
    fn page_size_reports_returned_items() {
        let page = ProductPage::new(2, 10, 11, vec![sample_product()]);
        assert_eq!(page.page_size, 1);
        assert_eq!(page.total_pages, 2);
        let value = serde_json::to_value(&page).unwrap();
        assert_eq!(value["currentPage"], 2);
        assert_eq!(value["totalProducts"], 11);
    }

    #[test]
    fn patch_validation_messages() {
        let patch = ProductPatch {
            name: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(
            patch.validate().unwrap_err().to_string(),
            "Name must be a non-empty string"
        );

        let patch = ProductPatch {
            price: Some(0.0),
            ..Default::default()
        };
        assert_eq!(
            patch.validate().unwrap_err().to_string(),
            "Price must be a positive number"
        );

        let patch = ProductPatch {
            stock: Some(-1),
            ..Default::default()
        };
        assert_eq!(
            patch.validate().unwrap_err().to_string(),
            "Stock must be a non-negative integer"
        );

        let patch = ProductPatch {
            category: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(
            patch.validate().unwrap_err().to_string(),
            "Category must be a non-empty string"
        );

        assert!(ProductPatch::default().validate().is_ok());
        assert!(ProductPatch::default().is_empty());
    }

    #[test]
    fn patch_applies_only_present_fields() {
        let mut product = sample_product();
        let patch = ProductPatch {
            price: Some(59.99),
            stock: Some(0),
            ..Default::default()
        };
        patch.apply_to(&mut product);
        assert_eq!(product.price, 59.99);
        assert_eq!(product.stock, 0);
        assert_eq!(product.name, "Wireless Mouse");
    }

    #[test]
    fn order_description_counts_lines() {
        assert_eq!(order_description(1), "Order with 1 item(s)");
        assert_eq!(order_description(3), "Order with 3 item(s)");
    }
}
