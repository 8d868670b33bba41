//! Domain types and input validation shared by the Tundra crates.
//!
//! Nothing in here talks to the network or the database; storage and HTTP
//! layers build on these types.

pub mod error;
pub mod models;
pub mod order;
pub mod validation;

pub use error::{ValidationError, ValidationResult};
pub use models::{
    NewProduct, NewUser, Order, OrderProduct, OrderStatus, Product, ProductPage, ProductPatch,
    Role, User, order_description, total_pages,
};
pub use order::{OrderItem, OrderItemError, OrderLine, normalize_items};
pub use validation::{
    parse_price, parse_stock, validate_email, validate_password, validate_username,
};
