use anyhow::{Context, Result};
use colored::Colorize;
use tundra_core::{NewProduct, NewUser, Role};
use tundra_db_postgres::PostgresStore;
use uuid::Uuid;

use crate::output::{print_error, print_skipped, print_success};

pub const SEED_PASSWORD: &str = "Hello@1234";

/// (username, email, role)
pub const SEED_USERS: [(&str, &str, Role); 2] = [
    ("admin", "admin@tundra.com", Role::Admin),
    ("user", "user@tundra.com", Role::User),
];

pub struct SeedProduct {
    pub name: &'static str,
    pub description: &'static str,
    pub price: f64,
    pub stock: i64,
    pub category: &'static str,
}

pub const SEED_PRODUCTS: [SeedProduct; 10] = [
    SeedProduct {
        name: "Gaming Laptop Pro",
        description: "High-performance gaming laptop with RTX 4080, 32GB RAM, and 1TB SSD",
        price: 1999.99,
        stock: 25,
        category: "Electronics",
    },
    SeedProduct {
        name: "Wireless Mouse",
        description: "Ergonomic wireless mouse with 6 programmable buttons",
        price: 49.99,
        stock: 150,
        category: "Accessories",
    },
    SeedProduct {
        name: "Mechanical Keyboard",
        description: "RGB mechanical keyboard with Cherry MX switches",
        price: 129.99,
        stock: 75,
        category: "Accessories",
    },
    SeedProduct {
        name: "4K Monitor",
        description: "27-inch 4K IPS monitor with 144Hz refresh rate",
        price: 499.99,
        stock: 40,
        category: "Electronics",
    },
    SeedProduct {
        name: "USB-C Hub",
        description: "7-in-1 USB-C hub with HDMI, USB 3.0, and card reader",
        price: 39.99,
        stock: 200,
        category: "Accessories",
    },
    SeedProduct {
        name: "Wireless Headphones",
        description: "Noise-cancelling Bluetooth headphones with 30-hour battery",
        price: 199.99,
        stock: 60,
        category: "Audio",
    },
    SeedProduct {
        name: "Webcam HD",
        description: "1080p webcam with auto-focus and dual microphones",
        price: 79.99,
        stock: 90,
        category: "Electronics",
    },
    SeedProduct {
        name: "Laptop Stand",
        description: "Aluminum laptop stand with adjustable height",
        price: 34.99,
        stock: 120,
        category: "Accessories",
    },
    SeedProduct {
        name: "External SSD 1TB",
        description: "Portable external SSD with 1050MB/s read speed",
        price: 149.99,
        stock: 80,
        category: "Storage",
    },
    SeedProduct {
        name: "Cable Management Kit",
        description: "Complete desk cable management solution with clips and sleeves",
        price: 24.99,
        stock: 180,
        category: "Accessories",
    },
];

/// Creates the default users and products. Existing rows are left alone, so
/// running it twice is harmless.
pub async fn run(store: &PostgresStore) -> Result<()> {
    let password_hash = tundra_auth::hash_password(SEED_PASSWORD)
        .map_err(|e| anyhow::anyhow!("failed to hash seed password: {e}"))?;

    for (username, email, role) in SEED_USERS {
        if store.users().find_by_email(email).await?.is_some() {
            print_skipped(&format!("User {email} already exists"));
            continue;
        }
        store
            .users()
            .create(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash: password_hash.clone(),
                role,
            })
            .await
            .with_context(|| format!("failed to create user {email}"))?;
        print_success(&format!("Created {} user: {email} ({username})", role.as_str()));
    }

    let owner = admin_id(store).await?;

    println!("\nSeeding products...");
    let (mut created, mut skipped) = (0, 0);
    for product in &SEED_PRODUCTS {
        if store.products().find_by_name(product.name).await?.is_some() {
            skipped += 1;
            continue;
        }
        let result = store
            .products()
            .create(NewProduct {
                name: product.name.to_string(),
                description: product.description.to_string(),
                price: product.price,
                stock: product.stock,
                category: product.category.to_string(),
                image_url: None,
                user_id: owner,
            })
            .await;
        match result {
            Ok(_) => {
                created += 1;
                print_success(&format!("Created product: {} (${:.2})", product.name, product.price));
            }
            Err(e) => print_error(&format!("Failed to create product {}: {e}", product.name)),
        }
    }

    if skipped > 0 {
        print_skipped(&format!("Skipped {skipped} existing product(s)"));
    }
    print_success(&format!("Created {created} new product(s)"));

    println!("\n{}", "Seeding completed.".green().bold());
    println!("Log in with:");
    for (_, email, role) in SEED_USERS {
        println!("  {:<6} {email} / {SEED_PASSWORD}", role.as_str());
    }
    Ok(())
}

async fn admin_id(store: &PostgresStore) -> Result<Uuid> {
    let (_, email, _) = SEED_USERS[0];
    let admin = store
        .users()
        .find_by_email(email)
        .await?
        .with_context(|| format!("seed admin {email} not found"))?;
    Ok(admin.id)
}
