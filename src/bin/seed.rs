//! Seed script - populates the database with an admin account and a demo catalog
//!
//! Run with: cargo run --bin seed
//!
//! Safe to run repeatedly: existing rows are left alone, missing ones are
//! created. The admin password comes from SEED_ADMIN_PASSWORD when set.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use tracing::info;
use uuid::Uuid;

use storefront_api as api;

use api::auth::{AuthConfig, AuthService, Role};
use api::entities::{category, product, user, user_role};

const ADMIN_EMAIL: &str = "admin@storefront.local";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("=== Storefront API Seed Data ===");

    let cfg = api::config::load_config()?;
    let db = api::db::establish_connection_from_app_config(&cfg).await?;
    api::db::run_migrations(&db).await?;
    info!("Database ready");

    let auth = AuthService::new(AuthConfig::from_app_config(&cfg));
    ensure_admin(&db, &auth).await?;

    let (category_count, product_count) = seed_catalog(&db).await?;
    info!(
        "Catalog ready: {} categories, {} new products",
        category_count, product_count
    );

    info!("");
    info!("Try these API calls:");
    info!("  curl http://localhost:8080/api/v1/products");
    info!("  curl http://localhost:8080/api/v1/categories");
    info!("");
    info!("Or explore interactively at: http://localhost:8080/swagger-ui");

    Ok(())
}

async fn ensure_admin(db: &DatabaseConnection, auth: &AuthService) -> anyhow::Result<()> {
    if let Some(existing) = user::Entity::find()
        .filter(user::Column::Email.eq(ADMIN_EMAIL))
        .one(db)
        .await?
    {
        info!("Admin user already present: {}", existing.email);
        return Ok(());
    }

    let password =
        std::env::var("SEED_ADMIN_PASSWORD").unwrap_or_else(|_| "Admin12345!".to_string());
    let now = Utc::now();
    let admin_id = Uuid::new_v4();

    user::ActiveModel {
        id: Set(admin_id),
        first_name: Set("Store".to_string()),
        last_name: Set("Admin".to_string()),
        email: Set(ADMIN_EMAIL.to_string()),
        password_hash: Set(auth.hash_password(&password)?),
        active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;

    for role in [Role::User, Role::Admin] {
        user_role::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(admin_id),
            role_name: Set(role.as_ref().to_string()),
            created_at: Set(now),
        }
        .insert(db)
        .await?;
    }

    info!("Created admin user {}", ADMIN_EMAIL);
    Ok(())
}

async fn seed_catalog(db: &DatabaseConnection) -> anyhow::Result<(usize, usize)> {
    // (category, [(name, description, price, weight_kg)])
    let catalog = vec![
        (
            "Electronics",
            vec![
                (
                    "Wireless Bluetooth Headphones",
                    "Over-ear headphones with 30-hour battery life and active noise cancellation.",
                    dec!(79.99),
                    dec!(0.45),
                ),
                (
                    "USB-C Fast Charger 65W",
                    "GaN technology charger compatible with laptops, phones, and tablets.",
                    dec!(34.99),
                    dec!(0.20),
                ),
                (
                    "Mechanical Keyboard",
                    "Hot-swappable mechanical keyboard with per-key backlighting.",
                    dec!(129.99),
                    dec!(1.10),
                ),
            ],
        ),
        (
            "Apparel",
            vec![
                (
                    "Classic Cotton T-Shirt",
                    "Premium 100% organic cotton t-shirt. Comfortable fit.",
                    dec!(24.99),
                    dec!(0.25),
                ),
                (
                    "Merino Wool Sweater",
                    "Temperature-regulating merino wool sweater.",
                    dec!(119.99),
                    dec!(0.60),
                ),
            ],
        ),
        (
            "Accessories",
            vec![
                (
                    "Leather Bifold Wallet",
                    "Genuine leather wallet with RFID blocking.",
                    dec!(49.99),
                    dec!(0.15),
                ),
                (
                    "Canvas Backpack 25L",
                    "Water-resistant canvas backpack with laptop compartment.",
                    dec!(79.99),
                    dec!(0.90),
                ),
                (
                    "Stainless Steel Water Bottle",
                    "32oz double-wall insulated bottle. Keeps drinks cold for 24 hours.",
                    dec!(29.99),
                    dec!(0.40),
                ),
            ],
        ),
    ];

    let category_count = catalog.len();
    let mut created_products = 0;

    for (category_name, items) in catalog {
        let category = ensure_category(db, category_name).await?;
        for (name, description, price, weight) in items {
            if ensure_product(db, category.id, name, description, price, weight).await? {
                created_products += 1;
            }
        }
    }

    Ok((category_count, created_products))
}

async fn ensure_category(db: &DatabaseConnection, name: &str) -> anyhow::Result<category::Model> {
    if let Some(existing) = category::Entity::find()
        .filter(category::Column::Name.eq(name))
        .one(db)
        .await?
    {
        return Ok(existing);
    }

    let created = category::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!("Created category {}", created.name);
    Ok(created)
}

async fn ensure_product(
    db: &DatabaseConnection,
    category_id: Uuid,
    name: &str,
    description: &str,
    price: Decimal,
    weight: Decimal,
) -> anyhow::Result<bool> {
    let exists = product::Entity::find()
        .filter(product::Column::Name.eq(name))
        .one(db)
        .await?
        .is_some();
    if exists {
        return Ok(false);
    }

    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(description.to_string()),
        price: Set(price),
        weight: Set(weight),
        category_id: Set(category_id),
        image_name: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(true)
}
