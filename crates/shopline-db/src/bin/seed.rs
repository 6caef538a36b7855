//! # Catalog Cache Seeder
//!
//! Fills the cached catalog with demo handsets for development.
//!
//! ## Usage
//! ```bash
//! # 40 handsets (default)
//! cargo run -p shopline-db --bin seed
//!
//! # Custom amount and database
//! cargo run -p shopline-db --bin seed -- --count 200 --db ./data/shopline-sync.db
//! ```
//!
//! Each handset gets a stable id (`{BRAND}-{MODEL}-{NNN}`), a fake IMEI,
//! a storage tier and a price between 120.00 and 1,199.00.

use chrono::Utc;
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shopline_core::{CachedProduct, Money, ProductStatus};
use shopline_db::{Database, DbConfig};

/// (brand, models, base price in cents)
const HANDSETS: &[(&str, &[&str], i64)] = &[
    ("Apple", &["iPhone 12", "iPhone 13", "iPhone 14", "iPhone 15"], 45_000),
    ("Samsung", &["Galaxy S22", "Galaxy S23", "Galaxy A54", "Galaxy Z Flip5"], 30_000),
    ("Google", &["Pixel 7", "Pixel 7a", "Pixel 8"], 28_000),
    ("Xiaomi", &["Redmi Note 12", "13T"], 12_000),
];

/// (storage, price addon in cents)
const STORAGE: &[(&str, i64)] = &[("64GB", 0), ("128GB", 6_000), ("256GB", 14_000), ("512GB", 30_000)];

const COLORS: &[&str] = &["Black", "White", "Blue", "Green", "Purple"];
const CONDITIONS: &[&str] = &["New", "Grade A", "Grade B", "Grade C"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,shopline=debug,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 40;
    let mut db_path = String::from("./shopline_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(40);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Shopline catalog cache seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of handsets to cache (default: 40)");
                println!("  -d, --db <PATH>    Database file path (default: ./shopline_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(db = %db_path, count, "Seeding catalog cache");

    let db = Database::new(DbConfig::new(&db_path)).await?;
    let catalog = db.catalog();

    let existing = catalog.count().await?;
    if existing > 0 {
        warn!(existing, "Catalog cache already populated; delete the database to regenerate");
        return Ok(());
    }

    let mut generated = 0usize;
    'outer: for (brand, models, base_price) in HANDSETS {
        for model in models.iter() {
            for (storage, addon) in STORAGE {
                if generated >= count {
                    break 'outer;
                }
                let product = handset(brand, model, storage, base_price + addon, generated);
                if let Err(e) = catalog.upsert(&product).await {
                    warn!(id = %product.id, error = %e, "Failed to cache handset");
                    continue;
                }
                generated += 1;
            }
        }
    }

    info!(generated, "Catalog cache seeded");
    Ok(())
}

fn handset(brand: &str, model: &str, storage: &str, price_cents: i64, seed: usize) -> CachedProduct {
    let model_code: String = model
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase();

    CachedProduct {
        id: format!("{}-{}-{:03}", brand.to_uppercase(), model_code, seed),
        brand: brand.to_string(),
        model: model.to_string(),
        storage: Some(storage.to_string()),
        color: Some(COLORS[seed % COLORS.len()].to_string()),
        condition: Some(CONDITIONS[seed % CONDITIONS.len()].to_string()),
        // 15 digits, not a valid Luhn checksum
        identifier: Some(format!("35{:013}", 7_341_000_000u64 + seed as u64 * 7919)),
        price: Money::from_cents(price_cents.min(119_900)),
        status: ProductStatus::Available,
        updated_at: Utc::now(),
    }
}
