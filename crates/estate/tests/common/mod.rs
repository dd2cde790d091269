#![allow(dead_code)]

use estate::entity::properties;
use estate::properties::{create_property, NewProperty};
use estate::{
    badges, Database, DatabaseSettings, PurchaseLimits, PurchaseRequest, PurchaseService,
};

/// Fresh in-memory database with schema and badge catalog
pub async fn setup() -> Database {
    let db = Database::connect(&DatabaseSettings::in_memory())
        .await
        .expect("in-memory database");
    db.ensure_schema().await.expect("schema");
    badges::ensure_default_catalog(db.connection())
        .await
        .expect("badge catalog");
    db
}

pub async fn seed_property(
    db: &Database,
    title: &str,
    total_chips: u32,
    price_per_chip_cents: i64,
) -> properties::Model {
    create_property(
        db.connection(),
        NewProperty {
            title: title.to_string(),
            location: Some("Lisbon".to_string()),
            total_chips,
            price_per_chip_cents,
            serial_prefix: None,
        },
        "admin-1",
    )
    .await
    .expect("seed property")
}

pub fn service(db: &Database) -> PurchaseService {
    PurchaseService::new(db.clone(), PurchaseLimits::default())
}

pub fn request(
    buyer: &str,
    property_id: &str,
    quantity: u32,
    payment_ref: &str,
) -> PurchaseRequest {
    PurchaseRequest {
        buyer_id: buyer.to_string(),
        property_id: property_id.to_string(),
        quantity,
        external_payment_ref: payment_ref.to_string(),
    }
}
