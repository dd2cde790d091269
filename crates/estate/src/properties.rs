//! Property onboarding, listing and available-counter reconciliation

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{self, StatusChange};
use crate::entity::{chips, properties};
use crate::error::{EstateError, Result};
use crate::inventory;

/// Upper bound on chips minted for one property
pub const MAX_CHIPS_PER_PROPERTY: u32 = 100_000;

const CHIP_INSERT_BATCH: usize = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct NewProperty {
    pub title: String,
    #[serde(default)]
    pub location: Option<String>,
    pub total_chips: u32,
    pub price_per_chip_cents: i64,
    /// Serial label prefix; derived from the property id when absent
    #[serde(default)]
    pub serial_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReconcileReport {
    pub property_id: String,
    pub recorded: i32,
    pub actual: i32,
    pub corrected: bool,
}

pub fn format_serial(prefix: &str, serial_number: u32) -> String {
    format!("{}-{:06}", prefix, serial_number)
}

/// Create a property and mint all of its chips, unowned, in one transaction
pub async fn create_property<C>(
    db: &C,
    new: NewProperty,
    actor_id: &str,
) -> Result<properties::Model>
where
    C: ConnectionTrait + TransactionTrait,
{
    let title = new.title.trim();
    if title.is_empty() {
        return Err(EstateError::Validation("title is required".to_string()));
    }
    if new.total_chips == 0 || new.total_chips > MAX_CHIPS_PER_PROPERTY {
        return Err(EstateError::Validation(format!(
            "total_chips must be between 1 and {}",
            MAX_CHIPS_PER_PROPERTY
        )));
    }
    if new.price_per_chip_cents < 1 {
        return Err(EstateError::Validation(
            "price_per_chip_cents must be positive".to_string(),
        ));
    }
    let total_value_cents = new
        .price_per_chip_cents
        .checked_mul(i64::from(new.total_chips))
        .ok_or_else(|| EstateError::Validation("property value overflows".to_string()))?;

    let property_id = Uuid::new_v4().to_string();
    let prefix = match new.serial_prefix.as_deref().map(str::trim) {
        Some(p) if !p.is_empty() => p.to_uppercase(),
        _ => format!("CE{}", property_id[..8].to_uppercase()),
    };
    let now = Utc::now();

    let txn = db.begin().await?;

    let property = properties::ActiveModel {
        id: Set(property_id.clone()),
        title: Set(title.to_string()),
        location: Set(new.location.clone()),
        total_chips: Set(new.total_chips as i32),
        available_chips: Set(new.total_chips as i32),
        price_per_chip_cents: Set(new.price_per_chip_cents),
        total_value_cents: Set(total_value_cents),
        is_active: Set(true),
        is_hidden: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&txn)
    .await?;

    let serial_numbers: Vec<u32> = (1..=new.total_chips).collect();
    for batch in serial_numbers.chunks(CHIP_INSERT_BATCH) {
        let rows = batch.iter().map(|n| chips::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            property_id: Set(property_id.clone()),
            serial_number: Set(*n as i32),
            serial: Set(format_serial(&prefix, *n)),
            owner_id: Set(None),
            assigned_at: Set(None),
            is_active: Set(true),
            is_hidden: Set(false),
            created_at: Set(now),
        });
        let inserted = chips::Entity::insert_many(rows)
            .exec_without_returning(&txn)
            .await
            .map_err(EstateError::from);

        if let Err(e) = inserted {
            txn.rollback().await?;
            if e.is_unique_violation() {
                return Err(EstateError::Validation(format!(
                    "serial prefix {} is already in use",
                    prefix
                )));
            }
            return Err(e);
        }
    }

    audit::log_status_change(
        &txn,
        StatusChange {
            entity_type: audit::ENTITY_PROPERTY,
            entity_id: &property_id,
            actor_id,
            action: "property_onboarded",
            old_status: None,
            new_status: "ACTIVE",
            detail: Some(json!({ "total_chips": new.total_chips, "serial_prefix": prefix })),
        },
    )
    .await?;

    txn.commit().await?;

    info!(
        "Onboarded property {} ({}) with {} chips",
        property.id, property.title, property.total_chips
    );
    Ok(property)
}

pub async fn get_property<C>(conn: &C, property_id: &str) -> Result<properties::Model>
where
    C: ConnectionTrait,
{
    properties::Entity::find_by_id(property_id.to_string())
        .one(conn)
        .await?
        .ok_or_else(|| EstateError::NotFound(format!("property {}", property_id)))
}

/// Active, visible properties, oldest first
pub async fn list_properties<C>(conn: &C) -> Result<Vec<properties::Model>>
where
    C: ConnectionTrait,
{
    Ok(properties::Entity::find()
        .filter(properties::Column::IsActive.eq(true))
        .filter(properties::Column::IsHidden.eq(false))
        .order_by_asc(properties::Column::CreatedAt)
        .all(conn)
        .await?)
}

/// Recount available chips and repair the cached counter when it drifted
pub async fn reconcile_available<C>(
    db: &C,
    property_id: &str,
    actor_id: &str,
) -> Result<ReconcileReport>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;

    let property = get_property(&txn, property_id).await?;
    let actual = inventory::count_available(&txn, property_id).await? as i32;
    let recorded = property.available_chips;

    if actual == recorded {
        txn.commit().await?;
        return Ok(ReconcileReport {
            property_id: property_id.to_string(),
            recorded,
            actual,
            corrected: false,
        });
    }

    warn!(
        "Available counter drift on property {}: recorded {}, actual {}",
        property_id, recorded, actual
    );

    let mut active: properties::ActiveModel = property.into();
    active.available_chips = Set(actual);
    active.updated_at = Set(Utc::now());
    active.update(&txn).await?;

    audit::log_status_change(
        &txn,
        StatusChange {
            entity_type: audit::ENTITY_PROPERTY,
            entity_id: property_id,
            actor_id,
            action: "available_reconciled",
            old_status: None,
            new_status: audit::STATUS_CORRECTED,
            detail: Some(json!({ "recorded": recorded, "actual": actual })),
        },
    )
    .await?;

    txn.commit().await?;

    Ok(ReconcileReport {
        property_id: property_id.to_string(),
        recorded,
        actual,
        corrected: true,
    })
}
