//! Ownership assignment: the write half of a chip purchase
//!
//! All four writes run on the transaction handed in by the caller, so either
//! every effect commits together or none is observable:
//!
//! 1. insert the purchase transaction record
//! 2. claim the chips with one conditional update (`owner_id IS NULL ...`)
//! 3. retire previous current ownership rows and append new ones
//! 4. decrement the property's available counter, guarded by `>= quantity`
//!
//! A short row count in steps 2 or 4 means a concurrent purchase won the race
//! and is reported as [`EstateError::ClaimConflict`]; the caller rolls back.

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{self, StatusChange};
use crate::entity::{chip_ownerships, chip_purchase_transactions, chips, properties};
use crate::error::{EstateError, Result};
use crate::inventory;

/// Inputs of one assignment
#[derive(Debug, Clone)]
pub struct AssignmentRequest {
    pub chip_ids: Vec<String>,
    pub buyer_id: String,
    pub property_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub external_payment_ref: String,
}

/// What a committed assignment produced
#[derive(Debug, Clone)]
pub struct AssignmentReceipt {
    pub transaction_id: String,
    pub amount_cents: i64,
    pub chip_ids: Vec<String>,
    pub assigned_at: DateTime<Utc>,
}

/// Run steps 1-4 (plus the audit row) on `txn`.
pub async fn assign<C>(txn: &C, request: &AssignmentRequest) -> Result<AssignmentReceipt>
where
    C: ConnectionTrait,
{
    let quantity = request.quantity;
    if quantity == 0 || request.chip_ids.len() != quantity as usize {
        return Err(EstateError::Validation(format!(
            "quantity {} does not match {} selected chips",
            quantity,
            request.chip_ids.len()
        )));
    }

    let amount_cents = i64::from(quantity)
        .checked_mul(request.unit_price_cents)
        .ok_or_else(|| EstateError::Validation("purchase amount overflows".to_string()))?;

    let now = Utc::now();
    let transaction_id = Uuid::new_v4().to_string();

    // Step 1: ledger entry
    let record = chip_purchase_transactions::ActiveModel {
        id: Set(transaction_id.clone()),
        buyer_id: Set(request.buyer_id.clone()),
        property_id: Set(request.property_id.clone()),
        quantity: Set(quantity as i32),
        unit_price_cents: Set(request.unit_price_cents),
        amount_cents: Set(amount_cents),
        external_payment_ref: Set(request.external_payment_ref.clone()),
        status: Set(chip_purchase_transactions::STATUS_COMPLETED.to_string()),
        created_at: Set(now),
    };
    chip_purchase_transactions::Entity::insert(record)
        .exec_without_returning(txn)
        .await?;
    debug!("Recorded transaction {} for {} cents", transaction_id, amount_cents);

    // Step 2: claim only chips that are still available
    let claimed = chips::Entity::update_many()
        .col_expr(chips::Column::OwnerId, Expr::value(request.buyer_id.clone()))
        .col_expr(chips::Column::AssignedAt, Expr::value(now))
        .filter(chips::Column::Id.is_in(request.chip_ids.clone()))
        .filter(inventory::available_condition(&request.property_id))
        .exec(txn)
        .await?;

    if claimed.rows_affected != u64::from(quantity) {
        return Err(EstateError::ClaimConflict(format!(
            "claimed {} of {} chips of property {}",
            claimed.rows_affected, quantity, request.property_id
        )));
    }

    // Step 3: ownership history, one current row per chip
    chip_ownerships::Entity::update_many()
        .col_expr(chip_ownerships::Column::IsCurrent, Expr::value(false))
        .filter(chip_ownerships::Column::ChipId.is_in(request.chip_ids.clone()))
        .filter(chip_ownerships::Column::IsCurrent.eq(true))
        .exec(txn)
        .await?;

    let log_rows = request
        .chip_ids
        .iter()
        .map(|chip_id| chip_ownerships::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            chip_id: Set(chip_id.clone()),
            owner_id: Set(request.buyer_id.clone()),
            property_id: Set(request.property_id.clone()),
            transaction_id: Set(Some(transaction_id.clone())),
            acquisition_method: Set(chip_ownerships::METHOD_PURCHASE.to_string()),
            is_current: Set(true),
            acquired_at: Set(now),
        })
        .collect::<Vec<_>>();
    chip_ownerships::Entity::insert_many(log_rows)
        .exec_without_returning(txn)
        .await?;

    // Step 4: counter decrement, never below zero
    let decremented = properties::Entity::update_many()
        .col_expr(
            properties::Column::AvailableChips,
            Expr::col(properties::Column::AvailableChips).sub(quantity as i32),
        )
        .col_expr(properties::Column::UpdatedAt, Expr::value(now))
        .filter(properties::Column::Id.eq(request.property_id.as_str()))
        .filter(properties::Column::AvailableChips.gte(quantity as i32))
        .exec(txn)
        .await?;

    if decremented.rows_affected != 1 {
        return Err(EstateError::ClaimConflict(format!(
            "available counter of property {} is below {}",
            request.property_id, quantity
        )));
    }

    audit::log_status_change(
        txn,
        StatusChange {
            entity_type: audit::ENTITY_PURCHASE,
            entity_id: &transaction_id,
            actor_id: &request.buyer_id,
            action: "chips_assigned",
            old_status: None,
            new_status: audit::STATUS_COMPLETED,
            detail: Some(json!({
                "property_id": request.property_id,
                "quantity": quantity,
                "amount_cents": amount_cents,
                "payment_ref": request.external_payment_ref,
            })),
        },
    )
    .await?;

    info!(
        "Assigned {} chips of property {} to {} (transaction {})",
        quantity, request.property_id, request.buyer_id, transaction_id
    );

    Ok(AssignmentReceipt {
        transaction_id,
        amount_cents,
        chip_ids: request.chip_ids.clone(),
        assigned_at: now,
    })
}
