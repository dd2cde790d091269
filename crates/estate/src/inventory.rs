//! Inventory selection: which unowned chips a purchase will receive

use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use tracing::debug;

use crate::entity::chips;
use crate::error::{EstateError, Result};

/// Chips of a property that can be sold: no owner, active, not hidden
pub fn available_condition(property_id: &str) -> Condition {
    Condition::all()
        .add(chips::Column::PropertyId.eq(property_id))
        .add(chips::Column::OwnerId.is_null())
        .add(chips::Column::IsActive.eq(true))
        .add(chips::Column::IsHidden.eq(false))
}

/// Pick exactly `quantity` available chips, lowest serial first.
///
/// Read-only. The caller claims the returned chips with a conditional update,
/// so a stale selection is detected rather than double-sold.
pub async fn select_available<C>(
    conn: &C,
    property_id: &str,
    quantity: u32,
) -> Result<Vec<chips::Model>>
where
    C: ConnectionTrait,
{
    if quantity == 0 {
        return Err(EstateError::Validation(
            "quantity must be at least 1".to_string(),
        ));
    }

    let selected = chips::Entity::find()
        .filter(available_condition(property_id))
        .order_by_asc(chips::Column::SerialNumber)
        .limit(u64::from(quantity))
        .all(conn)
        .await?;

    if selected.len() < quantity as usize {
        return Err(EstateError::InsufficientInventory {
            requested: quantity,
            available: selected.len() as u32,
        });
    }

    debug!(
        "Selected {} chips of property {} (serials {}..={})",
        selected.len(),
        property_id,
        selected.first().map(|c| c.serial.as_str()).unwrap_or(""),
        selected.last().map(|c| c.serial.as_str()).unwrap_or("")
    );

    Ok(selected)
}

/// Live count of available chips of a property
pub async fn count_available<C>(conn: &C, property_id: &str) -> Result<u64>
where
    C: ConnectionTrait,
{
    Ok(chips::Entity::find()
        .filter(available_condition(property_id))
        .count(conn)
        .await?)
}
