//! Status-change audit trail

use chrono::Utc;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::entity::audit_log;
use crate::error::Result;

pub const ENTITY_PURCHASE: &str = "purchase";
pub const ENTITY_PROPERTY: &str = "property";

pub const STATUS_COMPLETED: &str = "COMPLETED";
pub const STATUS_FAILED: &str = "FAILED";
pub const STATUS_RECONCILE: &str = "RECONCILE";
pub const STATUS_CORRECTED: &str = "CORRECTED";

/// A single status transition
#[derive(Debug, Clone)]
pub struct StatusChange<'a> {
    pub entity_type: &'a str,
    pub entity_id: &'a str,
    pub actor_id: &'a str,
    pub action: &'a str,
    pub old_status: Option<&'a str>,
    pub new_status: &'a str,
    pub detail: Option<Value>,
}

/// Append an audit row. Runs on whatever connection or transaction it is given.
pub async fn log_status_change<C>(conn: &C, change: StatusChange<'_>) -> Result<()>
where
    C: ConnectionTrait,
{
    let row = audit_log::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        entity_type: Set(change.entity_type.to_string()),
        entity_id: Set(change.entity_id.to_string()),
        actor_id: Set(change.actor_id.to_string()),
        action: Set(change.action.to_string()),
        old_status: Set(change.old_status.map(str::to_string)),
        new_status: Set(change.new_status.to_string()),
        detail: Set(change.detail),
        created_at: Set(Utc::now()),
    };
    audit_log::Entity::insert(row).exec_without_returning(conn).await?;

    info!(
        entity_type = change.entity_type,
        entity_id = change.entity_id,
        actor = change.actor_id,
        "{}: {} -> {}",
        change.action,
        change.old_status.unwrap_or("none"),
        change.new_status
    );
    Ok(())
}

/// Audit history of one entity, oldest first
pub async fn history<C>(
    conn: &C,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<audit_log::Model>>
where
    C: ConnectionTrait,
{
    Ok(audit_log::Entity::find()
        .filter(audit_log::Column::EntityType.eq(entity_type))
        .filter(audit_log::Column::EntityId.eq(entity_id))
        .order_by_asc(audit_log::Column::CreatedAt)
        .all(conn)
        .await?)
}
