//! Per-user holdings, used by the dashboard, badge rules and vote weights

use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde::Serialize;
use std::collections::HashMap;

use crate::entity::{chip_purchase_transactions, chips, properties};
use crate::error::Result;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Holding {
    pub property_id: String,
    pub title: String,
    pub chips: u64,
    pub value_cents: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Portfolio {
    pub user_id: String,
    pub holdings: Vec<Holding>,
    pub total_chips: u64,
    pub total_value_cents: i64,
    pub total_invested_cents: i64,
    pub purchases: u64,
}

/// Chips owned by `user_id`, grouped by property id
pub async fn owned_chip_counts<C>(conn: &C, user_id: &str) -> Result<Vec<(String, u64)>>
where
    C: ConnectionTrait,
{
    let rows = chips::Entity::find()
        .select_only()
        .column(chips::Column::PropertyId)
        .column_as(Expr::col(chips::Column::Id).count(), "chip_count")
        .filter(chips::Column::OwnerId.eq(user_id))
        .group_by(chips::Column::PropertyId)
        .order_by_asc(chips::Column::PropertyId)
        .into_tuple::<(String, i64)>()
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(property_id, count)| (property_id, count.max(0) as u64))
        .collect())
}

/// Chips of one property owned by `user_id`
pub async fn chips_owned_in_property<C>(conn: &C, user_id: &str, property_id: &str) -> Result<u64>
where
    C: ConnectionTrait,
{
    Ok(chips::Entity::find()
        .filter(chips::Column::OwnerId.eq(user_id))
        .filter(chips::Column::PropertyId.eq(property_id))
        .count(conn)
        .await?)
}

pub async fn portfolio<C>(conn: &C, user_id: &str) -> Result<Portfolio>
where
    C: ConnectionTrait,
{
    let counts = owned_chip_counts(conn, user_id).await?;

    let property_ids: Vec<String> = counts.iter().map(|(id, _)| id.clone()).collect();
    let properties: HashMap<String, properties::Model> = if property_ids.is_empty() {
        HashMap::new()
    } else {
        properties::Entity::find()
            .filter(properties::Column::Id.is_in(property_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect()
    };

    let holdings: Vec<Holding> = counts
        .into_iter()
        .map(|(property_id, chips)| {
            let (title, price) = properties
                .get(&property_id)
                .map(|p| (p.title.clone(), p.price_per_chip_cents))
                .unwrap_or_default();
            Holding {
                property_id,
                title,
                chips,
                value_cents: price.saturating_mul(chips as i64),
            }
        })
        .collect();

    let transactions = chip_purchase_transactions::Entity::find()
        .filter(chip_purchase_transactions::Column::BuyerId.eq(user_id))
        .all(conn)
        .await?;

    Ok(Portfolio {
        user_id: user_id.to_string(),
        total_chips: holdings.iter().map(|h| h.chips).sum(),
        total_value_cents: holdings.iter().map(|h| h.value_cents).sum(),
        total_invested_cents: transactions.iter().map(|t| t.amount_cents).sum(),
        purchases: transactions.len() as u64,
        holdings,
    })
}
