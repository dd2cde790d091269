//! Badge rules and awarding
//!
//! Rules are pure predicates over a [`HoldingsSnapshot`]. Evaluation runs to a
//! fixpoint so badges earned in one pass count toward collector tiers and the
//! master badge in the next. Awarding inserts with `ON CONFLICT DO NOTHING` on
//! the `(user_id, badge_key)` primary key, so re-running it, or running it from
//! two purchases at once, never duplicates a badge.

use chrono::Utc;
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::entity::{badges_catalog, user_badges};
use crate::error::Result;
use crate::portfolio;

pub const MASTER_KEY: &str = "badge_master";

/// Milestones a user can reach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeRule {
    /// Owns at least one chip
    FirstPurchase,
    /// Owns chips across at least this many distinct properties
    Diversifier(u32),
    /// Owns at least this many chips in total
    Whale(u64),
    /// Holds at least this many distinct badges
    CollectorTier(u32),
    /// Holds every other badge in the catalog
    Master,
}

/// The rule set evaluated after every assignment
pub const DEFAULT_RULES: [BadgeRule; 7] = [
    BadgeRule::FirstPurchase,
    BadgeRule::Diversifier(3),
    BadgeRule::Whale(100),
    BadgeRule::CollectorTier(3),
    BadgeRule::CollectorTier(5),
    BadgeRule::CollectorTier(10),
    BadgeRule::Master,
];

impl BadgeRule {
    pub fn key(&self) -> String {
        match self {
            BadgeRule::FirstPurchase => "first_purchase".to_string(),
            BadgeRule::Diversifier(_) => "diversifier".to_string(),
            BadgeRule::Whale(_) => "whale".to_string(),
            BadgeRule::CollectorTier(n) => format!("badge_collector_{}", n),
            BadgeRule::Master => MASTER_KEY.to_string(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            BadgeRule::FirstPurchase => "First Purchase".to_string(),
            BadgeRule::Diversifier(_) => "Diversifier".to_string(),
            BadgeRule::Whale(_) => "Whale".to_string(),
            BadgeRule::CollectorTier(n) => format!("Badge Collector ({})", n),
            BadgeRule::Master => "Badge Master".to_string(),
        }
    }

    pub fn description(&self) -> String {
        match self {
            BadgeRule::FirstPurchase => "Bought your first chip".to_string(),
            BadgeRule::Diversifier(n) => format!("Own chips in {} or more properties", n),
            BadgeRule::Whale(t) => format!("Own {} or more chips", t),
            BadgeRule::CollectorTier(n) => format!("Earned {} badges", n),
            BadgeRule::Master => "Earned every badge".to_string(),
        }
    }

    pub fn is_met(&self, snapshot: &HoldingsSnapshot) -> bool {
        match *self {
            BadgeRule::FirstPurchase => snapshot.total_chips >= 1,
            BadgeRule::Diversifier(n) => snapshot.distinct_properties >= n,
            BadgeRule::Whale(threshold) => snapshot.total_chips >= threshold,
            BadgeRule::CollectorTier(n) => snapshot.held_badges.len() >= n as usize,
            BadgeRule::Master => {
                let mut required = snapshot
                    .catalog
                    .iter()
                    .filter(|key| key.as_str() != MASTER_KEY)
                    .peekable();
                required.peek().is_some()
                    && required.all(|key| snapshot.held_badges.contains(key))
            }
        }
    }
}

/// What a user owns and holds at evaluation time
#[derive(Debug, Clone, Default)]
pub struct HoldingsSnapshot {
    pub total_chips: u64,
    pub distinct_properties: u32,
    pub held_badges: BTreeSet<String>,
    pub catalog: BTreeSet<String>,
}

impl HoldingsSnapshot {
    pub async fn load<C>(conn: &C, user_id: &str) -> Result<Self>
    where
        C: ConnectionTrait,
    {
        let holdings = portfolio::owned_chip_counts(conn, user_id).await?;
        let total_chips = holdings.iter().map(|(_, count)| *count).sum();

        let held_badges = user_badges::Entity::find()
            .select_only()
            .column(user_badges::Column::BadgeKey)
            .filter(user_badges::Column::UserId.eq(user_id))
            .into_tuple::<String>()
            .all(conn)
            .await?
            .into_iter()
            .collect();

        let catalog = badges_catalog::Entity::find()
            .select_only()
            .column(badges_catalog::Column::BadgeKey)
            .into_tuple::<String>()
            .all(conn)
            .await?
            .into_iter()
            .collect();

        Ok(Self {
            total_chips,
            distinct_properties: holdings.len() as u32,
            held_badges,
            catalog,
        })
    }
}

/// Rules newly satisfied by `snapshot`, in award order.
pub fn evaluate(rules: &[BadgeRule], snapshot: &HoldingsSnapshot) -> Vec<BadgeRule> {
    let mut working = snapshot.clone();
    let mut awarded = Vec::new();

    loop {
        let mut progressed = false;
        for rule in rules {
            let key = rule.key();
            if working.held_badges.contains(&key) {
                continue;
            }
            if rule.is_met(&working) {
                working.held_badges.insert(key);
                awarded.push(*rule);
                progressed = true;
            }
        }
        if !progressed {
            return awarded;
        }
    }
}

/// Evaluate the default rules for `user_id` and insert the badges earned.
///
/// Returns the keys actually inserted by this call.
pub async fn evaluate_and_award<C>(conn: &C, user_id: &str) -> Result<Vec<String>>
where
    C: ConnectionTrait,
{
    let snapshot = HoldingsSnapshot::load(conn, user_id).await?;
    let earned = evaluate(&DEFAULT_RULES, &snapshot);
    if earned.is_empty() {
        debug!("No new badges for {}", user_id);
        return Ok(Vec::new());
    }

    let now = Utc::now();
    let mut inserted = Vec::new();
    for rule in earned {
        let key = rule.key();
        let row = user_badges::ActiveModel {
            user_id: Set(user_id.to_string()),
            badge_key: Set(key.clone()),
            awarded_at: Set(now),
        };
        let rows = user_badges::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([user_badges::Column::UserId, user_badges::Column::BadgeKey])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        if rows > 0 {
            info!("Awarded badge {} to {}", key, user_id);
            inserted.push(key);
        }
    }

    Ok(inserted)
}

/// Seed the catalog with the badges of [`DEFAULT_RULES`]
pub async fn ensure_default_catalog<C>(conn: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    for rule in DEFAULT_RULES {
        let row = badges_catalog::ActiveModel {
            badge_key: Set(rule.key()),
            name: Set(rule.name()),
            description: Set(rule.description()),
            created_at: Set(now),
        };
        badges_catalog::Entity::insert(row)
            .on_conflict(
                OnConflict::column(badges_catalog::Column::BadgeKey)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
    }
    Ok(())
}

pub async fn list_user_badges<C>(conn: &C, user_id: &str) -> Result<Vec<user_badges::Model>>
where
    C: ConnectionTrait,
{
    Ok(user_badges::Entity::find()
        .filter(user_badges::Column::UserId.eq(user_id))
        .order_by_asc(user_badges::Column::AwardedAt)
        .order_by_asc(user_badges::Column::BadgeKey)
        .all(conn)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> BTreeSet<String> {
        DEFAULT_RULES.iter().map(|r| r.key()).collect()
    }

    fn keys(rules: &[BadgeRule]) -> Vec<String> {
        rules.iter().map(|r| r.key()).collect()
    }

    #[test]
    fn test_no_holdings_no_badges() {
        let snapshot = HoldingsSnapshot {
            catalog: catalog(),
            ..Default::default()
        };
        assert!(evaluate(&DEFAULT_RULES, &snapshot).is_empty());
    }

    #[test]
    fn test_first_purchase_only() {
        let snapshot = HoldingsSnapshot {
            total_chips: 3,
            distinct_properties: 1,
            catalog: catalog(),
            ..Default::default()
        };
        assert_eq!(keys(&evaluate(&DEFAULT_RULES, &snapshot)), vec!["first_purchase"]);
    }

    #[test]
    fn test_three_badges_cascade_into_collector_tier() {
        let snapshot = HoldingsSnapshot {
            total_chips: 120,
            distinct_properties: 3,
            catalog: catalog(),
            ..Default::default()
        };
        let awarded = keys(&evaluate(&DEFAULT_RULES, &snapshot));
        assert_eq!(
            awarded,
            vec!["first_purchase", "diversifier", "whale", "badge_collector_3"]
        );
    }

    #[test]
    fn test_held_badges_are_not_reawarded() {
        let snapshot = HoldingsSnapshot {
            total_chips: 150,
            distinct_properties: 1,
            held_badges: ["first_purchase", "whale"].iter().map(|s| s.to_string()).collect(),
            catalog: catalog(),
        };
        assert!(evaluate(&DEFAULT_RULES, &snapshot).is_empty());
    }

    #[test]
    fn test_master_requires_every_other_catalog_badge() {
        let mut held: BTreeSet<String> = catalog();
        held.remove(MASTER_KEY);
        held.remove("badge_collector_10");

        let snapshot = HoldingsSnapshot {
            total_chips: 500,
            distinct_properties: 5,
            held_badges: held.clone(),
            catalog: catalog(),
        };
        // Only five held, so the 10-tier stays locked and master with it
        assert!(!BadgeRule::Master.is_met(&snapshot));

        held.insert("badge_collector_10".to_string());
        let snapshot = HoldingsSnapshot {
            held_badges: held,
            ..snapshot
        };
        assert_eq!(keys(&evaluate(&DEFAULT_RULES, &snapshot)), vec![MASTER_KEY]);
    }

    #[test]
    fn test_master_never_met_with_empty_catalog() {
        let snapshot = HoldingsSnapshot {
            total_chips: 1,
            ..Default::default()
        };
        assert!(!BadgeRule::Master.is_met(&snapshot));
    }

    #[test]
    fn test_rule_keys_are_distinct() {
        let keys = catalog();
        assert_eq!(keys.len(), DEFAULT_RULES.len());
    }
}
