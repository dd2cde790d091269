//! Holder votes on property decisions, weighted by chips owned at cast time

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait, TryIntoModel,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::info;
use uuid::Uuid;

use crate::entity::{vote_options, vote_responses, votes};
use crate::error::{EstateError, Result};
use crate::{portfolio, properties};

#[derive(Debug, Clone, Deserialize)]
pub struct NewVote {
    pub property_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub ends_at: DateTime<Utc>,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteWithOptions {
    #[serde(flatten)]
    pub vote: votes::Model,
    pub options: Vec<vote_options::Model>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OptionTally {
    pub option_id: String,
    pub label: String,
    pub weight: i64,
    pub responses: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct VoteTally {
    pub vote_id: String,
    pub closed: bool,
    pub total_weight: i64,
    pub options: Vec<OptionTally>,
}

pub async fn create_vote<C>(
    db: &C,
    new: NewVote,
    created_by: &str,
    now: DateTime<Utc>,
) -> Result<VoteWithOptions>
where
    C: ConnectionTrait + TransactionTrait,
{
    let title = new.title.trim();
    if title.is_empty() {
        return Err(EstateError::Validation("title is required".to_string()));
    }
    if new.ends_at <= now {
        return Err(EstateError::Validation("ends_at must be in the future".to_string()));
    }

    let labels: Vec<String> = new
        .options
        .iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    let distinct: BTreeSet<&String> = labels.iter().collect();
    if labels.len() < 2 || distinct.len() != labels.len() {
        return Err(EstateError::Validation(
            "a vote needs at least two distinct options".to_string(),
        ));
    }

    properties::get_property(db, &new.property_id).await?;

    let txn = db.begin().await?;

    let vote = votes::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        property_id: Set(new.property_id.clone()),
        title: Set(title.to_string()),
        description: Set(new.description.clone()),
        ends_at: Set(new.ends_at),
        created_by: Set(created_by.to_string()),
        created_at: Set(now),
    }
    .insert(&txn)
    .await?;

    let mut options = Vec::with_capacity(labels.len());
    for (position, label) in labels.into_iter().enumerate() {
        let option = vote_options::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            vote_id: Set(vote.id.clone()),
            label: Set(label),
            position: Set(position as i32),
        }
        .insert(&txn)
        .await?;
        options.push(option);
    }

    txn.commit().await?;

    info!("Created vote {} on property {}", vote.id, vote.property_id);
    Ok(VoteWithOptions { vote, options })
}

async fn find_vote<C>(conn: &C, vote_id: &str) -> Result<votes::Model>
where
    C: ConnectionTrait,
{
    votes::Entity::find_by_id(vote_id.to_string())
        .one(conn)
        .await?
        .ok_or_else(|| EstateError::NotFound(format!("vote {}", vote_id)))
}

async fn find_options<C>(conn: &C, vote_id: &str) -> Result<Vec<vote_options::Model>>
where
    C: ConnectionTrait,
{
    Ok(vote_options::Entity::find()
        .filter(vote_options::Column::VoteId.eq(vote_id))
        .order_by_asc(vote_options::Column::Position)
        .all(conn)
        .await?)
}

/// Record or replace `user_id`'s choice. The weight is fixed at cast time.
pub async fn cast_vote<C>(
    conn: &C,
    vote_id: &str,
    user_id: &str,
    option_id: &str,
    now: DateTime<Utc>,
) -> Result<vote_responses::Model>
where
    C: ConnectionTrait,
{
    let vote = find_vote(conn, vote_id).await?;
    if now >= vote.ends_at {
        return Err(EstateError::VoteClosed(vote_id.to_string()));
    }

    let options = find_options(conn, vote_id).await?;
    if !options.iter().any(|o| o.id == option_id) {
        return Err(EstateError::Validation(format!(
            "option {} does not belong to vote {}",
            option_id, vote_id
        )));
    }

    let weight = portfolio::chips_owned_in_property(conn, user_id, &vote.property_id).await?;
    if weight == 0 {
        return Err(EstateError::Forbidden(
            "only chip holders of this property can vote".to_string(),
        ));
    }

    let row = vote_responses::ActiveModel {
        vote_id: Set(vote_id.to_string()),
        user_id: Set(user_id.to_string()),
        option_id: Set(option_id.to_string()),
        weight: Set(weight as i64),
        cast_at: Set(now),
    };
    vote_responses::Entity::insert(row.clone())
        .on_conflict(
            OnConflict::columns([vote_responses::Column::VoteId, vote_responses::Column::UserId])
                .update_columns([
                    vote_responses::Column::OptionId,
                    vote_responses::Column::Weight,
                    vote_responses::Column::CastAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

    info!(
        "User {} voted {} on {} with weight {}",
        user_id, option_id, vote_id, weight
    );
    Ok(row.try_into_model()?)
}

/// Sum of weights per option, in option order
pub async fn tally<C>(conn: &C, vote_id: &str, now: DateTime<Utc>) -> Result<VoteTally>
where
    C: ConnectionTrait,
{
    let vote = find_vote(conn, vote_id).await?;
    let options = find_options(conn, vote_id).await?;

    let responses = vote_responses::Entity::find()
        .filter(vote_responses::Column::VoteId.eq(vote_id))
        .all(conn)
        .await?;

    let mut per_option: HashMap<&str, (i64, u64)> = HashMap::new();
    for response in &responses {
        let entry = per_option.entry(response.option_id.as_str()).or_default();
        entry.0 += response.weight;
        entry.1 += 1;
    }

    let options: Vec<OptionTally> = options
        .into_iter()
        .map(|option| {
            let (weight, responses) = per_option
                .get(option.id.as_str())
                .copied()
                .unwrap_or_default();
            OptionTally {
                option_id: option.id,
                label: option.label,
                weight,
                responses,
            }
        })
        .collect();

    Ok(VoteTally {
        vote_id: vote.id,
        closed: now >= vote.ends_at,
        total_weight: options.iter().map(|o| o.weight).sum(),
        options,
    })
}
