//! properties entity
//! Real-estate assets divided into a fixed number of chips

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "properties")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub title: String,
    pub location: Option<String>,
    pub total_chips: i32,
    pub available_chips: i32, // cached count of unowned, active, visible chips
    pub price_per_chip_cents: i64,
    pub total_value_cents: i64,
    pub is_active: bool,
    pub is_hidden: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::chips::Entity")]
    Chips,
    #[sea_orm(has_many = "super::votes::Entity")]
    Votes,
}

impl Related<super::chips::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chips.def()
    }
}

impl Related<super::votes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Votes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
