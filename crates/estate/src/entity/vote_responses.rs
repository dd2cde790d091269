//! vote_responses entity
//! One response per (vote, user); re-casting overwrites the row

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "vote_responses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub vote_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    pub option_id: String,
    pub weight: i64, // chips held in the vote's property when cast
    pub cast_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::votes::Entity",
        from = "Column::VoteId",
        to = "super::votes::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Vote,
}

impl Related<super::votes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vote.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
