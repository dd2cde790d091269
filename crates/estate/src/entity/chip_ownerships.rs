//! chip_ownerships entity
//! Append-only history of chip ownership transitions

use sea_orm::entity::prelude::*;

pub const METHOD_PURCHASE: &str = "purchase";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "chip_ownerships")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub chip_id: String,
    pub owner_id: String,
    pub property_id: String,
    pub transaction_id: Option<String>,
    pub acquisition_method: String,
    pub is_current: bool, // at most one current row per chip
    pub acquired_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::chips::Entity",
        from = "Column::ChipId",
        to = "super::chips::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Chip,
}

impl Related<super::chips::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chip.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
