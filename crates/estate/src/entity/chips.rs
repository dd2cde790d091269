//! chips entity
//! One indivisible fractional unit of a property

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "chips")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub property_id: String,
    pub serial_number: i32, // 1-based, unique within the property
    #[sea_orm(unique)]
    pub serial: String,
    pub owner_id: Option<String>,
    pub assigned_at: Option<DateTimeUtc>,
    pub is_active: bool,
    pub is_hidden: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::properties::Entity",
        from = "Column::PropertyId",
        to = "super::properties::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Property,
    #[sea_orm(has_many = "super::chip_ownerships::Entity")]
    Ownerships,
}

impl Related<super::properties::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Property.def()
    }
}

impl Related<super::chip_ownerships::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ownerships.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
