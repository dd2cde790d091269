//! chip_purchase_transactions entity
//! Immutable ledger entry for money received for a batch of chips

use sea_orm::entity::prelude::*;
use serde::Serialize;

pub const STATUS_COMPLETED: &str = "COMPLETED";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "chip_purchase_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub buyer_id: String,
    pub property_id: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub amount_cents: i64,
    #[sea_orm(unique)]
    pub external_payment_ref: String, // PayPal capture id, one checkout per ref
    pub status: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::properties::Entity",
        from = "Column::PropertyId",
        to = "super::properties::Column::Id",
        on_update = "Cascade",
        on_delete = "Restrict"
    )]
    Property,
}

impl Related<super::properties::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Property.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
