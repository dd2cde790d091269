//! Sea-ORM entities for the purchase, ownership, badge and vote tables

pub mod audit_log;
pub mod badges_catalog;
pub mod chip_ownerships;
pub mod chip_purchase_transactions;
pub mod chips;
pub mod properties;
pub mod user_badges;
pub mod vote_options;
pub mod vote_responses;
pub mod votes;

// Re-export entities for convenience
pub use audit_log::Entity as AuditLog;
pub use badges_catalog::Entity as BadgesCatalog;
pub use chip_ownerships::Entity as ChipOwnerships;
pub use chip_purchase_transactions::Entity as ChipPurchaseTransactions;
pub use chips::Entity as Chips;
pub use properties::Entity as Properties;
pub use user_badges::Entity as UserBadges;
pub use vote_options::Entity as VoteOptions;
pub use vote_responses::Entity as VoteResponses;
pub use votes::Entity as Votes;
