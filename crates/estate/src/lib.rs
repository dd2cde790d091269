//! ChipEstate purchase service
//!
//! Turns confirmed payments into owned property chips. A purchase selects
//! unowned chips, claims them with a conditional update, appends ownership
//! history and decrements the property's available counter, all inside one
//! transaction. Badges are awarded after the commit and chip holders can vote
//! on property decisions, weighted by the chips they hold.

pub mod assigner;
pub mod audit;
pub mod auth;
pub mod badges;
pub mod config;
pub mod database;
pub mod entity;
pub mod error;
pub mod inventory;
pub mod portfolio;
pub mod properties;
pub mod purchase;
pub mod routes;
pub mod service;
pub mod votes;

pub use config::{PurchaseLimits, ServiceConfig};
pub use database::{Database, DatabaseSettings};
pub use error::{EstateError, Result};
pub use purchase::{PurchaseOutcome, PurchaseRequest, PurchaseService};
pub use service::EstateServiceRunner;
