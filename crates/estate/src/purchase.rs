//! Purchase orchestration: validate, select, assign and commit with retries

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::assigner::{self, AssignmentReceipt, AssignmentRequest};
use crate::audit::{self, StatusChange};
use crate::config::PurchaseLimits;
use crate::database::Database;
use crate::entity::{chip_purchase_transactions, properties as property_entity};
use crate::error::{EstateError, Result};
use crate::{badges, inventory, properties};

/// Linear backoff unit between claim attempts
const CLAIM_RETRY_BACKOFF: Duration = Duration::from_millis(50);

const MAX_PAYMENT_REF_LEN: usize = 128;

/// A confirmed payment asking for `quantity` chips of one property
#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    pub buyer_id: String,
    pub property_id: String,
    pub quantity: u32,
    pub external_payment_ref: String,
}

impl PurchaseRequest {
    /// Same request with surrounding whitespace stripped from every id
    pub fn normalized(self) -> Self {
        Self {
            buyer_id: self.buyer_id.trim().to_string(),
            property_id: self.property_id.trim().to_string(),
            quantity: self.quantity,
            external_payment_ref: self.external_payment_ref.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PurchaseOutcome {
    pub transaction_id: String,
    pub property_id: String,
    pub buyer_id: String,
    pub quantity: u32,
    pub amount_cents: i64,
    pub chip_serials: Vec<String>,
    pub badges_awarded: Vec<String>,
}

struct Committed {
    receipt: AssignmentReceipt,
    serials: Vec<String>,
}

#[derive(Clone)]
pub struct PurchaseService {
    db: Database,
    limits: PurchaseLimits,
}

impl PurchaseService {
    pub fn new(db: Database, limits: PurchaseLimits) -> Self {
        Self { db, limits }
    }

    pub fn limits(&self) -> PurchaseLimits {
        self.limits
    }

    /// Turn a confirmed payment into owned chips.
    ///
    /// Either every chip is assigned and the counter decremented, or nothing
    /// changes. Badges are evaluated after the commit and never fail the call.
    pub async fn purchase(&self, request: PurchaseRequest) -> Result<PurchaseOutcome> {
        let started = Instant::now();
        // dedup, storage and audit all see the trimmed payment ref
        let request = request.normalized();
        let result = self.execute(&request).await;

        let (outcome, chips) = match &result {
            Ok(o) => ("success", o.quantity),
            Err(e) => (e.code(), 0),
        };
        monitoring::record_purchase(outcome, chips, started.elapsed().as_secs_f64());

        result
    }

    /// Checkout on behalf of `request.buyer_id`; only that user or an admin may call it
    pub async fn assign_chips(
        &self,
        caller_id: &str,
        caller_is_admin: bool,
        request: PurchaseRequest,
    ) -> Result<PurchaseOutcome> {
        if caller_id != request.buyer_id && !caller_is_admin {
            return Err(EstateError::Forbidden(
                "chips can only be assigned to the caller".to_string(),
            ));
        }
        self.purchase(request).await
    }

    async fn execute(&self, request: &PurchaseRequest) -> Result<PurchaseOutcome> {
        validate(request, &self.limits)?;
        let conn = self.db.connection();

        let property = properties::get_property(conn, &request.property_id).await?;
        if !property.is_active || property.is_hidden {
            return Err(EstateError::NotFound(format!(
                "property {}",
                request.property_id
            )));
        }

        if payment_ref_exists(conn, &request.external_payment_ref).await? {
            return Err(EstateError::DuplicatePayment(
                request.external_payment_ref.clone(),
            ));
        }

        let committed = match self.claim_with_retries(request, &property).await {
            Ok(c) => c,
            Err(e) => {
                self.record_failure(request, &e).await;
                return Err(e);
            }
        };

        let badges_awarded = match badges::evaluate_and_award(conn, &request.buyer_id).await {
            Ok(keys) => {
                monitoring::record_badges_awarded(keys.len());
                keys
            }
            Err(e) => {
                warn!(
                    "Badge evaluation failed for {} after transaction {}: {}",
                    request.buyer_id, committed.receipt.transaction_id, e
                );
                Vec::new()
            }
        };

        Ok(PurchaseOutcome {
            transaction_id: committed.receipt.transaction_id,
            property_id: request.property_id.clone(),
            buyer_id: request.buyer_id.clone(),
            quantity: request.quantity,
            amount_cents: committed.receipt.amount_cents,
            chip_serials: committed.serials,
            badges_awarded,
        })
    }

    async fn claim_with_retries(
        &self,
        request: &PurchaseRequest,
        property: &property_entity::Model,
    ) -> Result<Committed> {
        retry_on_claim_conflict(
            &request.external_payment_ref,
            self.limits.claim_retries,
            CLAIM_RETRY_BACKOFF,
            move |_| self.attempt(request, property),
        )
        .await
    }

    /// One transaction: select, assign, commit
    async fn attempt(
        &self,
        request: &PurchaseRequest,
        property: &property_entity::Model,
    ) -> Result<Committed> {
        let txn = self.db.begin_transaction().await?;

        match select_and_assign(&txn, request, property).await {
            Ok(committed) => {
                txn.commit().await.map_err(|e| {
                    error!(
                        "Commit failed for payment {}: {}",
                        request.external_payment_ref, e
                    );
                    EstateError::PartialFailure {
                        payment_ref: request.external_payment_ref.clone(),
                        detail: format!("commit outcome unknown: {}", e),
                    }
                })?;
                Ok(committed)
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!(
                        "Rollback failed for payment {} after {}: {}",
                        request.external_payment_ref, e, rollback_err
                    );
                    return Err(EstateError::PartialFailure {
                        payment_ref: request.external_payment_ref.clone(),
                        detail: format!("rollback failed after {}: {}", e, rollback_err),
                    });
                }
                debug!("Rolled back payment {}: {}", request.external_payment_ref, e);

                if e.is_unique_violation() {
                    return Err(EstateError::DuplicatePayment(
                        request.external_payment_ref.clone(),
                    ));
                }
                Err(e)
            }
        }
    }

    async fn record_failure(&self, request: &PurchaseRequest, failure: &EstateError) {
        let new_status = match failure {
            EstateError::PartialFailure { .. } => audit::STATUS_RECONCILE,
            // rejected before anything was written
            EstateError::Validation(_)
            | EstateError::NotFound(_)
            | EstateError::DuplicatePayment(_) => return,
            _ => audit::STATUS_FAILED,
        };

        let logged = audit::log_status_change(
            self.db.connection(),
            StatusChange {
                entity_type: audit::ENTITY_PURCHASE,
                entity_id: &request.external_payment_ref,
                actor_id: &request.buyer_id,
                action: "purchase_failed",
                old_status: None,
                new_status,
                detail: Some(json!({
                    "property_id": request.property_id,
                    "quantity": request.quantity,
                    "error": failure.code(),
                    "reason": failure.to_string(),
                })),
            },
        )
        .await;

        if let Err(e) = logged {
            error!(
                "Failed to audit failed purchase for payment {}: {}",
                request.external_payment_ref, e
            );
        }
    }
}

/// Run `op` until it stops failing with `ClaimConflict` or `max_attempts` is reached.
/// The pause before attempt `n + 1` is `backoff * n`.
async fn retry_on_claim_conflict<T, F, Fut>(
    payment_ref: &str,
    max_attempts: u32,
    backoff: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match op(attempt).await {
            Err(EstateError::ClaimConflict(detail)) if attempt < max_attempts => {
                warn!(
                    "Chip claim conflict for payment {}, retrying ({}/{}): {}",
                    payment_ref, attempt, max_attempts, detail
                );
                tokio::time::sleep(backoff * attempt).await;
            }
            Err(EstateError::ClaimConflict(detail)) => {
                return Err(EstateError::ClaimConflict(format!(
                    "{} (gave up after {} attempts)",
                    detail, attempt
                )));
            }
            other => return other,
        }
    }
}

fn validate(request: &PurchaseRequest, limits: &PurchaseLimits) -> Result<()> {
    if request.buyer_id.trim().is_empty() {
        return Err(EstateError::Validation("buyer id is required".to_string()));
    }
    if request.property_id.trim().is_empty() {
        return Err(EstateError::Validation("property_id is required".to_string()));
    }
    if request.quantity == 0 || request.quantity > limits.max_chips_per_purchase {
        return Err(EstateError::Validation(format!(
            "quantity must be between 1 and {}",
            limits.max_chips_per_purchase
        )));
    }
    let payment_ref = request.external_payment_ref.as_str();
    if payment_ref.is_empty() {
        return Err(EstateError::Validation(
            "payment transaction id is required".to_string(),
        ));
    }
    if payment_ref.len() > MAX_PAYMENT_REF_LEN {
        return Err(EstateError::Validation(format!(
            "payment transaction id exceeds {} characters",
            MAX_PAYMENT_REF_LEN
        )));
    }
    Ok(())
}

async fn payment_ref_exists<C>(conn: &C, payment_ref: &str) -> Result<bool>
where
    C: ConnectionTrait,
{
    let count = chip_purchase_transactions::Entity::find()
        .filter(chip_purchase_transactions::Column::ExternalPaymentRef.eq(payment_ref))
        .count(conn)
        .await?;
    Ok(count > 0)
}

async fn select_and_assign<C>(
    txn: &C,
    request: &PurchaseRequest,
    property: &property_entity::Model,
) -> Result<Committed>
where
    C: ConnectionTrait,
{
    let selected =
        inventory::select_available(txn, &request.property_id, request.quantity).await?;

    let (chip_ids, serials): (Vec<String>, Vec<String>) =
        selected.into_iter().map(|c| (c.id, c.serial)).unzip();

    let receipt = assigner::assign(
        txn,
        &AssignmentRequest {
            chip_ids,
            buyer_id: request.buyer_id.clone(),
            property_id: request.property_id.clone(),
            quantity: request.quantity,
            unit_price_cents: property.price_per_chip_cents,
            external_payment_ref: request.external_payment_ref.clone(),
        },
    )
    .await?;

    info!(
        "Purchase of {} chips by {} staged as transaction {}",
        request.quantity, request.buyer_id, receipt.transaction_id
    );
    Ok(Committed { receipt, serials })
}
