mod common;

use common::{request, seed_property, service, setup};
use estate::assigner::{self, AssignmentRequest};
use estate::audit;
use estate::entity::{chip_ownerships, chip_purchase_transactions, chips, properties};
use estate::inventory;
use estate::properties::get_property;
use estate::{Database, EstateError};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};

async fn ledger_rows(db: &Database, payment_ref: &str) -> u64 {
    chip_purchase_transactions::Entity::find()
        .filter(chip_purchase_transactions::Column::ExternalPaymentRef.eq(payment_ref))
        .count(db.connection())
        .await
        .unwrap()
}

async fn ownership_rows(db: &Database, owner: &str) -> u64 {
    chip_ownerships::Entity::find()
        .filter(chip_ownerships::Column::OwnerId.eq(owner))
        .count(db.connection())
        .await
        .unwrap()
}

async fn set_counter(db: &Database, property: &properties::Model, available: i32) {
    let mut drifted: properties::ActiveModel = property.clone().into();
    drifted.available_chips = Set(available);
    drifted.update(db.connection()).await.unwrap();
}

fn assignment(
    chip_ids: Vec<String>,
    buyer: &str,
    property: &properties::Model,
    payment_ref: &str,
) -> AssignmentRequest {
    AssignmentRequest {
        quantity: chip_ids.len() as u32,
        chip_ids,
        buyer_id: buyer.to_string(),
        property_id: property.id.clone(),
        unit_price_cents: property.price_per_chip_cents,
        external_payment_ref: payment_ref.to_string(),
    }
}

#[tokio::test]
async fn test_stale_selection_is_rejected_and_rolled_back() {
    let db = setup().await;
    let property = seed_property(&db, "Sintra cottage", 4, 1500).await;

    // user-b selects, then user-a buys those same chips before user-b claims them
    let stale: Vec<String> = inventory::select_available(db.connection(), &property.id, 2)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    service(&db)
        .purchase(request("user-a", &property.id, 4, "PAY-WIN"))
        .await
        .unwrap();

    let txn = db.begin_transaction().await.unwrap();
    let err = assigner::assign(&txn, &assignment(stale, "user-b", &property, "PAY-LATE"))
        .await
        .unwrap_err();
    assert!(matches!(err, EstateError::ClaimConflict(_)));
    txn.rollback().await.unwrap();

    // the ledger row written before the claim is gone with the rollback
    assert_eq!(ledger_rows(&db, "PAY-LATE").await, 0);
    assert_eq!(ownership_rows(&db, "user-b").await, 0);

    let property = get_property(db.connection(), &property.id).await.unwrap();
    assert_eq!(property.available_chips, 0);
    let owned_by_a = chips::Entity::find()
        .filter(chips::Column::OwnerId.eq("user-a"))
        .count(db.connection())
        .await
        .unwrap();
    assert_eq!(owned_by_a, 4);
}

#[tokio::test]
async fn test_counter_guard_rejects_claim_and_releases_chips() {
    let db = setup().await;
    let property = seed_property(&db, "Evora farmhouse", 3, 2000).await;
    set_counter(&db, &property, 1).await;

    let selected: Vec<String> = inventory::select_available(db.connection(), &property.id, 2)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();

    let txn = db.begin_transaction().await.unwrap();
    let err = assigner::assign(&txn, &assignment(selected, "user-c", &property, "PAY-GUARD"))
        .await
        .unwrap_err();
    assert!(matches!(err, EstateError::ClaimConflict(ref d) if d.contains("below 2")));
    txn.rollback().await.unwrap();

    assert_eq!(
        inventory::count_available(db.connection(), &property.id)
            .await
            .unwrap(),
        3
    );
    assert_eq!(ledger_rows(&db, "PAY-GUARD").await, 0);
    assert_eq!(ownership_rows(&db, "user-c").await, 0);
    let property = get_property(db.connection(), &property.id).await.unwrap();
    assert_eq!(property.available_chips, 1);
}

#[tokio::test]
async fn test_persistent_conflict_exhausts_retries_and_is_audited() {
    let db = setup().await;
    let property = seed_property(&db, "Tavira villa", 10, 800).await;
    // live chips remain but the counter says fewer, so every attempt hits the guard
    set_counter(&db, &property, 1).await;

    let purchases = service(&db);
    let retries = purchases.limits().claim_retries;
    let err = purchases
        .purchase(request("user-d", &property.id, 3, "PAY-STUCK"))
        .await
        .unwrap_err();

    match err {
        EstateError::ClaimConflict(detail) => {
            assert!(detail.contains(&format!("gave up after {} attempts", retries)));
        }
        other => panic!("expected claim conflict, got {:?}", other),
    }

    assert_eq!(ledger_rows(&db, "PAY-STUCK").await, 0);
    assert_eq!(ownership_rows(&db, "user-d").await, 0);
    assert_eq!(
        inventory::count_available(db.connection(), &property.id)
            .await
            .unwrap(),
        10
    );

    let history = audit::history(db.connection(), audit::ENTITY_PURCHASE, "PAY-STUCK")
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].new_status, audit::STATUS_FAILED);
    assert_eq!(history[0].actor_id, "user-d");
}
