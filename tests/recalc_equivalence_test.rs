//! Delta and edit-scoped recalculation must always land where a full rebuild
//! from the ledger lands.

use async_trait::async_trait;
use positionledger::db::init_db;
use positionledger::domain::{
    Action, Decimal, NewTransaction, Position, SecurityCode, Side, TradeId, TransactionId,
};
use positionledger::store::PositionDiff;
use positionledger::{
    LedgerService, MemoryStore, PositionStore, Recalculator, Repository, ServiceError, StoreError,
    Stores,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn tx(trade: i64, version: u32, code: &str, qty: i64, action: Action, side: Side) -> NewTransaction {
    NewTransaction::new(
        TradeId::new(trade),
        version,
        SecurityCode::new(code),
        Decimal::from(qty),
        action,
        side,
    )
}

fn pos(code: &str, qty: i64) -> Position {
    Position::new(SecurityCode::new(code), Decimal::from(qty))
}

/// Rebuild from the same ledger into a fresh position store.
async fn full_rebuild_of(stores: &Stores) -> Vec<Position> {
    let mirror = Stores::in_memory();
    let rows = stores.ledger.find_all().await.unwrap();
    let batch: Vec<(TransactionId, NewTransaction)> = rows
        .iter()
        .map(|t| {
            (
                t.transaction_id,
                NewTransaction::new(
                    t.trade_id,
                    t.version,
                    t.security_code.clone(),
                    t.quantity,
                    t.action,
                    t.side,
                ),
            )
        })
        .collect();
    mirror.ledger.insert_batch(&batch).await.unwrap();
    Recalculator::new(mirror).recalculate_all().await.unwrap()
}

/// A sequence of submissions that exercises updates, cancels, trade moves
/// between securities and opposing sides.
fn mixed_sequence() -> Vec<NewTransaction> {
    vec![
        tx(1, 1, "REL", 50, Action::Insert, Side::Buy),
        tx(2, 1, "ITC", 40, Action::Insert, Side::Sell),
        tx(3, 1, "INF", 70, Action::Insert, Side::Buy),
        tx(1, 2, "TCS", 50, Action::Update, Side::Buy),
        tx(4, 1, "REL", 15, Action::Insert, Side::Sell),
        tx(2, 2, "ITC", 40, Action::Cancel, Side::Sell),
        tx(3, 2, "INF", 10, Action::Update, Side::Sell),
        tx(5, 1, "TCS", 5, Action::Insert, Side::Sell),
        tx(1, 3, "REL", 20, Action::Update, Side::Buy),
        tx(4, 2, "HDFC", 15, Action::Update, Side::Sell),
    ]
}

#[tokio::test]
async fn delta_after_each_submission_matches_full_rebuild() {
    let stores = Stores::in_memory();
    let service = LedgerService::new(stores.clone());

    for incoming in mixed_sequence() {
        let delta = service.submit_transaction(incoming).await.unwrap();
        assert_eq!(delta, full_rebuild_of(&stores).await);
    }

    assert_eq!(
        service.positions().await.unwrap(),
        vec![pos("HDFC", -15), pos("INF", -10), pos("REL", 20), pos("TCS", -5)]
    );
}

#[tokio::test]
async fn batch_delta_matches_full_rebuild_on_sqlite() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let stores = Stores::from_shared(Arc::new(Repository::new(pool)));
    let service = LedgerService::new(stores.clone());

    let sequence = mixed_sequence();
    let (first, second) = sequence.split_at(4);
    service.submit_batch(first.to_vec()).await.unwrap();
    let delta = service.submit_batch(second.to_vec()).await.unwrap();

    assert_eq!(delta, full_rebuild_of(&stores).await);
    assert_eq!(delta, service.force_full_recalculation().await.unwrap());
}

#[tokio::test]
async fn edits_match_full_rebuild() {
    let stores = Stores::in_memory();
    let service = LedgerService::new(stores.clone());
    for incoming in mixed_sequence() {
        service.submit_transaction(incoming).await.unwrap();
    }

    // Transaction 9 is trade 1 version 3 (latest). Move it to another trade
    // entirely: trade 1 falls back to version 2 on TCS.
    let moved = tx(5, 2, "INF", 100, Action::Update, Side::Buy)
        .with_transaction_id(TransactionId::new(9));
    let after_move = service.submit_transaction(moved).await.unwrap();
    assert_eq!(after_move, full_rebuild_of(&stores).await);

    // Transaction 10 is trade 4 version 2 (latest). Cancel it in place.
    let cancelled = tx(4, 2, "HDFC", 15, Action::Cancel, Side::Sell)
        .with_transaction_id(TransactionId::new(10));
    let after_cancel = service.submit_transaction(cancelled).await.unwrap();
    assert_eq!(after_cancel, full_rebuild_of(&stores).await);
    assert!(after_cancel
        .iter()
        .all(|p| p.security_code.as_str() != "HDFC"));
}

#[tokio::test]
async fn cancellation_dominates_regardless_of_position() {
    let service = LedgerService::new(Stores::in_memory());

    // Cancel recorded at version 1, a later version re-asserts the trade.
    service
        .submit_batch(vec![
            tx(7, 1, "REL", 25, Action::Cancel, Side::Buy),
            tx(7, 2, "REL", 25, Action::Update, Side::Buy),
            tx(8, 1, "REL", 5, Action::Insert, Side::Buy),
        ])
        .await
        .unwrap();

    assert_eq!(service.positions().await.unwrap(), vec![pos("REL", 5)]);
    assert_eq!(
        service.force_full_recalculation().await.unwrap(),
        vec![pos("REL", 5)]
    );
}

#[tokio::test]
async fn full_recalculation_is_idempotent() {
    let service = LedgerService::new(Stores::in_memory());
    service.load_sample_data().await.unwrap();

    let first = service.force_full_recalculation().await.unwrap();
    let state_first = service.processing_state().await.unwrap();
    let second = service.force_full_recalculation().await.unwrap();
    let state_second = service.processing_state().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(state_first, state_second);
}

#[tokio::test]
async fn concurrent_submissions_are_serialized() {
    let service = Arc::new(LedgerService::new(Stores::in_memory()));

    let mut handles = Vec::new();
    for trade in 1..=20 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service
                .submit_transaction(tx(trade, 1, "REL", 1, Action::Insert, Side::Buy))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(service.positions().await.unwrap(), vec![pos("REL", 20)]);
    let mut ids: Vec<i64> = service
        .transactions()
        .await
        .unwrap()
        .iter()
        .map(|v| v.transaction.transaction_id.as_i64())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=20).collect::<Vec<_>>());
}

/// Position store whose next `apply` calls fail on demand.
struct FlakyPositions {
    inner: Arc<MemoryStore>,
    failures_left: AtomicUsize,
}

impl FlakyPositions {
    fn fail_next_apply(&self) {
        self.failures_left.store(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PositionStore for FlakyPositions {
    async fn find_all(&self) -> Result<Vec<Position>, StoreError> {
        PositionStore::find_all(self.inner.as_ref()).await
    }

    async fn upsert(&self, position: &Position) -> Result<(), StoreError> {
        self.inner.upsert(position).await
    }

    async fn delete_by_code(&self, code: &SecurityCode) -> Result<(), StoreError> {
        self.inner.delete_by_code(code).await
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        PositionStore::delete_all(self.inner.as_ref()).await
    }

    async fn apply(&self, diff: &PositionDiff) -> Result<(), StoreError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("transient".to_string()));
        }
        self.inner.apply(diff).await
    }
}

fn stores_with_flaky_positions() -> (Stores, Arc<FlakyPositions>) {
    let memory = Arc::new(MemoryStore::new());
    let positions = Arc::new(FlakyPositions {
        inner: Arc::clone(&memory),
        failures_left: AtomicUsize::new(0),
    });
    let stores = Stores {
        ledger: memory.clone(),
        positions: positions.clone(),
        checkpoint: memory.clone(),
        reset: memory,
    };
    (stores, positions)
}

#[tokio::test]
async fn failed_position_write_leaves_checkpoint_in_place() {
    let (stores, positions) = stores_with_flaky_positions();
    let service = LedgerService::new(stores.clone());
    service
        .submit_transaction(tx(1, 1, "REL", 50, Action::Insert, Side::Buy))
        .await
        .unwrap();
    let before = service.processing_state().await.unwrap();

    positions.fail_next_apply();
    let err = service
        .submit_transaction(tx(2, 1, "INF", 10, Action::Insert, Side::Buy))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Storage(_)));
    assert_eq!(service.processing_state().await.unwrap(), before);
    assert_eq!(service.positions().await.unwrap(), vec![pos("REL", 50)]);

    // The stored row is still above the checkpoint, so the next delta folds it.
    let after = service
        .submit_transaction(tx(3, 1, "TCS", 5, Action::Insert, Side::Sell))
        .await
        .unwrap();
    assert_eq!(after, vec![pos("INF", 10), pos("REL", 50), pos("TCS", -5)]);
    assert_eq!(after, full_rebuild_of(&stores).await);
}

#[tokio::test]
async fn failed_edit_recalculation_restores_ledger_row() {
    let (stores, positions) = stores_with_flaky_positions();
    let service = LedgerService::new(stores.clone());
    service
        .submit_transaction(tx(1, 1, "REL", 50, Action::Insert, Side::Buy))
        .await
        .unwrap();
    let ledger_before = service.transactions().await.unwrap();

    let edit = tx(1, 1, "REL", 75, Action::Update, Side::Buy)
        .with_transaction_id(TransactionId::new(1));
    positions.fail_next_apply();
    let err = service.submit_transaction(edit.clone()).await.unwrap_err();
    assert!(matches!(err, ServiceError::Storage(_)));
    assert_eq!(service.transactions().await.unwrap(), ledger_before);
    assert_eq!(service.positions().await.unwrap(), vec![pos("REL", 50)]);

    service
        .submit_transaction(tx(2, 1, "INF", 10, Action::Insert, Side::Buy))
        .await
        .unwrap();
    assert_eq!(
        service.positions().await.unwrap(),
        full_rebuild_of(&stores).await
    );

    let retried = service.submit_transaction(edit).await.unwrap();
    assert_eq!(retried, vec![pos("INF", 10), pos("REL", 75)]);
    assert_eq!(retried, full_rebuild_of(&stores).await);
}
