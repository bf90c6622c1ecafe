//! Property-based tests for TransferEngine.
//!
//! - Property 1: Conservation of total balance
//! - Property 2: Balances never go negative
//! - Property 3: One ledger record per successful transfer

use std::sync::Arc;

use proptest::prelude::*;
use tally_shared::types::AccountId;

use super::engine::TransferEngine;
use super::error::LedgerError;
use super::memory::InMemoryLedgerStore;
use super::store::AccountStore;
use super::types::TransferRequest;

/// Strategy for opening balances of 2 to 6 accounts.
fn opening_balances() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..10_000, 2..6)
}

/// Strategy for a transfer between account indexes; amount may be invalid.
fn transfer_op() -> impl Strategy<Value = (usize, usize, i64)> {
    (0usize..6, 0usize..6, -50i64..5_000)
}

/// Outcome of replaying a batch of transfers.
struct Replay {
    before: i128,
    after: i128,
    balances: Vec<i64>,
    committed: usize,
    records: usize,
}

fn replay(balances: &[i64], ops: &[(usize, usize, i64)], concurrent: bool) -> Replay {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let store = Arc::new(InMemoryLedgerStore::new());
        let mut ids: Vec<AccountId> = Vec::new();
        for (i, balance) in balances.iter().enumerate() {
            ids.push(store.open_account(format!("acct-{i}"), *balance).await.id);
        }
        let before = store.total_balance().await;
        let engine = TransferEngine::new(Arc::clone(&store));

        let requests: Vec<TransferRequest> = ops
            .iter()
            .map(|&(from, to, amount)| TransferRequest {
                // Out-of-range indexes map to an account that does not exist.
                from_account_id: ids.get(from).copied().unwrap_or(AccountId::new(999)),
                to_account_id: ids.get(to).copied().unwrap_or(AccountId::new(998)),
                amount,
                category_id: None,
            })
            .collect();

        let results: Vec<Result<_, LedgerError>> = if concurrent {
            let handles: Vec<_> = requests
                .into_iter()
                .map(|request| {
                    let engine = engine.clone();
                    tokio::spawn(async move { engine.transfer(request).await })
                })
                .collect();
            let mut results = Vec::new();
            for joined in futures::future::join_all(handles).await {
                results.push(joined.unwrap());
            }
            results
        } else {
            let mut results = Vec::new();
            for request in requests {
                results.push(engine.transfer(request).await);
            }
            results
        };

        let mut after_balances = Vec::new();
        for id in &ids {
            after_balances.push(store.get_by_id(*id).await.unwrap().balance);
        }

        Replay {
            before,
            after: store.total_balance().await,
            balances: after_balances,
            committed: results.iter().filter(|r| r.is_ok()).count(),
            records: store.transfers().await.len(),
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property 1 and 2, sequential.
    ///
    /// *For any* sequence of transfer attempts, successful or not, the total
    /// balance is unchanged and no account is negative.
    #[test]
    fn prop_sequential_transfers_conserve_total(
        balances in opening_balances(),
        ops in prop::collection::vec(transfer_op(), 0..40),
    ) {
        let replay = replay(&balances, &ops, false);
        prop_assert_eq!(replay.before, replay.after);
        prop_assert!(replay.balances.iter().all(|b| *b >= 0));
        prop_assert_eq!(replay.committed, replay.records);
    }

    /// Property 1, 2 and 3 under concurrency.
    ///
    /// *For any* batch of transfers run in parallel, the same invariants hold
    /// and every successful transfer left exactly one record.
    #[test]
    fn prop_concurrent_transfers_conserve_total(
        balances in opening_balances(),
        ops in prop::collection::vec(transfer_op(), 1..40),
    ) {
        let replay = replay(&balances, &ops, true);
        prop_assert_eq!(replay.before, replay.after);
        prop_assert!(replay.balances.iter().all(|b| *b >= 0));
        prop_assert_eq!(replay.committed, replay.records);
    }
}
