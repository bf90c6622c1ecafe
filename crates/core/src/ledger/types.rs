//! Ledger domain types.
//!
//! Amounts are `i64` in the smallest currency unit. Balances never go below
//! zero and transfer amounts are always positive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_shared::types::{AccountId, CategoryId, TransferId};

/// An account as seen by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account ID.
    pub id: AccountId,
    /// Display label.
    pub name: String,
    /// Current balance in minor units.
    pub balance: i64,
}

/// An immutable ledger entry recording one successful transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Store-assigned, strictly increasing ID.
    pub id: TransferId,
    /// Optional classification.
    pub category_id: Option<CategoryId>,
    /// Debited account.
    pub from_account_id: AccountId,
    /// Credited account.
    pub to_account_id: AccountId,
    /// Amount moved, always positive.
    pub amount: i64,
    /// When the transfer was recorded.
    pub created_at: DateTime<Utc>,
}

impl TransferRecord {
    /// Returns true if the account is either side of this transfer.
    #[must_use]
    pub fn involves(&self, account_id: AccountId) -> bool {
        self.from_account_id == account_id || self.to_account_id == account_id
    }
}

/// A ledger entry about to be appended.
///
/// The store assigns the ID, and the timestamp when `created_at` is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransfer {
    /// Optional classification.
    pub category_id: Option<CategoryId>,
    /// Debited account.
    pub from_account_id: AccountId,
    /// Credited account.
    pub to_account_id: AccountId,
    /// Amount moved.
    pub amount: i64,
    /// Explicit timestamp, used by imports and tests.
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&TransferRequest> for NewTransfer {
    fn from(request: &TransferRequest) -> Self {
        Self {
            category_id: request.category_id,
            from_account_id: request.from_account_id,
            to_account_id: request.to_account_id,
            amount: request.amount,
            created_at: None,
        }
    }
}

/// Input for a transfer between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Account to debit (the authenticated caller at the API edge).
    pub from_account_id: AccountId,
    /// Account to credit.
    pub to_account_id: AccountId,
    /// Amount in minor units.
    pub amount: i64,
    /// Optional classification.
    #[serde(default)]
    pub category_id: Option<CategoryId>,
}

/// Resolved filter for a history query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationFilter {
    /// Account whose transfers are returned (either side).
    pub account_id: AccountId,
    /// Inclusive lower bound on `created_at`.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub end: Option<DateTime<Utc>>,
    /// Maximum number of records, applied after ordering.
    pub limit: Option<u64>,
}

impl MutationFilter {
    /// Creates an unbounded filter for an account.
    #[must_use]
    pub const fn for_account(account_id: AccountId) -> Self {
        Self {
            account_id,
            start: None,
            end: None,
            limit: None,
        }
    }

    /// Returns true if the record passes the account and date filters.
    ///
    /// The limit is not considered here.
    #[must_use]
    pub fn matches(&self, record: &TransferRecord) -> bool {
        record.involves(self.account_id)
            && self.start.is_none_or(|start| record.created_at >= start)
            && self.end.is_none_or(|end| record.created_at <= end)
    }
}

/// Raw history parameters as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationParams {
    /// Lower bound, `YYYY-MM-DD` or RFC 3339.
    pub start_date: Option<String>,
    /// Upper bound, `YYYY-MM-DD` or RFC 3339.
    pub end_date: Option<String>,
    /// Result cap.
    pub limit: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(from: i64, to: i64, day: u32) -> TransferRecord {
        TransferRecord {
            id: TransferId::new(1),
            category_id: None,
            from_account_id: AccountId::new(from),
            to_account_id: AccountId::new(to),
            amount: 10,
            created_at: Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_record_involves_both_sides() {
        let r = record(1, 2, 1);
        assert!(r.involves(AccountId::new(1)));
        assert!(r.involves(AccountId::new(2)));
        assert!(!r.involves(AccountId::new(3)));
    }

    #[test]
    fn test_filter_bounds_are_inclusive() {
        let r = record(1, 2, 5);
        let mut filter = MutationFilter::for_account(AccountId::new(2));
        filter.start = Some(r.created_at);
        filter.end = Some(r.created_at);
        assert!(filter.matches(&r));

        filter.start = Some(r.created_at + chrono::Duration::seconds(1));
        assert!(!filter.matches(&r));
    }

    #[test]
    fn test_new_transfer_from_request_leaves_timestamp_to_store() {
        let request = TransferRequest {
            from_account_id: AccountId::new(1),
            to_account_id: AccountId::new(2),
            amount: 500,
            category_id: Some(CategoryId::new(3)),
        };
        let new = NewTransfer::from(&request);
        assert_eq!(new.amount, 500);
        assert_eq!(new.category_id, Some(CategoryId::new(3)));
        assert!(new.created_at.is_none());
    }
}
