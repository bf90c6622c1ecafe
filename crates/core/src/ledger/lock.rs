//! Lock acquisition order.
//!
//! Every unit of work that touches two accounts locks them in ascending ID
//! order. Two transfers over the same pair in opposite directions therefore
//! contend on the same first lock instead of deadlocking.

use tally_shared::types::AccountId;

/// Returns the two IDs in the order their locks must be taken.
#[must_use]
pub fn lock_order(a: AccountId, b: AccountId) -> [AccountId; 2] {
    if a <= b { [a, b] } else { [b, a] }
}
