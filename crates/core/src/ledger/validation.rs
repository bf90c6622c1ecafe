//! Business rule validation for ledger operations.
//!
//! All checks here are pure and run before a unit of work is opened, so a
//! failure performs zero mutations.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeDelta, Utc};

use super::error::LedgerError;
use super::types::{MutationFilter, MutationParams, TransferRequest};
use tally_shared::types::AccountId;

/// Validates that an amount is strictly positive.
///
/// # Errors
///
/// Returns `InvalidAmount` for zero or negative amounts.
pub fn validate_amount(amount: i64) -> Result<(), LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(())
}

/// Validates an account identifier.
///
/// # Errors
///
/// Returns `InvalidTransfer` if the ID is not positive.
pub fn validate_account_id(id: AccountId) -> Result<(), LedgerError> {
    if !id.is_well_formed() {
        return Err(LedgerError::InvalidTransfer(format!(
            "account id must be positive, got {id}"
        )));
    }
    Ok(())
}

/// Validates the static preconditions of a transfer, in order:
/// amount first, then the two account IDs.
///
/// # Errors
///
/// Returns `InvalidAmount` or `InvalidTransfer`.
pub fn validate_transfer(request: &TransferRequest) -> Result<(), LedgerError> {
    validate_amount(request.amount)?;
    validate_account_id(request.from_account_id)?;
    validate_account_id(request.to_account_id)?;

    if request.from_account_id == request.to_account_id {
        return Err(LedgerError::InvalidTransfer(
            "source and destination accounts must differ".to_string(),
        ));
    }

    Ok(())
}

/// Checks that a balance covers a debit.
///
/// # Errors
///
/// Returns `InsufficientFunds` with the observed balance.
pub fn ensure_sufficient_funds(
    account_id: AccountId,
    balance: i64,
    requested: i64,
) -> Result<(), LedgerError> {
    if balance < requested {
        return Err(LedgerError::InsufficientFunds {
            account_id,
            balance,
            requested,
        });
    }
    Ok(())
}

/// Computes `balance + amount` for a credit to `account_id`.
///
/// # Errors
///
/// Returns `BalanceOverflow` if the result would overflow.
pub fn checked_credit(account_id: AccountId, balance: i64, amount: i64) -> Result<i64, LedgerError> {
    balance
        .checked_add(amount)
        .ok_or(LedgerError::BalanceOverflow { account_id, amount })
}

/// Which end of a range a date bound is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Inclusive lower bound.
    Start,
    /// Inclusive upper bound.
    End,
}

/// Parses a date bound.
///
/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates. A plain date as
/// a start bound means 00:00:00 UTC; as an end bound it covers the whole day.
///
/// # Errors
///
/// Returns `Validation` if the input is neither format.
pub fn parse_date_bound(raw: &str, bound: Bound) -> Result<DateTime<Utc>, LedgerError> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        LedgerError::Validation(format!(
            "invalid date '{raw}', expected YYYY-MM-DD or RFC 3339"
        ))
    })?;

    let start_of_day = date.and_time(NaiveTime::MIN).and_utc();
    match bound {
        Bound::Start => Ok(start_of_day),
        Bound::End => date
            .checked_add_days(Days::new(1))
            .map(|next| next.and_time(NaiveTime::MIN).and_utc() - TimeDelta::nanoseconds(1))
            .ok_or_else(|| LedgerError::Validation(format!("date '{raw}' out of range"))),
    }
}

/// Resolves raw history parameters into a ledger filter.
///
/// # Errors
///
/// Returns `Validation` for malformed bounds, `start > end`, or a zero limit.
pub fn resolve_mutation_filter(
    account_id: AccountId,
    params: &MutationParams,
) -> Result<MutationFilter, LedgerError> {
    let start = params
        .start_date
        .as_deref()
        .map(|raw| parse_date_bound(raw, Bound::Start))
        .transpose()?;
    let end = params
        .end_date
        .as_deref()
        .map(|raw| parse_date_bound(raw, Bound::End))
        .transpose()?;

    if let (Some(start), Some(end)) = (start, end)
        && start > end
    {
        return Err(LedgerError::Validation(
            "start_date must not be after end_date".to_string(),
        ));
    }

    if params.limit == Some(0) {
        return Err(LedgerError::Validation(
            "limit must be at least 1".to_string(),
        ));
    }

    Ok(MutationFilter {
        account_id,
        start,
        end,
        limit: params.limit,
    })
}
