//! Core business logic for Tally.
//!
//! This crate contains the ledger domain with ZERO web or database dependencies.
//! Storage is reached only through the traits in [`ledger::store`].
//!
//! # Modules
//!
//! - `ledger` - Transfers, balance consistency and transaction history

pub mod ledger;
