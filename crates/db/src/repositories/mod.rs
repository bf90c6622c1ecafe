//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the rest of the application.

pub mod account;
pub mod category;
pub mod ledger;

pub use account::{AccountError, AccountRepository};
pub use category::{CategoryError, CategoryRepository, CreateCategoryInput, UpdateCategoryInput};
pub use ledger::{SeaLedgerStore, SeaLedgerUnit, classify_db_error};
