//! Initial schema: accounts, transaction categories and the transfer ledger.
//!
//! PostgreSQL is the production target. The SQLite variant backs the test
//! suites and carries the same constraints.

use sea_orm::DatabaseBackend;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        let sql = match manager.get_database_backend() {
            DatabaseBackend::Postgres => POSTGRES_SQL,
            DatabaseBackend::Sqlite => SQLITE_SQL,
            DatabaseBackend::MySql => {
                return Err(DbErr::Migration("MySQL is not supported".to_string()));
            }
        };
        db.execute_unprepared(sql).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(
            "DROP TABLE IF EXISTS transfers;
             DROP TABLE IF EXISTS transaction_categories;
             DROP TABLE IF EXISTS accounts;",
        )
        .await?;
        Ok(())
    }
}

const POSTGRES_SQL: &str = r"
-- Accounts; balance in minor units, never negative
CREATE TABLE accounts (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    balance BIGINT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_accounts_balance_non_negative CHECK (balance >= 0)
);

CREATE TABLE transaction_categories (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(255) NOT NULL,
    description TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

-- Append-only transfer ledger
CREATE TABLE transfers (
    id BIGSERIAL PRIMARY KEY,
    category_id BIGINT REFERENCES transaction_categories(id) ON DELETE RESTRICT,
    from_account_id BIGINT NOT NULL REFERENCES accounts(id) ON DELETE RESTRICT,
    to_account_id BIGINT NOT NULL REFERENCES accounts(id) ON DELETE RESTRICT,
    amount BIGINT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_transfers_amount_positive CHECK (amount > 0),
    CONSTRAINT chk_transfers_distinct_accounts CHECK (from_account_id <> to_account_id)
);

-- History lookups by either side, most recent first
CREATE INDEX idx_transfers_from ON transfers(from_account_id, created_at DESC, id DESC);
CREATE INDEX idx_transfers_to ON transfers(to_account_id, created_at DESC, id DESC);
CREATE INDEX idx_transfers_category ON transfers(category_id) WHERE category_id IS NOT NULL;
";

const SQLITE_SQL: &str = r"
CREATE TABLE accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    balance INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CONSTRAINT chk_accounts_balance_non_negative CHECK (balance >= 0)
);

CREATE TABLE transaction_categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE transfers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    category_id INTEGER REFERENCES transaction_categories(id) ON DELETE RESTRICT,
    from_account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE RESTRICT,
    to_account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE RESTRICT,
    amount INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    CONSTRAINT chk_transfers_amount_positive CHECK (amount > 0),
    CONSTRAINT chk_transfers_distinct_accounts CHECK (from_account_id <> to_account_id)
);

CREATE INDEX idx_transfers_from ON transfers(from_account_id, created_at, id);
CREATE INDEX idx_transfers_to ON transfers(to_account_id, created_at, id);
";
