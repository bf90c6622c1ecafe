//! Schema migration runner for the Tally ledger.
//!
//! Reads `DATABASE_URL` and accepts the usual sea-orm-migration commands
//! (`up`, `down`, `status`, `fresh`).

use sea_orm_migration::prelude::*;
use tally_db::migration::Migrator;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    cli::run_cli(Migrator).await;
}
