//! Persistence for the sniping pipeline.
//!
//! Postgres repositories plus in-memory stores with identical
//! conditional-transition semantics.

pub mod memory;
pub mod positions;
pub mod snipers;

pub use memory::{MemoryPositionStore, MemorySniperStore};
pub use positions::PgPositionStore;
pub use snipers::PgSniperStore;

use sniper_core::SnipeError;
use sqlx::PgPool;

/// Applies the embedded SQL migrations.
///
/// # Errors
/// Returns an error if any migration fails to apply.
pub async fn run_migrations(pool: &PgPool) -> Result<(), SnipeError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|err| SnipeError::Store(err.to_string()))
}
