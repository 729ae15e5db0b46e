//! Two-layer distributed lock over a wallet/token pair.
//!
//! Acquisition order is fixed: wallet level first, sniper level second,
//! with the wallet lock released whenever the sniper lock cannot be taken.
//! The wallet-first order is what stops two configurations sharing one
//! wallet from both claiming the same token.

use std::time::Duration;

use uuid::Uuid;

use sniper_core::{LockStore, SnipeError};

/// Which stage of the pipeline the lock protects. Dispatch locks prevent
/// duplicate jobs; execution locks prevent duplicate spends. The scopes
/// use disjoint key namespaces so one never satisfies the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    Dispatch,
    Execution,
}

impl LockScope {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::Execution => "execution",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockLevel {
    Wallet,
    Sniper,
}

impl LockLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wallet => "wallet",
            Self::Sniper => "sniper",
        }
    }
}

#[must_use]
pub fn lock_key(scope: LockScope, level: LockLevel, id: Uuid, token_mint: &str) -> String {
    format!("{}:{}:{}:{}", scope.as_str(), level.as_str(), id, token_mint)
}

/// A successfully acquired wallet+sniper lock pair.
///
/// Release is explicit and optional: execution-scope holders deliberately
/// let the TTL expire instead, so a crash between trade and release can
/// never leave a pair wedged.
#[derive(Debug)]
pub struct PairLock {
    wallet_key: String,
    sniper_key: String,
    holder: String,
}

impl PairLock {
    /// Releases both levels, sniper first. Failures are logged and
    /// swallowed; the TTL bounds the damage either way.
    pub async fn release(self, store: &dyn LockStore) {
        for key in [&self.sniper_key, &self.wallet_key] {
            if let Err(err) = store.release(key, &self.holder).await {
                tracing::warn!(key = %key, error = %err, "lock release failed, TTL will expire it");
            }
        }
    }
}

/// Attempts the ordered two-layer acquisition. `Ok(None)` is contention on
/// either level — the wallet lock is guaranteed released in that case.
///
/// # Errors
/// Returns an error when the lock store itself fails; any wallet lock
/// taken before the failure is released best-effort first.
pub async fn acquire_pair(
    store: &dyn LockStore,
    scope: LockScope,
    wallet_id: Uuid,
    sniper_id: Uuid,
    token_mint: &str,
    holder: &str,
    ttl: Duration,
) -> Result<Option<PairLock>, SnipeError> {
    let wallet_key = lock_key(scope, LockLevel::Wallet, wallet_id, token_mint);
    if !store.try_acquire(&wallet_key, holder, ttl).await? {
        return Ok(None);
    }

    let sniper_key = lock_key(scope, LockLevel::Sniper, sniper_id, token_mint);
    match store.try_acquire(&sniper_key, holder, ttl).await {
        Ok(true) => Ok(Some(PairLock {
            wallet_key,
            sniper_key,
            holder: holder.to_string(),
        })),
        Ok(false) => {
            release_best_effort(store, &wallet_key, holder).await;
            Ok(None)
        }
        Err(err) => {
            release_best_effort(store, &wallet_key, holder).await;
            Err(err)
        }
    }
}

async fn release_best_effort(store: &dyn LockStore, key: &str, holder: &str) {
    if let Err(err) = store.release(key, holder).await {
        tracing::warn!(key = %key, error = %err, "lock release failed, TTL will expire it");
    }
}
