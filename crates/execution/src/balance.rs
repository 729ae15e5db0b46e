//! Read-through wallet balance cache.
//!
//! On-chain balance reads are the most frequent external call on the
//! execution path; a short TTL bounds RPC volume without hiding a funding
//! change for long. A read that keeps failing after the retry budget is an
//! error to the caller — an unverifiable balance is never treated as
//! sufficient.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use sniper_core::{BalanceSource, FeeConfig, RetryPolicy, SnipeError, LAMPORTS_PER_SOL};

/// Total lamports a buy needs up front: the buy amount itself, the
/// priority fee, the platform fee (bps of the buy amount), and a fixed
/// network-fee buffer.
///
/// # Errors
/// Returns an invariant error if the amount does not fit in lamports.
pub fn required_lamports(
    buy_amount_sol: Decimal,
    priority_fee_lamports: u64,
    fees: &FeeConfig,
) -> Result<u64, SnipeError> {
    let buy_lamports = buy_amount_sol * Decimal::from(LAMPORTS_PER_SOL);
    let platform_fee = buy_lamports * Decimal::from(fees.platform_fee_bps) / Decimal::from(10_000);
    let total = buy_lamports
        + platform_fee
        + Decimal::from(priority_fee_lamports)
        + Decimal::from(fees.network_fee_buffer_lamports);

    total
        .ceil()
        .to_u64()
        .ok_or_else(|| SnipeError::Invariant(format!("required balance {total} not representable")))
}

pub struct BalanceCache {
    source: Arc<dyn BalanceSource>,
    ttl: Duration,
    retry: RetryPolicy,
    entries: Mutex<HashMap<String, (u64, Instant)>>,
}

impl BalanceCache {
    #[must_use]
    pub fn new(source: Arc<dyn BalanceSource>, ttl: Duration, retry: RetryPolicy) -> Self {
        Self {
            source,
            ttl,
            retry,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached balance when fresh, otherwise a retried read through the
    /// source.
    ///
    /// # Errors
    /// Propagates the read failure once the retry budget is exhausted;
    /// callers must treat that as "balance unverifiable", never as zero
    /// or as sufficient.
    pub async fn balance_lamports(&self, wallet_public_key: &str) -> Result<u64, SnipeError> {
        {
            let entries = self.entries.lock().await;
            if let Some((balance, read_at)) = entries.get(wallet_public_key) {
                if read_at.elapsed() < self.ttl {
                    return Ok(*balance);
                }
            }
        }

        let balance = self
            .retry
            .run("balance read", || {
                self.source.balance_lamports(wallet_public_key)
            })
            .await?;

        self.entries
            .lock()
            .await
            .insert(wallet_public_key.to_string(), (balance, Instant::now()));
        Ok(balance)
    }

    /// Drops the cached entry, e.g. right after a spend.
    pub async fn invalidate(&self, wallet_public_key: &str) {
        self.entries.lock().await.remove(wallet_public_key);
    }
}
