use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sniper_core::{MigrationEvent, SnipeError, SniperConfig, WalletBinding};

/// Priority number below which no fee can push a job. Lower numbers are
/// served first.
const PRIORITY_FLOOR: i64 = 0;
/// Priority assigned to a job paying no priority fee at all.
const PRIORITY_CEILING: i64 = 1_000;
/// Lamports of priority fee that buy one step of queue priority. The
/// mapping is a tunable policy, not a correctness contract.
const FEE_LAMPORTS_PER_STEP: u64 = 100_000;

/// Maps a priority fee to a queue priority: higher fee, lower number,
/// served first.
#[must_use]
pub fn queue_priority(priority_fee_lamports: u64) -> i64 {
    let steps = i64::try_from(priority_fee_lamports / FEE_LAMPORTS_PER_STEP).unwrap_or(i64::MAX);
    (PRIORITY_CEILING - steps).max(PRIORITY_FLOOR)
}

/// One buy attempt, frozen at dispatch time.
///
/// The configuration snapshot travels with the job so that filter or
/// amount edits made after dispatch cannot change what gets executed. The
/// job id is deterministic to keep redelivery idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyJob {
    pub job_id: String,
    pub sniper: SniperConfig,
    pub wallet: WalletBinding,
    pub event: MigrationEvent,
    pub priority: i64,
    pub enqueued_at: DateTime<Utc>,
}

impl BuyJob {
    #[must_use]
    pub fn new(
        sniper: SniperConfig,
        wallet: WalletBinding,
        event: MigrationEvent,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        let job_id = format!(
            "{}:{}:{}",
            sniper.id,
            event.token_mint,
            enqueued_at.timestamp_millis()
        );
        let priority = queue_priority(sniper.priority_fee_lamports);
        Self {
            job_id,
            sniper,
            wallet,
            event,
            priority,
            enqueued_at,
        }
    }
}

/// Durable, priority-ordered queue of buy jobs.
///
/// `claim` is a single-delivery pop: a claimed job is gone from the queue
/// whether or not the worker finishes it. Crash recovery relies on event
/// redelivery plus the locking layers, never on queue-side redelivery.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Adds the job unless one with the same id is already queued.
    /// Returns `false` for the duplicate case.
    async fn enqueue(&self, job: &BuyJob) -> Result<bool, SnipeError>;

    /// Claims the highest-priority job, if any.
    async fn claim(&self) -> Result<Option<BuyJob>, SnipeError>;

    async fn depth(&self) -> Result<usize, SnipeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_fee_means_lower_priority_number() {
        let cheap = queue_priority(0);
        let mid = queue_priority(500_000);
        let rich = queue_priority(5_000_000);

        assert!(rich < mid);
        assert!(mid < cheap);
        assert_eq!(cheap, 1_000);
    }

    #[test]
    fn priority_never_goes_below_the_floor() {
        assert_eq!(queue_priority(u64::MAX), 0);
    }

    #[test]
    fn job_id_is_deterministic_for_same_inputs() {
        use chrono::TimeZone;
        use rust_decimal_macros::dec;
        use sniper_core::{ExitRules, SniperFilters, WalletCustody};
        use uuid::Uuid;

        let sniper_id = Uuid::new_v4();
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let sniper = SniperConfig {
            id: sniper_id,
            user_id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            is_active: true,
            buy_amount_sol: dec!(0.5),
            slippage_bps: 300,
            priority_fee_lamports: 100_000,
            mev_protection: false,
            filters: SniperFilters::default(),
            exits: ExitRules::default(),
        };
        let wallet = WalletBinding {
            id: sniper.wallet_id,
            user_id: sniper.user_id,
            public_key: "W1".to_string(),
            custody: WalletCustody::Server,
        };
        let event = MigrationEvent {
            token_mint: "MintA".to_string(),
            pool_address: "PoolA".to_string(),
            creator_address: None,
            token_created_at: at,
            detected_at: at,
            initial_liquidity_sol: dec!(40),
        };

        let a = BuyJob::new(sniper.clone(), wallet.clone(), event.clone(), at);
        let b = BuyJob::new(sniper, wallet, event, at);

        assert_eq!(a.job_id, b.job_id);
        assert_eq!(a.job_id, format!("{sniper_id}:MintA:{}", at.timestamp_millis()));
    }
}
