//! Buy-job execution.
//!
//! A claimed job goes through re-validation, the balance check, the
//! duplicate-position guard, and a second, execution-scoped two-layer
//! lock before the buy primitive is invoked. Every abort is terminal for
//! the job: failed trades are never retried automatically, since a retry
//! of an uncertain trade risks double execution.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use sniper_coordination::{acquire_pair, BuyJob, LockScope};
use sniper_core::{
    BuyExecutor, BuyOrder, ExecutionConfig, FeeConfig, LockStore, Notifier, NotificationEvent,
    Position, PositionStore, RetryPolicy, SnipeError, SniperStore, WalletCustody,
};

use crate::balance::{required_lamports, BalanceCache};

const POSITION_INSERT_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    SniperInactive,
    WalletUnavailable,
    BalanceUnverifiable,
    InsufficientFunds,
    DuplicatePosition,
    LockContended,
    BuyFailed,
}

impl AbortReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SniperInactive => "sniper_inactive",
            Self::WalletUnavailable => "wallet_unavailable",
            Self::BalanceUnverifiable => "balance_unverifiable",
            Self::InsufficientFunds => "insufficient_funds",
            Self::DuplicatePosition => "duplicate_position",
            Self::LockContended => "lock_contended",
            Self::BuyFailed => "buy_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { position_id: Uuid },
    Aborted(AbortReason),
}

pub struct ExecutionWorker {
    snipers: Arc<dyn SniperStore>,
    positions: Arc<dyn PositionStore>,
    locks: Arc<dyn LockStore>,
    buyer: Arc<dyn BuyExecutor>,
    balances: Arc<BalanceCache>,
    notifier: Arc<dyn Notifier>,
    config: ExecutionConfig,
    fees: FeeConfig,
    holder_id: String,
}

impl ExecutionWorker {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        snipers: Arc<dyn SniperStore>,
        positions: Arc<dyn PositionStore>,
        locks: Arc<dyn LockStore>,
        buyer: Arc<dyn BuyExecutor>,
        balances: Arc<BalanceCache>,
        notifier: Arc<dyn Notifier>,
        config: ExecutionConfig,
        fees: FeeConfig,
    ) -> Self {
        Self {
            snipers,
            positions,
            locks,
            buyer,
            balances,
            notifier,
            config,
            fees,
            holder_id: format!("worker-{}", Uuid::new_v4()),
        }
    }

    /// Processes one claimed job to completion or a terminal abort.
    ///
    /// # Errors
    /// Only unexpected store or lock-store failures propagate; every
    /// expected outcome is a [`JobOutcome`].
    pub async fn process(&self, job: &BuyJob) -> Result<JobOutcome, SnipeError> {
        let sniper = &job.sniper;
        let mint = &job.event.token_mint;

        // 1. Configuration state may have changed since dispatch.
        if !self.snipers.is_active(sniper.id).await? {
            tracing::debug!(job_id = %job.job_id, "sniper no longer active");
            return Ok(JobOutcome::Aborted(AbortReason::SniperInactive));
        }
        let wallet = match self.snipers.wallet(sniper.wallet_id).await? {
            Some(wallet)
                if wallet.user_id == sniper.user_id
                    && wallet.custody == WalletCustody::Server =>
            {
                wallet
            }
            _ => {
                tracing::warn!(
                    job_id = %job.job_id,
                    wallet_id = %sniper.wallet_id,
                    "wallet missing, foreign, or not server-custodied at execution time"
                );
                return Ok(JobOutcome::Aborted(AbortReason::WalletUnavailable));
            }
        };

        // 2. Funding check against the cached on-chain balance.
        let required = required_lamports(
            sniper.buy_amount_sol,
            sniper.priority_fee_lamports,
            &self.fees,
        )?;
        let available = match self.balances.balance_lamports(&wallet.public_key).await {
            Ok(balance) => balance,
            Err(err) => {
                tracing::warn!(job_id = %job.job_id, error = %err, "balance unverifiable, aborting job");
                self.notifier.notify(NotificationEvent::SnipeFailed {
                    sniper_id: sniper.id,
                    user_id: sniper.user_id,
                    token_mint: mint.clone(),
                    reason: "wallet balance could not be verified".to_string(),
                });
                return Ok(JobOutcome::Aborted(AbortReason::BalanceUnverifiable));
            }
        };
        if available < required {
            // Stop the sniper before it bleeds fees on doomed attempts.
            let reason = format!(
                "insufficient funds: required {required} lamports, available {available}"
            );
            tracing::warn!(job_id = %job.job_id, sniper_id = %sniper.id, %reason, "deactivating sniper");
            if let Err(err) = self.snipers.deactivate(sniper.id, &reason).await {
                tracing::error!(sniper_id = %sniper.id, error = %err, "deactivation failed");
            }
            self.notifier.notify(NotificationEvent::SniperDeactivated {
                sniper_id: sniper.id,
                user_id: sniper.user_id,
                reason: reason.clone(),
            });
            self.notifier.notify(NotificationEvent::SnipeFailed {
                sniper_id: sniper.id,
                user_id: sniper.user_id,
                token_mint: mint.clone(),
                reason,
            });
            return Ok(JobOutcome::Aborted(AbortReason::InsufficientFunds));
        }

        // 3. Last-resort guard beneath the locking layer.
        if self.positions.find_active(wallet.id, mint).await?.is_some() {
            tracing::warn!(
                job_id = %job.job_id,
                wallet_id = %wallet.id,
                token = %mint,
                "live position already exists for this pair"
            );
            return Ok(JobOutcome::Aborted(AbortReason::DuplicatePosition));
        }

        // 4. Execution-scoped locks, independent of the dispatch-time
        // pair. A redelivered or duplicated job dies here instead of
        // spending twice.
        let ttl = Duration::from_secs(self.config.lock_ttl_secs);
        let lock = acquire_pair(
            self.locks.as_ref(),
            LockScope::Execution,
            wallet.id,
            sniper.id,
            mint,
            &self.holder_id,
            ttl,
        )
        .await?;
        if lock.is_none() {
            tracing::debug!(job_id = %job.job_id, "execution lock contended");
            return Ok(JobOutcome::Aborted(AbortReason::LockContended));
        }
        // The pair is deliberately not released after the trade: letting
        // the TTL expire it covers a crash between trade and release.

        // 5. The buy itself.
        let order = BuyOrder {
            wallet_public_key: wallet.public_key.clone(),
            token_mint: mint.clone(),
            pool_address: job.event.pool_address.clone(),
            amount_sol: sniper.buy_amount_sol,
            slippage_bps: sniper.slippage_bps,
            priority_fee_lamports: sniper.priority_fee_lamports,
            mev_protection: sniper.mev_protection,
        };
        let fill = match self.buyer.execute_buy(&order).await {
            Ok(fill) => fill,
            Err(err) => {
                tracing::warn!(job_id = %job.job_id, error = %err, "buy failed");
                if let Err(err) = self.snipers.record_failure(sniper.id).await {
                    tracing::debug!(sniper_id = %sniper.id, error = %err, "failure counter update failed");
                }
                self.notifier.notify(NotificationEvent::SnipeFailed {
                    sniper_id: sniper.id,
                    user_id: sniper.user_id,
                    token_mint: mint.clone(),
                    reason: err.to_string(),
                });
                return Ok(JobOutcome::Aborted(AbortReason::BuyFailed));
            }
        };

        let Some(entry_price) = fill.entry_price() else {
            return Err(SnipeError::Invariant(format!(
                "buy fill for job {} returned zero tokens",
                job.job_id
            )));
        };

        let position = Position::from_fill(
            sniper,
            mint,
            entry_price,
            fill.sol_spent,
            fill.token_amount,
            Utc::now(),
        );

        // Funds are already spent; give the insert a few chances before
        // surfacing what would be an orphaned trade.
        let insert_retry = RetryPolicy::new(
            self.config.position_insert_attempts,
            POSITION_INSERT_BACKOFF,
        );
        insert_retry
            .run("position insert", || self.positions.insert_open(&position))
            .await?;

        if let Err(err) = self.snipers.record_success(sniper.id).await {
            tracing::debug!(sniper_id = %sniper.id, error = %err, "success counter update failed");
        }
        self.balances.invalidate(&wallet.public_key).await;
        self.notifier.notify(NotificationEvent::SnipeSucceeded {
            sniper_id: sniper.id,
            user_id: sniper.user_id,
            token_mint: mint.clone(),
            position_id: position.id,
            signature: fill.signature.clone(),
            sol_spent: fill.sol_spent,
        });
        tracing::info!(
            job_id = %job.job_id,
            position_id = %position.id,
            entry_price = %entry_price,
            signature = %fill.signature,
            "position opened"
        );

        Ok(JobOutcome::Completed {
            position_id: position.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use sniper_coordination::{lock_key, LockLevel, MemoryLockStore};
    use sniper_core::paper::PaperExchange;
    use sniper_core::{
        BalanceSource, ExitRules, MigrationEvent, NullNotifier, PositionStatus, SniperConfig,
        SniperFilters, WalletBinding,
    };
    use sniper_data::{MemoryPositionStore, MemorySniperStore};

    struct Fixture {
        worker: ExecutionWorker,
        snipers: Arc<MemorySniperStore>,
        positions: Arc<MemoryPositionStore>,
        locks: Arc<MemoryLockStore>,
        exchange: Arc<PaperExchange>,
    }

    fn fixture_with_balance_source(source: Arc<dyn BalanceSource>) -> Fixture {
        let snipers = Arc::new(MemorySniperStore::new());
        let positions = Arc::new(MemoryPositionStore::new());
        let locks = Arc::new(MemoryLockStore::new());
        let exchange = Arc::new(PaperExchange::new());
        let balances = Arc::new(BalanceCache::new(
            source,
            Duration::from_secs(60),
            RetryPolicy::new(2, Duration::from_millis(1)),
        ));
        let worker = ExecutionWorker::new(
            Arc::clone(&snipers) as Arc<dyn SniperStore>,
            Arc::clone(&positions) as Arc<dyn PositionStore>,
            Arc::clone(&locks) as Arc<dyn LockStore>,
            Arc::clone(&exchange) as Arc<dyn BuyExecutor>,
            balances,
            Arc::new(NullNotifier),
            ExecutionConfig::default(),
            FeeConfig::default(),
        );
        Fixture {
            worker,
            snipers,
            positions,
            locks,
            exchange,
        }
    }

    // The exchange doubles as the balance source so funding tests can
    // steer both sides through one handle.
    fn fixture() -> Fixture {
        let snipers = Arc::new(MemorySniperStore::new());
        let positions = Arc::new(MemoryPositionStore::new());
        let locks = Arc::new(MemoryLockStore::new());
        let exchange = Arc::new(PaperExchange::new());
        let balances = Arc::new(BalanceCache::new(
            Arc::clone(&exchange) as Arc<dyn BalanceSource>,
            Duration::from_secs(60),
            RetryPolicy::new(2, Duration::from_millis(1)),
        ));
        let worker = ExecutionWorker::new(
            Arc::clone(&snipers) as Arc<dyn SniperStore>,
            Arc::clone(&positions) as Arc<dyn PositionStore>,
            Arc::clone(&locks) as Arc<dyn LockStore>,
            Arc::clone(&exchange) as Arc<dyn BuyExecutor>,
            balances,
            Arc::new(NullNotifier),
            ExecutionConfig::default(),
            FeeConfig::default(),
        );
        Fixture {
            worker,
            snipers,
            positions,
            locks,
            exchange,
        }
    }

    async fn seed_job(fixture: &Fixture) -> BuyJob {
        let user = Uuid::new_v4();
        let wallet = WalletBinding {
            id: Uuid::new_v4(),
            user_id: user,
            public_key: format!("pk-{}", Uuid::new_v4()),
            custody: WalletCustody::Server,
        };
        let sniper = SniperConfig {
            id: Uuid::new_v4(),
            user_id: user,
            wallet_id: wallet.id,
            is_active: true,
            buy_amount_sol: dec!(0.5),
            slippage_bps: 300,
            priority_fee_lamports: 100_000,
            mev_protection: false,
            filters: SniperFilters::default(),
            exits: ExitRules {
                take_profit_pct: Some(dec!(100)),
                stop_loss_pct: Some(dec!(50)),
                trailing_stop_pct: None,
            },
        };
        fixture.snipers.insert_wallet(wallet.clone()).await;
        fixture.snipers.insert_sniper(sniper.clone()).await;

        let now = Utc::now();
        let event = MigrationEvent {
            token_mint: "MintA".to_string(),
            pool_address: "PoolA".to_string(),
            creator_address: None,
            token_created_at: now - chrono::Duration::seconds(30),
            detected_at: now,
            initial_liquidity_sol: dec!(40),
        };
        BuyJob::new(sniper, wallet, event, now)
    }

    #[tokio::test]
    async fn confirmed_buy_opens_a_position_with_derived_exits() {
        let fixture = fixture();
        let job = seed_job(&fixture).await;
        fixture.exchange.set_price("MintA", dec!(2)).await;

        let outcome = fixture.worker.process(&job).await.unwrap();

        let JobOutcome::Completed { position_id } = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        let position = fixture.positions.get(position_id).await.unwrap().unwrap();
        assert_eq!(position.status, PositionStatus::Open);
        assert_eq!(position.entry_price, dec!(2));
        assert_eq!(position.take_profit_price, Some(dec!(4)));
        assert_eq!(position.stop_loss_price, Some(dec!(1)));
        assert_eq!(fixture.snipers.success_count(job.sniper.id).await, 1);
    }

    #[tokio::test]
    async fn deactivated_sniper_aborts_before_any_side_effect() {
        let fixture = fixture();
        let job = seed_job(&fixture).await;
        fixture.snipers.deactivate(job.sniper.id, "user request").await.unwrap();

        let outcome = fixture.worker.process(&job).await.unwrap();

        assert_eq!(outcome, JobOutcome::Aborted(AbortReason::SniperInactive));
        assert!(fixture.positions.all().await.is_empty());
    }

    #[tokio::test]
    async fn insufficient_funds_deactivates_the_sniper() {
        let fixture = fixture();
        let job = seed_job(&fixture).await;
        // Needs ~0.51 SOL; fund with far less.
        fixture.exchange.set_balance(&job.wallet.public_key, 1_000).await;

        let outcome = fixture.worker.process(&job).await.unwrap();

        assert_eq!(outcome, JobOutcome::Aborted(AbortReason::InsufficientFunds));
        assert!(!fixture.snipers.is_active(job.sniper.id).await.unwrap());
        let reason = fixture
            .snipers
            .deactivation_reason(job.sniper.id)
            .await
            .unwrap();
        assert!(reason.contains("insufficient funds"));
        assert!(fixture.positions.all().await.is_empty());
    }

    struct DeadBalanceSource;

    #[async_trait]
    impl BalanceSource for DeadBalanceSource {
        async fn balance_lamports(&self, _key: &str) -> Result<u64, SnipeError> {
            Err(SnipeError::Transient("rpc down".to_string()))
        }
    }

    #[tokio::test]
    async fn unverifiable_balance_aborts_without_deactivation() {
        let fixture = fixture_with_balance_source(Arc::new(DeadBalanceSource));
        let job = seed_job(&fixture).await;

        let outcome = fixture.worker.process(&job).await.unwrap();

        assert_eq!(outcome, JobOutcome::Aborted(AbortReason::BalanceUnverifiable));
        // An outage must not permanently stop the sniper.
        assert!(fixture.snipers.is_active(job.sniper.id).await.unwrap());
        assert!(fixture.positions.all().await.is_empty());
    }

    #[tokio::test]
    async fn live_position_on_the_pair_aborts_the_job() {
        let fixture = fixture();
        let job = seed_job(&fixture).await;

        let existing = Position::from_fill(
            &job.sniper,
            "MintA",
            dec!(1),
            dec!(0.5),
            dec!(0.5),
            Utc::now(),
        );
        fixture.positions.insert_open(&existing).await.unwrap();

        let outcome = fixture.worker.process(&job).await.unwrap();

        assert_eq!(outcome, JobOutcome::Aborted(AbortReason::DuplicatePosition));
        assert_eq!(fixture.positions.all().await.len(), 1);
    }

    #[tokio::test]
    async fn execution_lock_contention_aborts_without_spending() {
        let fixture = fixture();
        let job = seed_job(&fixture).await;

        // Another worker already owns the execution-scope wallet lock.
        let key = lock_key(
            LockScope::Execution,
            LockLevel::Wallet,
            job.wallet.id,
            "MintA",
        );
        assert!(fixture
            .locks
            .try_acquire(&key, "other-worker", Duration::from_secs(60))
            .await
            .unwrap());

        let outcome = fixture.worker.process(&job).await.unwrap();

        assert_eq!(outcome, JobOutcome::Aborted(AbortReason::LockContended));
        assert!(fixture.positions.all().await.is_empty());
    }

    #[tokio::test]
    async fn failed_buy_records_failure_and_creates_nothing() {
        let fixture = fixture();
        let job = seed_job(&fixture).await;
        fixture.exchange.set_fail_buys(true);

        let outcome = fixture.worker.process(&job).await.unwrap();

        assert_eq!(outcome, JobOutcome::Aborted(AbortReason::BuyFailed));
        assert_eq!(fixture.snipers.failure_count(job.sniper.id).await, 1);
        assert!(fixture.positions.all().await.is_empty());
    }

    #[tokio::test]
    async fn redelivered_job_spends_at_most_once() {
        let fixture = fixture();
        let job = seed_job(&fixture).await;

        let worker = Arc::new(fixture.worker);
        let mut handles = Vec::new();
        for _ in 0..6 {
            let worker = Arc::clone(&worker);
            let job = job.clone();
            handles.push(tokio::spawn(async move {
                worker.process(&job).await.unwrap()
            }));
        }

        let mut completed = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), JobOutcome::Completed { .. }) {
                completed += 1;
            }
        }

        assert_eq!(completed, 1);
        let open: Vec<_> = fixture
            .positions
            .all()
            .await
            .into_iter()
            .filter(|p| p.status == PositionStatus::Open)
            .collect();
        assert_eq!(open.len(), 1);
    }
}
