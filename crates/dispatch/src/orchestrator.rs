//! Dispatch orchestrator.
//!
//! One instance consumes the at-least-once migration event stream. Per
//! event it loads every active configuration, evaluates filters with
//! bounded parallelism, and for each match takes the dispatch-scope
//! two-layer lock before enqueueing exactly one frozen buy job. Counter
//! and notification side effects never block or fail the dispatch path.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use sniper_coordination::{acquire_pair, BuyJob, JobQueue, LockScope};
use sniper_core::{
    DispatchConfig, LockStore, MigrationEvent, Notifier, NotificationEvent, SnipeError,
    SniperConfig, SniperStore, TokenAnalysis, TokenAnalysisProvider, WalletBinding, WalletCustody,
};

use crate::aux::{AuxCache, AuxFetchSettings};
use crate::filters::{self, FilterContext};

/// Per-event dispatch accounting, logged and surfaced to callers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub evaluated: usize,
    pub invalid_wallet: usize,
    pub filtered: usize,
    pub matched: usize,
    pub enqueued: usize,
    pub lock_contended: usize,
    pub duplicate_jobs: usize,
    pub errors: usize,
}

enum DispatchOutcome {
    Enqueued,
    Filtered,
    LockContended,
    Duplicate,
    Failed,
}

pub struct DispatchOrchestrator {
    snipers: Arc<dyn SniperStore>,
    locks: Arc<dyn LockStore>,
    queue: Arc<dyn JobQueue>,
    analysis: Arc<dyn TokenAnalysisProvider>,
    notifier: Arc<dyn Notifier>,
    config: DispatchConfig,
    aux_cache: AuxCache,
    holder_id: String,
}

impl DispatchOrchestrator {
    #[must_use]
    pub fn new(
        snipers: Arc<dyn SniperStore>,
        locks: Arc<dyn LockStore>,
        queue: Arc<dyn JobQueue>,
        analysis: Arc<dyn TokenAnalysisProvider>,
        notifier: Arc<dyn Notifier>,
        config: DispatchConfig,
    ) -> Self {
        let aux_cache = AuxCache::new(
            Duration::from_secs(config.aux_cache_ttl_secs),
            config.aux_cache_capacity,
        );
        Self {
            snipers,
            locks,
            queue,
            analysis,
            notifier,
            config,
            aux_cache,
            holder_id: format!("dispatch-{}", Uuid::new_v4()),
        }
    }

    /// Consumes migration events until the channel closes or shutdown is
    /// signalled. Event handling failures are logged and isolated; one bad
    /// event never stops the stream.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<MigrationEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::info!(holder = %self.holder_id, "dispatch orchestrator started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else { break };
                    match self.handle_event(&event).await {
                        Ok(report) => {
                            tracing::info!(
                                token = %event.token_mint,
                                evaluated = report.evaluated,
                                enqueued = report.enqueued,
                                filtered = report.filtered,
                                contended = report.lock_contended,
                                "migration event dispatched"
                            );
                        }
                        Err(err) => {
                            tracing::error!(token = %event.token_mint, error = %err, "event dispatch failed");
                        }
                    }
                }
            }
        }
        tracing::info!("dispatch orchestrator stopped");
    }

    /// Fans one event out across every active configuration.
    ///
    /// # Errors
    /// Only store-level failures while loading configurations surface
    /// here; per-configuration failures are counted in the report.
    pub async fn handle_event(&self, event: &MigrationEvent) -> Result<DispatchReport, SnipeError> {
        let mut report = DispatchReport::default();
        let bindings = self.snipers.active_with_wallets().await?;

        let mut candidates: Vec<(SniperConfig, WalletBinding)> = Vec::with_capacity(bindings.len());
        for (sniper, wallet) in bindings {
            match wallet {
                Some(wallet)
                    if wallet.id == sniper.wallet_id
                        && wallet.user_id == sniper.user_id
                        && wallet.custody == WalletCustody::Server =>
                {
                    candidates.push((sniper, wallet));
                }
                _ => {
                    report.invalid_wallet += 1;
                    tracing::warn!(
                        sniper_id = %sniper.id,
                        "wallet binding missing, foreign, or not server-custodied; sniper skipped"
                    );
                }
            }
        }

        if candidates.is_empty() {
            return Ok(report);
        }
        report.evaluated = candidates.len();

        let needs_analysis = candidates
            .iter()
            .any(|(sniper, _)| sniper.filters.needs_analysis());
        let analysis = if needs_analysis {
            self.aux_cache
                .snapshot(
                    self.analysis.as_ref(),
                    &event.token_mint,
                    &self.fetch_settings(),
                )
                .await
        } else {
            Arc::new(TokenAnalysis::default())
        };

        let ctx = FilterContext {
            now: Utc::now(),
            staleness_bound_secs: self.config.staleness_bound_secs,
        };

        let outcomes: Vec<DispatchOutcome> = stream::iter(candidates)
            .map(|(sniper, wallet)| {
                let analysis = Arc::clone(&analysis);
                async move { self.dispatch_one(sniper, wallet, event, &analysis, &ctx).await }
            })
            .buffer_unordered(self.config.eval_concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                DispatchOutcome::Filtered => report.filtered += 1,
                DispatchOutcome::Enqueued => {
                    report.matched += 1;
                    report.enqueued += 1;
                }
                DispatchOutcome::LockContended => {
                    report.matched += 1;
                    report.lock_contended += 1;
                }
                DispatchOutcome::Duplicate => {
                    report.matched += 1;
                    report.duplicate_jobs += 1;
                }
                DispatchOutcome::Failed => {
                    report.matched += 1;
                    report.errors += 1;
                }
            }
        }

        self.aux_cache.evict(&event.token_mint).await;
        Ok(report)
    }

    fn fetch_settings(&self) -> AuxFetchSettings {
        AuxFetchSettings {
            timeout: Duration::from_millis(self.config.aux_fetch_timeout_ms),
            attempts: self.config.aux_fetch_attempts,
            backoff: Duration::from_millis(self.config.aux_fetch_backoff_ms),
        }
    }

    async fn dispatch_one(
        &self,
        sniper: SniperConfig,
        wallet: WalletBinding,
        event: &MigrationEvent,
        analysis: &TokenAnalysis,
        ctx: &FilterContext,
    ) -> DispatchOutcome {
        if let Err(miss) = filters::evaluate(&sniper, event, analysis, ctx) {
            tracing::debug!(
                sniper_id = %sniper.id,
                token = %event.token_mint,
                miss = miss.as_str(),
                "filters not met"
            );
            return DispatchOutcome::Filtered;
        }

        let ttl = Duration::from_secs(self.config.lock_ttl_secs);
        let pair = match acquire_pair(
            self.locks.as_ref(),
            LockScope::Dispatch,
            wallet.id,
            sniper.id,
            &event.token_mint,
            &self.holder_id,
            ttl,
        )
        .await
        {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                tracing::debug!(
                    sniper_id = %sniper.id,
                    token = %event.token_mint,
                    "dispatch lock contended, another dispatcher owns this pair"
                );
                return DispatchOutcome::LockContended;
            }
            Err(err) => {
                tracing::warn!(sniper_id = %sniper.id, error = %err, "dispatch lock store failed");
                return DispatchOutcome::Failed;
            }
        };

        let job = BuyJob::new(sniper.clone(), wallet, event.clone(), Utc::now());
        match self.queue.enqueue(&job).await {
            Ok(true) => {
                // The locks stay held so a redelivery of the same event
                // cannot enqueue a second job; the TTL expires them.
                self.notifier.notify(NotificationEvent::DispatchMatched {
                    sniper_id: sniper.id,
                    user_id: sniper.user_id,
                    token_mint: event.token_mint.clone(),
                });
                tracing::info!(
                    job_id = %job.job_id,
                    priority = job.priority,
                    "buy job enqueued"
                );
                DispatchOutcome::Enqueued
            }
            Ok(false) => {
                pair.release(self.locks.as_ref()).await;
                DispatchOutcome::Duplicate
            }
            Err(err) => {
                pair.release(self.locks.as_ref()).await;
                tracing::warn!(sniper_id = %sniper.id, error = %err, "enqueue failed");
                DispatchOutcome::Failed
            }
        }
    }
}
