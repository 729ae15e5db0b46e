//! Position automation engine.
//!
//! A fixed-interval poll loop over every open position with at least one
//! automation rule. Prices are resolved once per distinct mint per tick.
//! A fired trigger claims the position through the conditional
//! `open -> selling` transition; losing that claim means another tick, a
//! worker retry, or a manual close got there first, and the loser walks
//! away silently. Manual closes share the exact same claim and revert
//! path, so no two paths can double-sell.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use sniper_core::{
    AutomationConfig, Notifier, NotificationEvent, Position, PositionStore, PriceSource,
    SellExecutor, SellOrder, SnipeError, SniperStore,
};

use crate::triggers::{check_triggers, SellTrigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed { exit_price: Decimal },
    /// Sell failed; the position reverted to `open` and is cooling down.
    Reverted,
    /// The conditional transition reported zero rows: someone else owns
    /// this close.
    AlreadyClaimed,
    CoolingDown,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub polled: usize,
    pub priced: usize,
    pub triggered: usize,
    pub closed: usize,
    pub reverted: usize,
    pub contended: usize,
    pub cooling: usize,
}

pub struct PositionAutomationEngine {
    positions: Arc<dyn PositionStore>,
    snipers: Arc<dyn SniperStore>,
    prices: Arc<dyn PriceSource>,
    seller: Arc<dyn SellExecutor>,
    notifier: Arc<dyn Notifier>,
    config: AutomationConfig,
    cooldowns: Mutex<HashMap<Uuid, Instant>>,
}

impl PositionAutomationEngine {
    #[must_use]
    pub fn new(
        positions: Arc<dyn PositionStore>,
        snipers: Arc<dyn SniperStore>,
        prices: Arc<dyn PriceSource>,
        seller: Arc<dyn SellExecutor>,
        notifier: Arc<dyn Notifier>,
        config: AutomationConfig,
    ) -> Self {
        Self {
            positions,
            snipers,
            prices,
            seller,
            notifier,
            config,
            cooldowns: Mutex::new(HashMap::new()),
        }
    }

    /// Runs the poll loop until shutdown is signalled.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_millis(self.config.poll_interval_ms.max(50));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(poll_ms = period.as_millis() as u64, "position automation engine started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(report) if report.triggered > 0 => {
                            tracing::info!(
                                polled = report.polled,
                                triggered = report.triggered,
                                closed = report.closed,
                                reverted = report.reverted,
                                contended = report.contended,
                                "automation tick"
                            );
                        }
                        Ok(_) => {}
                        Err(err) => {
                            tracing::error!(error = %err, "automation tick failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("position automation engine stopped");
    }

    /// One poll pass over all automated open positions.
    ///
    /// # Errors
    /// Only the initial position sweep can fail the tick; everything per
    /// position is isolated and counted.
    pub async fn tick(&self) -> Result<TickReport, SnipeError> {
        let positions = self.positions.automated_open().await?;
        let mut report = TickReport {
            polled: positions.len(),
            ..TickReport::default()
        };
        if positions.is_empty() {
            return Ok(report);
        }

        let mints: HashSet<String> = positions
            .iter()
            .map(|position| position.token_mint.clone())
            .collect();
        let prices = self.resolve_prices(&mints).await;

        for mut position in positions {
            let Some(&price) = prices.get(&position.token_mint) else {
                continue;
            };
            report.priced += 1;

            if position
                .highest_price_seen
                .is_none_or(|peak| price > peak)
            {
                if let Err(err) = self.positions.record_peak_price(position.id, price).await {
                    tracing::warn!(position_id = %position.id, error = %err, "peak update failed");
                }
                position.highest_price_seen = Some(price);
            }

            let Some(trigger) = check_triggers(&position, price) else {
                continue;
            };
            report.triggered += 1;

            match self.try_close(&position, price, trigger).await {
                Ok(CloseOutcome::Closed { .. }) => report.closed += 1,
                Ok(CloseOutcome::Reverted) => report.reverted += 1,
                Ok(CloseOutcome::AlreadyClaimed) => report.contended += 1,
                Ok(CloseOutcome::CoolingDown) => report.cooling += 1,
                Err(err) => {
                    tracing::error!(position_id = %position.id, error = %err, "close attempt failed");
                }
            }
        }

        Ok(report)
    }

    /// User-initiated close. Identical claim and revert path as the
    /// automated triggers, so the two can never race into a double sell.
    ///
    /// # Errors
    /// Returns an error for an unknown position or a store failure.
    pub async fn close_position(&self, position_id: Uuid) -> Result<CloseOutcome, SnipeError> {
        let Some(position) = self.positions.get(position_id).await? else {
            return Err(SnipeError::Invariant(format!(
                "position {position_id} does not exist"
            )));
        };

        // Best-effort price for the exit record; the fill reports the
        // authoritative proceeds either way.
        let price = match self.prices.price_sol(&position.token_mint).await {
            Ok(Some(price)) => price,
            _ => position.entry_price,
        };

        self.try_close(&position, price, SellTrigger::Manual).await
    }

    async fn resolve_prices(&self, mints: &HashSet<String>) -> HashMap<String, Decimal> {
        let timeout = Duration::from_millis(self.config.price_timeout_ms.max(50));
        let lookups = mints.iter().map(|mint| {
            let prices = Arc::clone(&self.prices);
            let mint = mint.clone();
            async move {
                match tokio::time::timeout(timeout, prices.price_sol(&mint)).await {
                    Ok(Ok(Some(price))) => Some((mint, price)),
                    Ok(Ok(None)) => {
                        tracing::debug!(token = %mint, "no price this tick");
                        None
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(token = %mint, error = %err, "price lookup failed");
                        None
                    }
                    Err(_) => {
                        tracing::warn!(token = %mint, "price lookup timed out");
                        None
                    }
                }
            }
        });

        futures::future::join_all(lookups)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn try_close(
        &self,
        position: &Position,
        price: Decimal,
        trigger: SellTrigger,
    ) -> Result<CloseOutcome, SnipeError> {
        if self.in_cooldown(position.id).await {
            tracing::debug!(position_id = %position.id, "position cooling down after failed sell");
            return Ok(CloseOutcome::CoolingDown);
        }

        // The claim. Zero rows affected means another trigger, a manual
        // close, or a worker retry already owns this position.
        if !self.positions.begin_sell(position.id).await? {
            return Ok(CloseOutcome::AlreadyClaimed);
        }

        self.notifier.notify(NotificationEvent::SellTriggered {
            position_id: position.id,
            token_mint: position.token_mint.clone(),
            trigger: trigger.as_str().to_string(),
        });
        tracing::info!(
            position_id = %position.id,
            token = %position.token_mint,
            trigger = trigger.as_str(),
            price = %price,
            "sell triggered"
        );

        let wallet = match self.snipers.wallet(position.wallet_id).await {
            Ok(Some(wallet)) => wallet,
            Ok(None) => {
                tracing::warn!(
                    position_id = %position.id,
                    wallet_id = %position.wallet_id,
                    "wallet record vanished, reverting position"
                );
                return self.revert(position, "wallet record missing").await;
            }
            Err(err) => {
                tracing::warn!(position_id = %position.id, error = %err, "wallet lookup failed, reverting");
                return self.revert(position, "wallet lookup failed").await;
            }
        };

        let order = SellOrder {
            wallet_public_key: wallet.public_key,
            token_mint: position.token_mint.clone(),
            token_amount: position.token_amount,
            slippage_bps: position.slippage_bps,
            priority_fee_lamports: position.priority_fee_lamports,
        };
        match self.seller.execute_sell(&order).await {
            Ok(fill) => {
                let exit_price = if position.token_amount > Decimal::ZERO {
                    fill.sol_received / position.token_amount
                } else {
                    price
                };
                if !self
                    .positions
                    .finish_sell(position.id, exit_price, fill.sol_received, Utc::now())
                    .await?
                {
                    // The claim was ours; losing it here means the store
                    // was mutated outside the transition discipline.
                    return Err(SnipeError::Invariant(format!(
                        "position {} lost its selling claim before close",
                        position.id
                    )));
                }
                self.clear_cooldown(position.id).await;
                self.notifier.notify(NotificationEvent::PositionClosed {
                    position_id: position.id,
                    token_mint: position.token_mint.clone(),
                    exit_price,
                    sol_received: fill.sol_received,
                });
                tracing::info!(
                    position_id = %position.id,
                    exit_price = %exit_price,
                    signature = %fill.signature,
                    "position closed"
                );
                Ok(CloseOutcome::Closed { exit_price })
            }
            Err(err) => {
                tracing::warn!(position_id = %position.id, error = %err, "sell failed, reverting");
                self.notifier.notify(NotificationEvent::SellFailed {
                    position_id: position.id,
                    token_mint: position.token_mint.clone(),
                    reason: err.to_string(),
                });
                self.revert(position, "sell failed").await
            }
        }
    }

    async fn revert(&self, position: &Position, why: &str) -> Result<CloseOutcome, SnipeError> {
        if !self.positions.abort_sell(position.id).await? {
            return Err(SnipeError::Invariant(format!(
                "position {} could not revert to open ({why})",
                position.id
            )));
        }
        self.set_cooldown(position.id).await;
        Ok(CloseOutcome::Reverted)
    }

    async fn in_cooldown(&self, position_id: Uuid) -> bool {
        let cooldown = Duration::from_secs(self.config.sell_cooldown_secs);
        if cooldown.is_zero() {
            return false;
        }
        self.cooldowns
            .lock()
            .await
            .get(&position_id)
            .is_some_and(|failed_at| failed_at.elapsed() < cooldown)
    }

    async fn set_cooldown(&self, position_id: Uuid) {
        self.cooldowns
            .lock()
            .await
            .insert(position_id, Instant::now());
    }

    async fn clear_cooldown(&self, position_id: Uuid) {
        self.cooldowns.lock().await.remove(&position_id);
    }
}
