use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::SnipeError;
use crate::events::NotificationEvent;
use crate::types::{
    HolderSnapshot, MarketSnapshot, Position, SniperConfig, VolumeSnapshot, WalletBinding,
};

/// Shared key/value store offering atomic set-if-absent-with-expiry.
///
/// The single primitive every exactly-once guarantee in the pipeline is
/// built on. Keys carry a TTL so a crashed holder cannot wedge a
/// wallet/token pair forever.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Atomically claims `key` for `holder` if nobody holds it.
    /// Returns `false` on contention.
    async fn try_acquire(&self, key: &str, holder: &str, ttl: Duration)
        -> Result<bool, SnipeError>;

    /// Releases `key` only if `holder` still owns it.
    async fn release(&self, key: &str, holder: &str) -> Result<(), SnipeError>;

    /// Current holder of `key`, if any.
    async fn holder(&self, key: &str) -> Result<Option<String>, SnipeError>;
}

/// Read access to sniper configurations and their wallet bindings, plus
/// the narrow write surface the core is allowed: counters and `is_active`.
#[async_trait]
pub trait SniperStore: Send + Sync {
    /// All active configurations, each with its wallet binding when the
    /// wallet record exists. A `None` wallet is surfaced so the caller can
    /// count and reject the misconfiguration instead of silently skipping.
    async fn active_with_wallets(
        &self,
    ) -> Result<Vec<(SniperConfig, Option<WalletBinding>)>, SnipeError>;

    async fn is_active(&self, sniper_id: Uuid) -> Result<bool, SnipeError>;

    async fn wallet(&self, wallet_id: Uuid) -> Result<Option<WalletBinding>, SnipeError>;

    /// Flips `is_active` off, recording why.
    async fn deactivate(&self, sniper_id: Uuid, reason: &str) -> Result<(), SnipeError>;

    async fn record_success(&self, sniper_id: Uuid) -> Result<(), SnipeError>;

    async fn record_failure(&self, sniper_id: Uuid) -> Result<(), SnipeError>;
}

/// Position persistence. All state changes are status-conditional,
/// single-row compare-and-swap updates; the `bool` returns report whether
/// this caller won the transition.
#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn insert_open(&self, position: &Position) -> Result<(), SnipeError>;

    async fn get(&self, id: Uuid) -> Result<Option<Position>, SnipeError>;

    /// Any non-terminal position on the `(wallet, mint)` pair.
    async fn find_active(
        &self,
        wallet_id: Uuid,
        token_mint: &str,
    ) -> Result<Option<Position>, SnipeError>;

    /// Open positions with at least one automation rule configured.
    async fn automated_open(&self) -> Result<Vec<Position>, SnipeError>;

    /// `open -> selling`. Returns `false` when another claimant already
    /// moved the position out of `open`.
    async fn begin_sell(&self, id: Uuid) -> Result<bool, SnipeError>;

    /// `selling -> closed`, recording the exit.
    async fn finish_sell(
        &self,
        id: Uuid,
        exit_price: Decimal,
        sol_received: Decimal,
        closed_at: DateTime<Utc>,
    ) -> Result<bool, SnipeError>;

    /// `selling -> open` revert after a failed sell; the position remains
    /// eligible for future triggers.
    async fn abort_sell(&self, id: Uuid) -> Result<bool, SnipeError>;

    /// Monotonically raises `highest_price_seen`.
    async fn record_peak_price(&self, id: Uuid, price: Decimal) -> Result<(), SnipeError>;
}

/// Parameters for the external buy primitive. Signing happens entirely on
/// the other side of this seam; the core never sees key material.
#[derive(Debug, Clone)]
pub struct BuyOrder {
    pub wallet_public_key: String,
    pub token_mint: String,
    pub pool_address: String,
    pub amount_sol: Decimal,
    pub slippage_bps: u16,
    pub priority_fee_lamports: u64,
    pub mev_protection: bool,
}

#[derive(Debug, Clone)]
pub struct BuyFill {
    pub signature: String,
    pub token_amount: Decimal,
    pub sol_spent: Decimal,
}

impl BuyFill {
    /// Effective entry price in SOL per token, when the fill is non-empty.
    #[must_use]
    pub fn entry_price(&self) -> Option<Decimal> {
        if self.token_amount > Decimal::ZERO {
            Some(self.sol_spent / self.token_amount)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct SellOrder {
    pub wallet_public_key: String,
    pub token_mint: String,
    pub token_amount: Decimal,
    pub slippage_bps: u16,
    pub priority_fee_lamports: u64,
}

#[derive(Debug, Clone)]
pub struct SellFill {
    pub signature: String,
    pub sol_received: Decimal,
}

#[async_trait]
pub trait BuyExecutor: Send + Sync {
    async fn execute_buy(&self, order: &BuyOrder) -> Result<BuyFill, SnipeError>;
}

#[async_trait]
pub trait SellExecutor: Send + Sync {
    async fn execute_sell(&self, order: &SellOrder) -> Result<SellFill, SnipeError>;
}

#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn balance_lamports(&self, wallet_public_key: &str) -> Result<u64, SnipeError>;
}

/// Live price lookup. `Ok(None)` means the feed has no price for the mint;
/// callers skip the position for this tick rather than erroring.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn price_sol(&self, token_mint: &str) -> Result<Option<Decimal>, SnipeError>;
}

/// External token analysis providers. Each source independently returns
/// `Ok(None)` for "unavailable"; the filter policy table decides whether
/// that allows or rejects per filter.
#[async_trait]
pub trait TokenAnalysisProvider: Send + Sync {
    async fn volume(&self, token_mint: &str) -> Result<Option<VolumeSnapshot>, SnipeError>;
    async fn market(&self, token_mint: &str) -> Result<Option<MarketSnapshot>, SnipeError>;
    async fn holders(&self, token_mint: &str) -> Result<Option<HolderSnapshot>, SnipeError>;
}

/// Fire-and-forget notification fan-out. Implementations must not block
/// and must swallow delivery failures.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: NotificationEvent);
}

/// Notifier that drops everything. Useful where notifications are not
/// wired up (tests, one-shot tools).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: NotificationEvent) {}
}
