use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Custody model of a wallet. Only server-custodied wallets can be spent
/// from by the pipeline; externally held keys are never touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletCustody {
    Server,
    External,
}

impl WalletCustody {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::External => "external",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBinding {
    pub id: Uuid,
    pub user_id: Uuid,
    pub public_key: String,
    pub custody: WalletCustody,
}

/// A user's frozen trading rule set bound to one wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SniperConfig {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_id: Uuid,
    pub is_active: bool,
    pub buy_amount_sol: Decimal,
    pub slippage_bps: u16,
    pub priority_fee_lamports: u64,
    pub mev_protection: bool,
    pub filters: SniperFilters,
    pub exits: ExitRules,
}

/// Entry filter thresholds. `None` disables the corresponding check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SniperFilters {
    pub min_volume_usd: Option<Decimal>,
    pub max_market_cap_usd: Option<Decimal>,
    pub min_holder_count: Option<u32>,
    pub max_dev_holding_pct: Option<Decimal>,
    pub max_top10_holding_pct: Option<Decimal>,
    pub require_twitter: bool,
    pub require_telegram: bool,
    pub require_website: bool,
    pub name_includes: Vec<String>,
    pub name_excludes: Vec<String>,
    pub max_migration_secs: Option<i64>,
}

impl SniperFilters {
    /// Whether evaluating this rule set consults external token analysis.
    ///
    /// Name patterns count: token name and symbol come from the metadata
    /// snapshot, not from the migration event itself.
    #[must_use]
    pub fn needs_analysis(&self) -> bool {
        self.min_volume_usd.is_some()
            || self.max_market_cap_usd.is_some()
            || self.min_holder_count.is_some()
            || self.max_dev_holding_pct.is_some()
            || self.max_top10_holding_pct.is_some()
            || self.require_twitter
            || self.require_telegram
            || self.require_website
            || !self.name_includes.is_empty()
            || !self.name_excludes.is_empty()
    }
}

/// Automated exit rules, as percentages relative to entry (e.g. a
/// `take_profit_pct` of 100 sells at double the entry price).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExitRules {
    pub take_profit_pct: Option<Decimal>,
    pub stop_loss_pct: Option<Decimal>,
    pub trailing_stop_pct: Option<Decimal>,
}

impl ExitRules {
    #[must_use]
    pub const fn any_configured(&self) -> bool {
        self.take_profit_pct.is_some()
            || self.stop_loss_pct.is_some()
            || self.trailing_stop_pct.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Selling,
    Closed,
}

impl PositionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Selling => "selling",
            Self::Closed => "closed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(Self::Open),
            "selling" => Some(Self::Selling),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Non-terminal statuses block a new buy on the same wallet/token pair.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Open | Self::Selling)
    }
}

/// One exposure to one token for one wallet.
///
/// Created exclusively by the execution worker after a confirmed buy, and
/// mutated only through status-conditional store updates. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub sniper_id: Uuid,
    pub wallet_id: Uuid,
    pub token_mint: String,
    pub entry_price: Decimal,
    pub entry_amount_sol: Decimal,
    pub token_amount: Decimal,
    pub take_profit_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub trailing_stop_pct: Option<Decimal>,
    pub highest_price_seen: Option<Decimal>,
    /// Exit parameters frozen from the config snapshot at buy time.
    pub slippage_bps: u16,
    pub priority_fee_lamports: u64,
    pub status: PositionStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_price: Option<Decimal>,
    pub exit_amount_sol: Option<Decimal>,
}

impl Position {
    /// Builds an `open` position from a confirmed buy fill, deriving the
    /// absolute take-profit/stop-loss prices from the config percentages.
    #[must_use]
    pub fn from_fill(
        sniper: &SniperConfig,
        token_mint: &str,
        entry_price: Decimal,
        sol_spent: Decimal,
        token_amount: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Self {
        let hundred = Decimal::from(100);
        let take_profit_price = sniper
            .exits
            .take_profit_pct
            .map(|pct| entry_price * (Decimal::ONE + pct / hundred));
        let stop_loss_price = sniper
            .exits
            .stop_loss_pct
            .map(|pct| entry_price * (Decimal::ONE - pct / hundred));

        Self {
            id: Uuid::new_v4(),
            sniper_id: sniper.id,
            wallet_id: sniper.wallet_id,
            token_mint: token_mint.to_string(),
            entry_price,
            entry_amount_sol: sol_spent,
            token_amount,
            take_profit_price,
            stop_loss_price,
            trailing_stop_pct: sniper.exits.trailing_stop_pct,
            highest_price_seen: None,
            slippage_bps: sniper.slippage_bps,
            priority_fee_lamports: sniper.priority_fee_lamports,
            status: PositionStatus::Open,
            opened_at,
            closed_at: None,
            exit_price: None,
            exit_amount_sol: None,
        }
    }

    /// Whether the automation engine should poll this position at all.
    #[must_use]
    pub const fn has_automation(&self) -> bool {
        self.take_profit_price.is_some()
            || self.stop_loss_price.is_some()
            || self.trailing_stop_pct.is_some()
    }
}

/// Per-event snapshot of external token analysis. Each sub-snapshot is
/// independently `None` when its provider was unavailable; the filter
/// policy table decides what that means per filter.
#[derive(Debug, Clone, Default)]
pub struct TokenAnalysis {
    pub volume: Option<VolumeSnapshot>,
    pub market: Option<MarketSnapshot>,
    pub holders: Option<HolderSnapshot>,
}

#[derive(Debug, Clone)]
pub struct VolumeSnapshot {
    pub volume_24h_usd: Decimal,
}

#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub name: String,
    pub symbol: String,
    pub market_cap_usd: Decimal,
    pub has_twitter: bool,
    pub has_telegram: bool,
    pub has_website: bool,
}

#[derive(Debug, Clone)]
pub struct HolderSnapshot {
    pub holder_count: u32,
    pub dev_holding_pct: Decimal,
    pub top10_holding_pct: Decimal,
}
