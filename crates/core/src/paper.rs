//! Simulated implementations of the execution-side seams.
//!
//! The paper exchange fills buys and sells instantly at its current quoted
//! price, with no real money involved. It backs the `run --paper` mode of
//! the binary and most of the concurrency tests in the pipeline crates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::error::SnipeError;
use crate::traits::{
    BalanceSource, BuyExecutor, BuyFill, BuyOrder, PriceSource, SellExecutor, SellFill, SellOrder,
    TokenAnalysisProvider,
};
use crate::types::{HolderSnapshot, MarketSnapshot, VolumeSnapshot, LAMPORTS_PER_SOL};

/// In-process market simulator: price book, balances, deterministic fills.
#[derive(Debug)]
pub struct PaperExchange {
    prices: Mutex<HashMap<String, Decimal>>,
    balances: Mutex<HashMap<String, u64>>,
    default_balance_lamports: u64,
    fail_buys: AtomicBool,
    fail_sells: AtomicBool,
    fill_counter: AtomicU64,
}

impl PaperExchange {
    #[must_use]
    pub fn new() -> Self {
        Self {
            prices: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
            default_balance_lamports: 10 * LAMPORTS_PER_SOL,
            fail_buys: AtomicBool::new(false),
            fail_sells: AtomicBool::new(false),
            fill_counter: AtomicU64::new(0),
        }
    }

    pub async fn set_price(&self, token_mint: &str, price: Decimal) {
        self.prices
            .lock()
            .await
            .insert(token_mint.to_string(), price);
    }

    pub async fn set_balance(&self, wallet_public_key: &str, lamports: u64) {
        self.balances
            .lock()
            .await
            .insert(wallet_public_key.to_string(), lamports);
    }

    /// Makes every subsequent buy fail with an execution error.
    pub fn set_fail_buys(&self, fail: bool) {
        self.fail_buys.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent sell fail with an execution error.
    pub fn set_fail_sells(&self, fail: bool) {
        self.fail_sells.store(fail, Ordering::SeqCst);
    }

    async fn quote(&self, token_mint: &str) -> Decimal {
        self.prices
            .lock()
            .await
            .get(token_mint)
            .copied()
            .unwrap_or(Decimal::ONE)
    }

    fn next_signature(&self, side: &str) -> String {
        let n = self.fill_counter.fetch_add(1, Ordering::SeqCst);
        format!("paper-{side}-{n}")
    }
}

impl Default for PaperExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BuyExecutor for PaperExchange {
    async fn execute_buy(&self, order: &BuyOrder) -> Result<BuyFill, SnipeError> {
        if self.fail_buys.load(Ordering::SeqCst) {
            return Err(SnipeError::Execution("paper buy rejected".to_string()));
        }
        let price = self.quote(&order.token_mint).await;
        if price <= Decimal::ZERO {
            return Err(SnipeError::Execution("paper quote is zero".to_string()));
        }
        Ok(BuyFill {
            signature: self.next_signature("buy"),
            token_amount: order.amount_sol / price,
            sol_spent: order.amount_sol,
        })
    }
}

#[async_trait]
impl SellExecutor for PaperExchange {
    async fn execute_sell(&self, order: &SellOrder) -> Result<SellFill, SnipeError> {
        if self.fail_sells.load(Ordering::SeqCst) {
            return Err(SnipeError::Execution("paper sell rejected".to_string()));
        }
        let price = self.quote(&order.token_mint).await;
        Ok(SellFill {
            signature: self.next_signature("sell"),
            sol_received: order.token_amount * price,
        })
    }
}

#[async_trait]
impl PriceSource for PaperExchange {
    async fn price_sol(&self, token_mint: &str) -> Result<Option<Decimal>, SnipeError> {
        Ok(Some(self.quote(token_mint).await))
    }
}

#[async_trait]
impl BalanceSource for PaperExchange {
    async fn balance_lamports(&self, wallet_public_key: &str) -> Result<u64, SnipeError> {
        Ok(self
            .balances
            .lock()
            .await
            .get(wallet_public_key)
            .copied()
            .unwrap_or(self.default_balance_lamports))
    }
}

/// Analysis provider with no data: every source reports unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAnalysisProvider;

#[async_trait]
impl TokenAnalysisProvider for NullAnalysisProvider {
    async fn volume(&self, _token_mint: &str) -> Result<Option<VolumeSnapshot>, SnipeError> {
        Ok(None)
    }

    async fn market(&self, _token_mint: &str) -> Result<Option<MarketSnapshot>, SnipeError> {
        Ok(None)
    }

    async fn holders(&self, _token_mint: &str) -> Result<Option<HolderSnapshot>, SnipeError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_buy(mint: &str) -> BuyOrder {
        BuyOrder {
            wallet_public_key: "W1".to_string(),
            token_mint: mint.to_string(),
            pool_address: "PoolA".to_string(),
            amount_sol: dec!(0.5),
            slippage_bps: 300,
            priority_fee_lamports: 100_000,
            mev_protection: false,
        }
    }

    #[tokio::test]
    async fn buy_fills_at_quoted_price() {
        let exchange = PaperExchange::new();
        exchange.set_price("MintA", dec!(0.25)).await;

        let fill = exchange.execute_buy(&sample_buy("MintA")).await.unwrap();

        assert_eq!(fill.sol_spent, dec!(0.5));
        assert_eq!(fill.token_amount, dec!(2));
        assert_eq!(fill.entry_price(), Some(dec!(0.25)));
    }

    #[tokio::test]
    async fn unknown_mint_quotes_at_one() {
        let exchange = PaperExchange::new();
        let fill = exchange.execute_buy(&sample_buy("Unknown")).await.unwrap();
        assert_eq!(fill.token_amount, dec!(0.5));
    }

    #[tokio::test]
    async fn sell_failure_toggle_rejects() {
        let exchange = PaperExchange::new();
        exchange.set_fail_sells(true);

        let result = exchange
            .execute_sell(&SellOrder {
                wallet_public_key: "W1".to_string(),
                token_mint: "MintA".to_string(),
                token_amount: dec!(1),
                slippage_bps: 300,
                priority_fee_lamports: 100_000,
            })
            .await;

        assert!(matches!(result, Err(SnipeError::Execution(_))));
    }
}
