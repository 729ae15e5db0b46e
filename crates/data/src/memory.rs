//! In-process stores with the exact conditional-transition semantics of
//! the Postgres repositories. They back the concurrency tests in the
//! pipeline crates and the binary's paper mode.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use sniper_core::{
    Position, PositionStatus, PositionStore, SnipeError, SniperConfig, SniperStore, WalletBinding,
};

#[derive(Debug, Default)]
struct SniperState {
    snipers: HashMap<Uuid, SniperConfig>,
    wallets: HashMap<Uuid, WalletBinding>,
    success: HashMap<Uuid, u32>,
    failure: HashMap<Uuid, u32>,
    deactivation_reason: HashMap<Uuid, String>,
}

#[derive(Debug, Default)]
pub struct MemorySniperStore {
    state: Mutex<SniperState>,
}

impl MemorySniperStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_wallet(&self, wallet: WalletBinding) {
        self.state.lock().await.wallets.insert(wallet.id, wallet);
    }

    pub async fn insert_sniper(&self, sniper: SniperConfig) {
        self.state.lock().await.snipers.insert(sniper.id, sniper);
    }

    pub async fn success_count(&self, sniper_id: Uuid) -> u32 {
        *self
            .state
            .lock()
            .await
            .success
            .get(&sniper_id)
            .unwrap_or(&0)
    }

    pub async fn failure_count(&self, sniper_id: Uuid) -> u32 {
        *self
            .state
            .lock()
            .await
            .failure
            .get(&sniper_id)
            .unwrap_or(&0)
    }

    pub async fn deactivation_reason(&self, sniper_id: Uuid) -> Option<String> {
        self.state
            .lock()
            .await
            .deactivation_reason
            .get(&sniper_id)
            .cloned()
    }
}

#[async_trait]
impl SniperStore for MemorySniperStore {
    async fn active_with_wallets(
        &self,
    ) -> Result<Vec<(SniperConfig, Option<WalletBinding>)>, SnipeError> {
        let state = self.state.lock().await;
        Ok(state
            .snipers
            .values()
            .filter(|sniper| sniper.is_active)
            .map(|sniper| {
                let wallet = state.wallets.get(&sniper.wallet_id).cloned();
                (sniper.clone(), wallet)
            })
            .collect())
    }

    async fn is_active(&self, sniper_id: Uuid) -> Result<bool, SnipeError> {
        Ok(self
            .state
            .lock()
            .await
            .snipers
            .get(&sniper_id)
            .is_some_and(|sniper| sniper.is_active))
    }

    async fn wallet(&self, wallet_id: Uuid) -> Result<Option<WalletBinding>, SnipeError> {
        Ok(self.state.lock().await.wallets.get(&wallet_id).cloned())
    }

    async fn deactivate(&self, sniper_id: Uuid, reason: &str) -> Result<(), SnipeError> {
        let mut state = self.state.lock().await;
        if let Some(sniper) = state.snipers.get_mut(&sniper_id) {
            sniper.is_active = false;
        }
        state
            .deactivation_reason
            .insert(sniper_id, reason.to_string());
        Ok(())
    }

    async fn record_success(&self, sniper_id: Uuid) -> Result<(), SnipeError> {
        *self
            .state
            .lock()
            .await
            .success
            .entry(sniper_id)
            .or_insert(0) += 1;
        Ok(())
    }

    async fn record_failure(&self, sniper_id: Uuid) -> Result<(), SnipeError> {
        *self
            .state
            .lock()
            .await
            .failure
            .entry(sniper_id)
            .or_insert(0) += 1;
        Ok(())
    }
}

/// Positions under one mutex; each conditional transition checks and
/// swaps the status atomically while the lock is held, mirroring the
/// single-row `UPDATE ... WHERE status = <expected>` queries.
#[derive(Debug, Default)]
pub struct MemoryPositionStore {
    positions: Mutex<HashMap<Uuid, Position>>,
}

impl MemoryPositionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<Position> {
        self.positions.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl PositionStore for MemoryPositionStore {
    async fn insert_open(&self, position: &Position) -> Result<(), SnipeError> {
        self.positions
            .lock()
            .await
            .insert(position.id, position.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Position>, SnipeError> {
        Ok(self.positions.lock().await.get(&id).cloned())
    }

    async fn find_active(
        &self,
        wallet_id: Uuid,
        token_mint: &str,
    ) -> Result<Option<Position>, SnipeError> {
        Ok(self
            .positions
            .lock()
            .await
            .values()
            .find(|position| {
                position.wallet_id == wallet_id
                    && position.token_mint == token_mint
                    && position.status.is_active()
            })
            .cloned())
    }

    async fn automated_open(&self) -> Result<Vec<Position>, SnipeError> {
        let mut positions: Vec<Position> = self
            .positions
            .lock()
            .await
            .values()
            .filter(|position| position.status == PositionStatus::Open && position.has_automation())
            .cloned()
            .collect();
        positions.sort_by_key(|position| position.opened_at);
        Ok(positions)
    }

    async fn begin_sell(&self, id: Uuid) -> Result<bool, SnipeError> {
        let mut positions = self.positions.lock().await;
        match positions.get_mut(&id) {
            Some(position) if position.status == PositionStatus::Open => {
                position.status = PositionStatus::Selling;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finish_sell(
        &self,
        id: Uuid,
        exit_price: Decimal,
        sol_received: Decimal,
        closed_at: DateTime<Utc>,
    ) -> Result<bool, SnipeError> {
        let mut positions = self.positions.lock().await;
        match positions.get_mut(&id) {
            Some(position) if position.status == PositionStatus::Selling => {
                position.status = PositionStatus::Closed;
                position.exit_price = Some(exit_price);
                position.exit_amount_sol = Some(sol_received);
                position.closed_at = Some(closed_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn abort_sell(&self, id: Uuid) -> Result<bool, SnipeError> {
        let mut positions = self.positions.lock().await;
        match positions.get_mut(&id) {
            Some(position) if position.status == PositionStatus::Selling => {
                position.status = PositionStatus::Open;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_peak_price(&self, id: Uuid, price: Decimal) -> Result<(), SnipeError> {
        let mut positions = self.positions.lock().await;
        if let Some(position) = positions.get_mut(&id) {
            if position.highest_price_seen.is_none_or(|peak| peak < price) {
                position.highest_price_seen = Some(price);
            }
        }
        Ok(())
    }
}
