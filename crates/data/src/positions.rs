//! Position repository.
//!
//! Every state change is a status-conditional, single-row UPDATE; the
//! `rows_affected` count is the claim signal that makes concurrent
//! triggers, manual closes, and worker retries mutually exclusive without
//! holding any lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use sniper_core::{Position, PositionStatus, PositionStore, SnipeError};

#[derive(Debug, Clone)]
pub struct PgPositionStore {
    pool: PgPool,
}

impl PgPositionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const POSITION_COLUMNS: &str = r"
    id, sniper_id, wallet_id, token_mint, entry_price, entry_amount_sol,
    token_amount, take_profit_price, stop_loss_price, trailing_stop_pct,
    highest_price_seen, slippage_bps, priority_fee_lamports, status,
    opened_at, closed_at, exit_price, exit_amount_sol";

fn store_err(err: sqlx::Error) -> SnipeError {
    SnipeError::Store(err.to_string())
}

fn position_from_row(row: &PgRow) -> Result<Position, SnipeError> {
    let status_text: String = row.try_get("status").map_err(store_err)?;
    let status = PositionStatus::parse(&status_text)
        .ok_or_else(|| SnipeError::Invariant(format!("unknown position status {status_text}")))?;
    let slippage_bps: i32 = row.try_get("slippage_bps").map_err(store_err)?;
    let priority_fee: i64 = row.try_get("priority_fee_lamports").map_err(store_err)?;

    Ok(Position {
        id: row.try_get("id").map_err(store_err)?,
        sniper_id: row.try_get("sniper_id").map_err(store_err)?,
        wallet_id: row.try_get("wallet_id").map_err(store_err)?,
        token_mint: row.try_get("token_mint").map_err(store_err)?,
        entry_price: row.try_get("entry_price").map_err(store_err)?,
        entry_amount_sol: row.try_get("entry_amount_sol").map_err(store_err)?,
        token_amount: row.try_get("token_amount").map_err(store_err)?,
        take_profit_price: row.try_get("take_profit_price").map_err(store_err)?,
        stop_loss_price: row.try_get("stop_loss_price").map_err(store_err)?,
        trailing_stop_pct: row.try_get("trailing_stop_pct").map_err(store_err)?,
        highest_price_seen: row.try_get("highest_price_seen").map_err(store_err)?,
        slippage_bps: u16::try_from(slippage_bps)
            .map_err(|_| SnipeError::Invariant(format!("slippage_bps {slippage_bps} out of range")))?,
        priority_fee_lamports: u64::try_from(priority_fee).unwrap_or(0),
        status,
        opened_at: row.try_get("opened_at").map_err(store_err)?,
        closed_at: row.try_get("closed_at").map_err(store_err)?,
        exit_price: row.try_get("exit_price").map_err(store_err)?,
        exit_amount_sol: row.try_get("exit_amount_sol").map_err(store_err)?,
    })
}

#[async_trait]
impl PositionStore for PgPositionStore {
    async fn insert_open(&self, position: &Position) -> Result<(), SnipeError> {
        sqlx::query(
            r"
            INSERT INTO positions
                (id, sniper_id, wallet_id, token_mint, entry_price, entry_amount_sol,
                 token_amount, take_profit_price, stop_loss_price, trailing_stop_pct,
                 highest_price_seen, slippage_bps, priority_fee_lamports, status,
                 opened_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ",
        )
        .bind(position.id)
        .bind(position.sniper_id)
        .bind(position.wallet_id)
        .bind(&position.token_mint)
        .bind(position.entry_price)
        .bind(position.entry_amount_sol)
        .bind(position.token_amount)
        .bind(position.take_profit_price)
        .bind(position.stop_loss_price)
        .bind(position.trailing_stop_pct)
        .bind(position.highest_price_seen)
        .bind(i32::from(position.slippage_bps))
        .bind(i64::try_from(position.priority_fee_lamports).unwrap_or(i64::MAX))
        .bind(position.status.as_str())
        .bind(position.opened_at)
        .execute(&self.pool)
        .await
        .map_err(|err| SnipeError::Transient(format!("position insert failed: {err}")))?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Position>, SnipeError> {
        let row = sqlx::query(&format!(
            "SELECT {POSITION_COLUMNS} FROM positions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.as_ref().map(position_from_row).transpose()
    }

    async fn find_active(
        &self,
        wallet_id: Uuid,
        token_mint: &str,
    ) -> Result<Option<Position>, SnipeError> {
        let row = sqlx::query(&format!(
            r"
            SELECT {POSITION_COLUMNS} FROM positions
            WHERE wallet_id = $1 AND token_mint = $2 AND status IN ('open', 'selling')
            LIMIT 1
            "
        ))
        .bind(wallet_id)
        .bind(token_mint)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.as_ref().map(position_from_row).transpose()
    }

    async fn automated_open(&self) -> Result<Vec<Position>, SnipeError> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {POSITION_COLUMNS} FROM positions
            WHERE status = 'open'
              AND (take_profit_price IS NOT NULL
                   OR stop_loss_price IS NOT NULL
                   OR trailing_stop_pct IS NOT NULL)
            ORDER BY opened_at ASC
            "
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter().map(position_from_row).collect()
    }

    async fn begin_sell(&self, id: Uuid) -> Result<bool, SnipeError> {
        let result = sqlx::query(
            "UPDATE positions SET status = 'selling' WHERE id = $1 AND status = 'open'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn finish_sell(
        &self,
        id: Uuid,
        exit_price: Decimal,
        sol_received: Decimal,
        closed_at: DateTime<Utc>,
    ) -> Result<bool, SnipeError> {
        let result = sqlx::query(
            r"
            UPDATE positions
            SET status = 'closed', exit_price = $2, exit_amount_sol = $3, closed_at = $4
            WHERE id = $1 AND status = 'selling'
            ",
        )
        .bind(id)
        .bind(exit_price)
        .bind(sol_received)
        .bind(closed_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn abort_sell(&self, id: Uuid) -> Result<bool, SnipeError> {
        let result = sqlx::query(
            "UPDATE positions SET status = 'open' WHERE id = $1 AND status = 'selling'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_peak_price(&self, id: Uuid, price: Decimal) -> Result<(), SnipeError> {
        sqlx::query(
            r"
            UPDATE positions SET highest_price_seen = $2
            WHERE id = $1
              AND (highest_price_seen IS NULL OR highest_price_seen < $2)
            ",
        )
        .bind(id)
        .bind(price)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }
}
