//! Sniper configuration repository.
//!
//! Read access to active configurations with their wallet bindings, plus
//! the narrow write surface the pipeline is allowed: outcome counters and
//! the `is_active` flip used by automatic deactivation.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use sniper_core::{
    ExitRules, SnipeError, SniperConfig, SniperFilters, SniperStore, WalletBinding, WalletCustody,
};

#[derive(Debug, Clone)]
pub struct PgSniperStore {
    pool: PgPool,
}

impl PgSniperStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_err(err: sqlx::Error) -> SnipeError {
    SnipeError::Store(err.to_string())
}

fn custody_from_text(value: &str) -> Result<WalletCustody, SnipeError> {
    match value {
        "server" => Ok(WalletCustody::Server),
        "external" => Ok(WalletCustody::External),
        other => Err(SnipeError::Invariant(format!(
            "unknown wallet custody {other}"
        ))),
    }
}

fn sniper_from_row(row: &PgRow) -> Result<SniperConfig, SnipeError> {
    let filters_json: serde_json::Value = row.try_get("filters").map_err(store_err)?;
    let filters: SniperFilters = serde_json::from_value(filters_json)
        .map_err(|err| SnipeError::Invariant(format!("malformed filter snapshot: {err}")))?;
    let exits_json: serde_json::Value = row.try_get("exits").map_err(store_err)?;
    let exits: ExitRules = serde_json::from_value(exits_json)
        .map_err(|err| SnipeError::Invariant(format!("malformed exit rules: {err}")))?;
    let slippage_bps: i32 = row.try_get("slippage_bps").map_err(store_err)?;
    let priority_fee: i64 = row.try_get("priority_fee_lamports").map_err(store_err)?;

    Ok(SniperConfig {
        id: row.try_get("id").map_err(store_err)?,
        user_id: row.try_get("user_id").map_err(store_err)?,
        wallet_id: row.try_get("wallet_id").map_err(store_err)?,
        is_active: row.try_get("is_active").map_err(store_err)?,
        buy_amount_sol: row.try_get("buy_amount_sol").map_err(store_err)?,
        slippage_bps: u16::try_from(slippage_bps)
            .map_err(|_| SnipeError::Invariant(format!("slippage_bps {slippage_bps} out of range")))?,
        priority_fee_lamports: u64::try_from(priority_fee).unwrap_or(0),
        mev_protection: row.try_get("mev_protection").map_err(store_err)?,
        filters,
        exits,
    })
}

fn wallet_from_row(row: &PgRow) -> Result<Option<WalletBinding>, SnipeError> {
    let wallet_id: Option<Uuid> = row.try_get("w_id").map_err(store_err)?;
    let Some(id) = wallet_id else {
        return Ok(None);
    };
    let custody_text: String = row.try_get("w_custody").map_err(store_err)?;
    Ok(Some(WalletBinding {
        id,
        user_id: row.try_get("w_user_id").map_err(store_err)?,
        public_key: row.try_get("w_public_key").map_err(store_err)?,
        custody: custody_from_text(&custody_text)?,
    }))
}

#[async_trait]
impl SniperStore for PgSniperStore {
    async fn active_with_wallets(
        &self,
    ) -> Result<Vec<(SniperConfig, Option<WalletBinding>)>, SnipeError> {
        let rows = sqlx::query(
            r"
            SELECT s.id, s.user_id, s.wallet_id, s.is_active, s.buy_amount_sol,
                   s.slippage_bps, s.priority_fee_lamports, s.mev_protection,
                   s.filters, s.exits,
                   w.id AS w_id, w.user_id AS w_user_id,
                   w.public_key AS w_public_key, w.custody AS w_custody
            FROM snipers s
            LEFT JOIN wallets w ON w.id = s.wallet_id
            WHERE s.is_active = TRUE
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(|row| Ok((sniper_from_row(row)?, wallet_from_row(row)?)))
            .collect()
    }

    async fn is_active(&self, sniper_id: Uuid) -> Result<bool, SnipeError> {
        let row = sqlx::query("SELECT is_active FROM snipers WHERE id = $1")
            .bind(sniper_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(row
            .map(|r| r.try_get("is_active"))
            .transpose()
            .map_err(store_err)?
            .unwrap_or(false))
    }

    async fn wallet(&self, wallet_id: Uuid) -> Result<Option<WalletBinding>, SnipeError> {
        let row = sqlx::query(
            r"
            SELECT id AS w_id, user_id AS w_user_id,
                   public_key AS w_public_key, custody AS w_custody
            FROM wallets WHERE id = $1
            ",
        )
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        match row {
            Some(row) => wallet_from_row(&row),
            None => Ok(None),
        }
    }

    async fn deactivate(&self, sniper_id: Uuid, reason: &str) -> Result<(), SnipeError> {
        sqlx::query(
            r"
            UPDATE snipers
            SET is_active = FALSE, deactivation_reason = $2, updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(sniper_id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn record_success(&self, sniper_id: Uuid) -> Result<(), SnipeError> {
        sqlx::query(
            "UPDATE snipers SET success_count = success_count + 1, updated_at = now() WHERE id = $1",
        )
        .bind(sniper_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn record_failure(&self, sniper_id: Uuid) -> Result<(), SnipeError> {
        sqlx::query(
            "UPDATE snipers SET failure_count = failure_count + 1, updated_at = now() WHERE id = $1",
        )
        .bind(sniper_id)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }
}
