use super::models::*;
use crate::error::{AppError, AppResult};
use sqlx::SqlitePool;
use tracing::{debug, info};
#[cfg(test)]
use chrono::{DateTime, Utc};
#[cfg(test)]
use rust_decimal::Decimal;
#[cfg(test)]
use sqlx::FromRow;
#[cfg(test)]
use std::str::FromStr;

/// Ledger repository - durable cursor, executed transfers and error ledger
///
/// Every statement is parameterised: transaction ids and decoded addresses
/// come straight from the source chain.
pub struct LedgerRepository {
    pub pool: SqlitePool,
}

#[cfg(test)]
#[derive(FromRow)]
struct ExecutedRow {
    source_address: String,
    target_address: String,
    source_tx_id: String,
    destination_tx_id: String,
    timestamp: DateTime<Utc>,
    amount: i64,
    amount_fee: String,
}

#[cfg(test)]
impl TryFrom<ExecutedRow> for ExecutedTransfer {
    type Error = AppError;

    fn try_from(row: ExecutedRow) -> AppResult<Self> {
        Ok(ExecutedTransfer {
            source_address: row.source_address,
            destination_address: row.target_address,
            source_tx_id: row.source_tx_id,
            destination_tx_id: row.destination_tx_id,
            timestamp: row.timestamp,
            amount: row.amount,
            amount_fee: Decimal::from_str(&row.amount_fee)?,
        })
    }
}

#[cfg(test)]
#[derive(FromRow)]
struct ErrorRow {
    source_address: String,
    target_address: Option<String>,
    destination_tx_id: Option<String>,
    source_tx_id: String,
    timestamp: DateTime<Utc>,
    amount: String,
    error: String,
    exception: Option<String>,
}

#[cfg(test)]
impl TryFrom<ErrorRow> for ErrorRecord {
    type Error = AppError;

    fn try_from(row: ErrorRow) -> AppResult<Self> {
        let kind = FaultKind::from_message(&row.error)
            .ok_or_else(|| AppError::Internal(format!("Unknown fault in error ledger: {}", row.error)))?;

        Ok(ErrorRecord {
            source_address: row.source_address,
            destination_address: row.target_address,
            destination_tx_id: row.destination_tx_id,
            source_tx_id: row.source_tx_id,
            timestamp: row.timestamp,
            amount: Decimal::from_str(&row.amount)?,
            kind,
            exception: row.exception,
        })
    }
}

fn to_db_height(height: u64) -> AppResult<i64> {
    i64::try_from(height).map_err(|_| AppError::InvalidInput(format!("Height out of range: {}", height)))
}

fn from_db_height(height: i64) -> AppResult<u64> {
    u64::try_from(height).map_err(|_| AppError::Internal(format!("Negative height stored: {}", height)))
}

impl LedgerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========== CURSOR ==========

    pub async fn load_height(&self, chain: &str) -> AppResult<Option<u64>> {
        let height: Option<i64> = sqlx::query_scalar("SELECT height FROM heights WHERE chain = ?1")
            .bind(chain)
            .fetch_optional(&self.pool)
            .await?;

        height.map(from_db_height).transpose()
    }

    /// Return the stored cursor, inserting `start_height` if the chain has no row yet
    pub async fn seed_height(&self, chain: &str, start_height: u64) -> AppResult<u64> {
        sqlx::query("INSERT INTO heights (chain, height) VALUES (?1, ?2) ON CONFLICT(chain) DO NOTHING")
            .bind(chain)
            .bind(to_db_height(start_height)?)
            .execute(&self.pool)
            .await?;

        let height = self
            .load_height(chain)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Cursor row for {} vanished", chain)))?;

        info!("Cursor for {} at height {}", chain, height);
        Ok(height)
    }

    pub async fn store_height(&self, chain: &str, height: u64) -> AppResult<()> {
        let result = sqlx::query("UPDATE heights SET height = ?1 WHERE chain = ?2")
            .bind(to_db_height(height)?)
            .bind(chain)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Internal(format!("No cursor row for chain {}", chain)));
        }

        debug!("Persisted cursor {} = {}", chain, height);
        Ok(())
    }

    // ========== EXECUTED TRANSFERS ==========

    pub async fn is_executed(&self, source_tx_id: &str) -> AppResult<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM executed WHERE source_tx_id = ?1 LIMIT 1")
                .bind(source_tx_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(found.is_some())
    }

    /// Append a settled transfer. Fails if the source tx id already has a row.
    pub async fn record_executed(&self, transfer: &ExecutedTransfer) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO executed (
                source_address, target_address, source_tx_id, destination_tx_id,
                timestamp, amount, amount_fee
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&transfer.source_address)
        .bind(&transfer.destination_address)
        .bind(&transfer.source_tx_id)
        .bind(&transfer.destination_tx_id)
        .bind(transfer.timestamp)
        .bind(transfer.amount)
        .bind(transfer.amount_fee.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[cfg(test)]
    pub async fn executed_for(&self, source_tx_id: &str) -> AppResult<Option<ExecutedTransfer>> {
        let row = sqlx::query_as::<_, ExecutedRow>(
            r#"
            SELECT source_address, target_address, source_tx_id, destination_tx_id,
                   timestamp, amount, amount_fee
            FROM executed
            WHERE source_tx_id = ?1
            "#,
        )
        .bind(source_tx_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ExecutedTransfer::try_from).transpose()
    }

    pub async fn count_executed(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM executed")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ========== ERROR LEDGER ==========

    pub async fn record_error(&self, record: &ErrorRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO errors (
                source_address, target_address, destination_tx_id, source_tx_id,
                timestamp, amount, error, exception
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&record.source_address)
        .bind(&record.destination_address)
        .bind(&record.destination_tx_id)
        .bind(&record.source_tx_id)
        .bind(record.timestamp)
        .bind(record.amount.to_string())
        .bind(record.kind.message())
        .bind(&record.exception)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[cfg(test)]
    pub async fn errors_for(&self, source_tx_id: &str) -> AppResult<Vec<ErrorRecord>> {
        let rows = sqlx::query_as::<_, ErrorRow>(
            r#"
            SELECT source_address, target_address, destination_tx_id, source_tx_id,
                   timestamp, amount, error, exception
            FROM errors
            WHERE source_tx_id = ?1
            ORDER BY id
            "#,
        )
        .bind(source_tx_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ErrorRecord::try_from).collect()
    }

    pub async fn count_errors(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM errors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
