//! Signal history repository

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// A persisted signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SignalRecord {
    pub id: Option<i64>,
    pub fingerprint: String,
    pub symbol: String,
    pub action: String,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub confidence: i64,
    /// RFC 3339
    pub created_at: String,
    pub expires_at: String,
    /// Open time of the signal candle, ms since epoch
    pub candle_time: i64,
    pub indicators_json: String,
    pub source: Option<String>,
    pub recorded_at: Option<i64>,
}

pub struct SignalRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SignalRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Save a signal (INSERT OR IGNORE by fingerprint).
    /// Returns `false` when the same signal was already recorded.
    pub async fn save(&self, record: &SignalRecord) -> DbResult<bool> {
        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO signal_history
                (fingerprint, symbol, action, entry, stop_loss, take_profit, confidence,
                 created_at, expires_at, candle_time, indicators_json, source)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&record.fingerprint)
        .bind(&record.symbol)
        .bind(&record.action)
        .bind(record.entry)
        .bind(record.stop_loss)
        .bind(record.take_profit)
        .bind(record.confidence)
        .bind(&record.created_at)
        .bind(&record.expires_at)
        .bind(record.candle_time)
        .bind(&record.indicators_json)
        .bind(&record.source)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Most recent signals first
    pub async fn recent(&self, limit: i64) -> DbResult<Vec<SignalRecord>> {
        let records = sqlx::query_as::<_, SignalRecord>(
            "SELECT * FROM signal_history ORDER BY candle_time DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    pub async fn for_symbol(&self, symbol: &str, limit: i64) -> DbResult<Vec<SignalRecord>> {
        let records = sqlx::query_as::<_, SignalRecord>(
            r#"SELECT * FROM signal_history
               WHERE symbol = ?
               ORDER BY candle_time DESC, id DESC
               LIMIT ?"#,
        )
        .bind(symbol.to_uppercase())
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(records)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM signal_history")
            .fetch_one(self.pool)
            .await?;
        Ok(row.0)
    }
}
