//! Database schema definitions

/// SQL to create all tables
/// Prices are stored as REAL; they are display/audit values, never summed.
pub const CREATE_TABLES: &str = r#"
-- Emitted signals, one row per (symbol, action, signal candle)
CREATE TABLE IF NOT EXISTS signal_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint TEXT NOT NULL UNIQUE,
    symbol TEXT NOT NULL,
    action TEXT NOT NULL,
    entry REAL NOT NULL,
    stop_loss REAL NOT NULL,
    take_profit REAL NOT NULL,
    confidence INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    candle_time INTEGER NOT NULL,
    indicators_json TEXT NOT NULL,
    recorded_at INTEGER DEFAULT (strftime('%s', 'now'))
);

-- ========== INDEXES ==========

CREATE INDEX IF NOT EXISTS idx_signal_symbol ON signal_history(symbol, candle_time DESC);
CREATE INDEX IF NOT EXISTS idx_signal_created ON signal_history(created_at DESC)
"#;

/// Column additions for databases created by earlier versions
pub const MIGRATIONS: &[&str] = &["ALTER TABLE signal_history ADD COLUMN source TEXT"];
