//! Scanner: evaluate a watchlist of symbols, once or on a refresh loop
//!
//! Each symbol is fetched and evaluated on its own task. A failing fetch only
//! affects that symbol. The continuous loop records new signals in the
//! history table and exposes its state through [`ScanProgress`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use persistence::repository::signals::{SignalRecord, SignalRepository};
use persistence::{DbResult, SqlitePool};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::api::CandleSource;
use crate::strategy::SignalEngine;
use crate::types::Signal;

pub const DEFAULT_SYMBOLS: [&str; 7] = [
    "EURUSD", "GBPUSD", "USDJPY", "AUDUSD", "USDCAD", "USDCHF", "NZDUSD",
];
pub const DEFAULT_CANDLES: usize = 500;
pub const DEFAULT_INTERVAL_MINUTES: i64 = 5;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_REFRESH_SECS: u64 = 300;

const MAX_LATEST_SIGNALS: usize = 50;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub symbols: Vec<String>,
    /// Candles requested per symbol
    pub candles: usize,
    pub interval_minutes: i64,
    /// Seed for the synthetic forex feed
    pub seed: u64,
    pub refresh_secs: u64,
    /// Stop the continuous loop after this many cycles (`None` = until cancelled)
    pub max_cycles: Option<u32>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            candles: DEFAULT_CANDLES,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            seed: DEFAULT_SEED,
            refresh_secs: DEFAULT_REFRESH_SECS,
            max_cycles: None,
        }
    }
}

/// Split a comma separated symbol list, uppercased, blanks and duplicates dropped.
pub fn parse_symbols(list: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for s in list.split(',') {
        let s = s.trim().to_uppercase();
        if !s.is_empty() && !symbols.contains(&s) {
            symbols.push(s);
        }
    }
    symbols
}

// ---------------------------------------------------------------------------
// One-shot scan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanFailure {
    pub symbol: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanReport {
    pub signals: Vec<Signal>,
    /// Symbols evaluated without a setup on the last candle
    pub no_signal: Vec<String>,
    pub failed: Vec<ScanFailure>,
    /// Feed that served each symbol's candles
    pub sources: BTreeMap<String, String>,
}

impl ScanReport {
    pub fn source_of(&self, symbol: &str) -> Option<&str> {
        self.sources.get(symbol).map(String::as_str)
    }
}

enum Outcome {
    Signal(Box<Signal>),
    NoSignal,
    Failed(String),
}

/// Fetch and evaluate every symbol concurrently. Results keep the input order.
pub async fn scan_once(
    source: Arc<dyn CandleSource>,
    symbols: &[String],
    config: &ScanConfig,
    now: DateTime<Utc>,
) -> ScanReport {
    let engine = SignalEngine::default();
    let mut tasks = JoinSet::new();

    for (index, symbol) in symbols.iter().enumerate() {
        let source = Arc::clone(&source);
        let symbol = symbol.to_uppercase();
        let count = config.candles;
        tasks.spawn(async move {
            let feed = source.source_for(&symbol).to_string();
            let outcome = match source.fetch_candles(&symbol, count).await {
                Ok(candles) => {
                    debug!(symbol = %symbol, candles = candles.len(), "Evaluating");
                    match engine.evaluate(&symbol, &candles, now) {
                        Some(signal) => Outcome::Signal(Box::new(signal)),
                        None => Outcome::NoSignal,
                    }
                }
                Err(e) => {
                    warn!(symbol = %symbol, source = %feed, error = %e, "Failed to fetch candles");
                    Outcome::Failed(e.to_string())
                }
            };
            (index, symbol, feed, outcome)
        });
    }

    let mut outcomes = Vec::with_capacity(symbols.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => outcomes.push(result),
            Err(e) => error!(error = %e, "Scan task failed"),
        }
    }
    outcomes.sort_by_key(|(index, _, _, _)| *index);

    let mut report = ScanReport::default();
    for (_, symbol, feed, outcome) in outcomes {
        report.sources.insert(symbol.clone(), feed);
        match outcome {
            Outcome::Signal(signal) => report.signals.push(*signal),
            Outcome::NoSignal => report.no_signal.push(symbol),
            Outcome::Failed(error) => report.failed.push(ScanFailure { symbol, error }),
        }
    }

    info!(
        symbols = symbols.len(),
        signals = report.signals.len(),
        failed = report.failed.len(),
        "Scan complete"
    );
    report
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

pub fn signal_record(signal: &Signal, source: &str) -> serde_json::Result<SignalRecord> {
    Ok(SignalRecord {
        id: None,
        fingerprint: signal.fingerprint(),
        symbol: signal.symbol.clone(),
        action: signal.action.as_str().to_string(),
        entry: signal.entry,
        stop_loss: signal.stop_loss,
        take_profit: signal.take_profit,
        confidence: i64::from(signal.confidence),
        created_at: signal.created_at.to_rfc3339(),
        expires_at: signal.expires_at.to_rfc3339(),
        candle_time: signal.candle_time,
        indicators_json: serde_json::to_string(&signal.indicators)?,
        source: Some(source.to_string()),
        recorded_at: None,
    })
}

/// Persist a report's signals, each tagged with the feed that served it,
/// skipping ones already recorded. Returns how many were new.
pub async fn save_signals(pool: &SqlitePool, report: &ScanReport) -> DbResult<usize> {
    let repo = SignalRepository::new(pool);
    let mut inserted = 0usize;
    for signal in &report.signals {
        let source = report.source_of(&signal.symbol).unwrap_or("unknown");
        let record = match signal_record(signal, source) {
            Ok(r) => r,
            Err(e) => {
                warn!(symbol = %signal.symbol, error = %e, "Failed to encode signal, skipping");
                continue;
            }
        };
        if repo.save(&record).await? {
            inserted += 1;
        }
    }
    Ok(inserted)
}

// ---------------------------------------------------------------------------
// Continuous scanning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanStatus {
    Idle,
    Scanning,
    Waiting,
    Stopped,
    Error,
}

/// Shared state of the continuous scanner
pub struct ScanProgress {
    pub status: RwLock<ScanStatus>,
    pub cancelled: AtomicBool,
    pub cycle: AtomicU32,
    pub saved: AtomicUsize,
    pub latest: RwLock<Vec<Signal>>,
    pub last_error: RwLock<Option<String>>,
    pub last_scan: RwLock<Option<DateTime<Utc>>>,
}

/// Point-in-time copy of [`ScanProgress`] for display and the JSON API
#[derive(Debug, Clone, Serialize)]
pub struct ScanSnapshot {
    pub status: ScanStatus,
    pub cycle: u32,
    pub saved: usize,
    pub latest: Vec<Signal>,
    pub last_error: Option<String>,
    pub last_scan: Option<DateTime<Utc>>,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(ScanStatus::Idle),
            cancelled: AtomicBool::new(false),
            cycle: AtomicU32::new(0),
            saved: AtomicUsize::new(0),
            latest: RwLock::new(Vec::new()),
            last_error: RwLock::new(None),
            last_scan: RwLock::new(None),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.status(),
            ScanStatus::Scanning | ScanStatus::Waiting | ScanStatus::Error
        )
    }

    pub fn status(&self) -> ScanStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: ScanStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn set_error(&self, message: Option<String>) {
        *self.last_error.write().unwrap_or_else(PoisonError::into_inner) = message;
    }

    fn record_scan(&self, report: &ScanReport, at: DateTime<Utc>) {
        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        for signal in report.signals.iter().rev() {
            let fingerprint = signal.fingerprint();
            if latest.iter().any(|s| s.fingerprint() == fingerprint) {
                continue;
            }
            latest.insert(0, signal.clone());
        }
        latest.truncate(MAX_LATEST_SIGNALS);
        *self.last_scan.write().unwrap_or_else(PoisonError::into_inner) = Some(at);
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            status: self.status(),
            cycle: self.cycle.load(Ordering::Relaxed),
            saved: self.saved.load(Ordering::Relaxed),
            latest: self
                .latest
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            last_error: self
                .last_error
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            last_scan: *self.last_scan.read().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan every `refresh_secs` until cancelled (or `max_cycles` is reached).
pub async fn run_continuous(
    source: Arc<dyn CandleSource>,
    config: ScanConfig,
    progress: Arc<ScanProgress>,
    db_pool: Option<SqlitePool>,
) {
    info!(
        symbols = ?config.symbols,
        refresh_secs = config.refresh_secs,
        source = source.name(),
        "Starting continuous scan"
    );

    loop {
        if progress.is_cancelled() {
            info!("Continuous scan cancelled");
            break;
        }

        progress.set_status(ScanStatus::Scanning);
        progress.set_error(None);
        let cycle = progress.cycle.fetch_add(1, Ordering::Relaxed) + 1;
        let now = Utc::now();
        let report = scan_once(Arc::clone(&source), &config.symbols, &config, now).await;

        if let Some(pool) = &db_pool {
            match save_signals(pool, &report).await {
                Ok(new) => {
                    progress.saved.fetch_add(new, Ordering::Relaxed);
                    if new > 0 {
                        info!(cycle, new, "Recorded signals");
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to record signals");
                    progress.set_error(Some(format!("Failed to record signals: {}", e)));
                }
            }
        }

        let all_failed = !report.failed.is_empty() && report.failed.len() == config.symbols.len();
        if all_failed {
            progress.set_error(Some("Failed to fetch candles for every symbol".to_string()));
        }
        progress.record_scan(&report, now);

        for signal in &report.signals {
            info!(
                cycle,
                symbol = %signal.symbol,
                action = %signal.action,
                entry = signal.entry,
                "Signal"
            );
        }

        if config.max_cycles.is_some_and(|max| cycle >= max) {
            info!(cycle, "Reached cycle limit");
            break;
        }

        progress.set_status(if all_failed {
            ScanStatus::Error
        } else {
            ScanStatus::Waiting
        });
        // Sleep in one-second slices so cancellation is picked up promptly
        for _ in 0..config.refresh_secs {
            if progress.is_cancelled() {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    progress.set_status(ScanStatus::Stopped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SyntheticSource;
    use crate::types::Candle;
    use anyhow::Result;
    use async_trait::async_trait;
    use crate::api::{BinanceClient, RoutedSource};
    use chrono::TimeZone;
    use persistence::Database;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    /// Serves the crafted BUY setup for EURUSD, flat candles for GBPUSD and
    /// an error for anything else.
    struct FakeSource;

    fn make_candles(closes: &[f64]) -> Vec<Candle> {
        let mut prev: Option<f64> = None;
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open = prev.unwrap_or(close);
                prev = Some(close);
                Candle {
                    timestamp: 1_700_000_000_000 + (i as i64) * 300_000,
                    open,
                    high: open.max(close) + 0.0002,
                    low: open.min(close) - 0.0002,
                    close,
                    tick_volume: 300,
                    spread: 2,
                    real_volume: 4000,
                }
            })
            .collect()
    }

    fn buy_setup() -> Vec<f64> {
        let mut closes = Vec::new();
        let mut p = 1.1;
        for _ in 0..50 {
            closes.push(p);
            p -= 0.0001;
        }
        for j in 0..20 {
            p += if j % 2 == 0 { 0.0006 } else { -0.0004 };
            closes.push(p);
        }
        closes
    }

    #[async_trait]
    impl CandleSource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        async fn fetch_candles(&self, symbol: &str, _count: usize) -> Result<Vec<Candle>> {
            match symbol {
                "EURUSD" => Ok(make_candles(&buy_setup())),
                "GBPUSD" => Ok(make_candles(&[1.25; 80])),
                _ => anyhow::bail!("no data for {}", symbol),
            }
        }
    }

    /// Fails its first fetch, then serves the BUY setup
    struct FlakySource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CandleSource for FlakySource {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn fetch_candles(&self, _symbol: &str, _count: usize) -> Result<Vec<Candle>> {
            if self.calls.fetch_add(1, Ordering::Relaxed) == 0 {
                anyhow::bail!("connection reset");
            }
            Ok(make_candles(&buy_setup()))
        }
    }

    fn symbols(list: &str) -> Vec<String> {
        parse_symbols(list)
    }

    #[test]
    fn test_parse_symbols() {
        assert_eq!(
            parse_symbols(" eurusd, GBPUSD,,EURUSD ,usdjpy"),
            vec!["EURUSD", "GBPUSD", "USDJPY"]
        );
        assert!(parse_symbols("").is_empty());
    }

    #[test]
    fn test_config_defaults_and_partial_json() {
        let config = ScanConfig::default();
        assert_eq!(config.symbols.len(), 7);
        assert_eq!(config.candles, 500);
        assert_eq!(config.refresh_secs, 300);

        let partial: ScanConfig = serde_json::from_str(r#"{"candles": 200}"#).unwrap();
        assert_eq!(partial.candles, 200);
        assert_eq!(partial.symbols, config.symbols);
    }

    #[tokio::test]
    async fn test_scan_once_sorts_outcomes() {
        let source: Arc<dyn CandleSource> = Arc::new(FakeSource);
        let report = scan_once(
            source,
            &symbols("EURUSD,GBPUSD,XAUUSD"),
            &ScanConfig::default(),
            now(),
        )
        .await;

        assert_eq!(report.signals.len(), 1);
        assert_eq!(report.signals[0].symbol, "EURUSD");
        assert_eq!(report.signals[0].created_at, now());
        assert_eq!(report.no_signal, vec!["GBPUSD".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].symbol, "XAUUSD");
        assert_eq!(report.source_of("XAUUSD"), Some("fake"));
    }

    #[tokio::test]
    async fn test_scan_synthetic_watchlist() {
        let source: Arc<dyn CandleSource> = Arc::new(SyntheticSource::new(42, 5));
        let config = ScanConfig::default();
        let report = scan_once(source, &config.symbols, &config, now()).await;
        assert!(report.failed.is_empty());
        assert_eq!(report.signals.len() + report.no_signal.len(), 7);
    }

    #[tokio::test]
    async fn test_save_signals_dedupes() {
        let db = Database::in_memory().await.unwrap();
        let source: Arc<dyn CandleSource> = Arc::new(FakeSource);
        let report = scan_once(source, &symbols("EURUSD"), &ScanConfig::default(), now()).await;

        assert_eq!(save_signals(db.pool(), &report).await.unwrap(), 1);
        assert_eq!(save_signals(db.pool(), &report).await.unwrap(), 0);

        let rows = SignalRepository::new(db.pool()).recent(10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "BUY");
        assert_eq!(rows[0].confidence, 98);
        assert_eq!(rows[0].source.as_deref(), Some("fake"));
        assert_eq!(rows[0].fingerprint, report.signals[0].fingerprint());
    }

    #[tokio::test]
    async fn test_run_continuous_stops_after_max_cycles() {
        let db = Database::in_memory().await.unwrap();
        let progress = Arc::new(ScanProgress::new());
        let config = ScanConfig {
            symbols: symbols("EURUSD,GBPUSD"),
            refresh_secs: 0,
            max_cycles: Some(2),
            ..ScanConfig::default()
        };

        run_continuous(
            Arc::new(FakeSource),
            config,
            Arc::clone(&progress),
            Some(db.pool_clone()),
        )
        .await;

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.status, ScanStatus::Stopped);
        assert_eq!(snapshot.cycle, 2);
        // Same candle twice: recorded and listed once
        assert_eq!(snapshot.saved, 1);
        assert_eq!(snapshot.latest.len(), 1);
        assert!(snapshot.last_error.is_none());
        assert!(snapshot.last_scan.is_some());
    }

    #[tokio::test]
    async fn test_routed_history_records_serving_feed() {
        let db = Database::in_memory().await.unwrap();
        let routed = RoutedSource::new(BinanceClient::new().unwrap(), SyntheticSource::new(42, 5));
        let routed = scan_once(
            Arc::new(routed),
            &symbols("EURUSD"),
            &ScanConfig::default(),
            now(),
        )
        .await;
        assert_eq!(routed.source_of("EURUSD"), Some("synthetic"));

        // Known setup, tagged with the feeds the routed scan reported
        let fake = scan_once(
            Arc::new(FakeSource),
            &symbols("EURUSD"),
            &ScanConfig::default(),
            now(),
        )
        .await;
        let report = ScanReport {
            signals: fake.signals,
            sources: routed.sources,
            ..ScanReport::default()
        };
        assert_eq!(save_signals(db.pool(), &report).await.unwrap(), 1);

        let rows = SignalRepository::new(db.pool()).recent(10).await.unwrap();
        assert_eq!(rows[0].source.as_deref(), Some("synthetic"));
    }

    #[tokio::test]
    async fn test_error_cleared_after_recovery() {
        let progress = Arc::new(ScanProgress::new());
        let source = Arc::new(FlakySource {
            calls: AtomicUsize::new(0),
        });
        let config = ScanConfig {
            symbols: symbols("EURUSD"),
            refresh_secs: 0,
            max_cycles: Some(2),
            ..ScanConfig::default()
        };
        run_continuous(source, config, Arc::clone(&progress), None).await;

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.cycle, 2);
        assert!(snapshot.last_error.is_none());
        assert_eq!(snapshot.latest.len(), 1);
    }

    #[test]
    fn test_record_scan_skips_listed_signals() {
        let progress = ScanProgress::new();
        let signal = SignalEngine::default()
            .evaluate("EURUSD", &make_candles(&buy_setup()), now())
            .unwrap();
        let report = ScanReport {
            signals: vec![signal.clone(), signal],
            ..ScanReport::default()
        };
        progress.record_scan(&report, now());
        progress.record_scan(&report, now());
        assert_eq!(progress.snapshot().latest.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_does_nothing() {
        let progress = Arc::new(ScanProgress::new());
        progress.cancel();
        run_continuous(
            Arc::new(FakeSource),
            ScanConfig::default(),
            Arc::clone(&progress),
            None,
        )
        .await;
        assert_eq!(progress.cycle.load(Ordering::Relaxed), 0);
        assert_eq!(progress.status(), ScanStatus::Stopped);
        assert!(!progress.is_running());
    }

    #[tokio::test]
    async fn test_all_failures_reported() {
        let progress = Arc::new(ScanProgress::new());
        let config = ScanConfig {
            symbols: symbols("XAUUSD"),
            max_cycles: Some(1),
            ..ScanConfig::default()
        };
        run_continuous(Arc::new(FakeSource), config, Arc::clone(&progress), None).await;
        assert!(progress.snapshot().last_error.is_some());
    }
}
