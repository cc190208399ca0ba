//! Signal Forge: trend-following entry signals for forex and crypto pairs
//!
//! Usage:
//!   signal-forge scan --symbols EURUSD,BTCUSD   Evaluate once and print signal cards
//!   signal-forge watch --refresh-secs 300       Re-scan until Ctrl+C
//!   signal-forge history --symbol EURUSD        List recorded signals
//!   signal-forge serve --port 3001              JSON API

use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use engine::{
    format_price, parse_symbols, risk_reward_summary, run_continuous, save_signals, scan_once,
    BinanceClient, CandleSource, RoutedSource, ScanConfig, ScanProgress, ScanReport, ScanStatus,
    SignalCard, SyntheticSource,
};
use persistence::repository::{SignalRecord, SignalRepository};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_DB_PATH: &str = "data/signals.db";
const DEFAULT_HISTORY_LIMIT: i64 = 20;

#[derive(Parser)]
#[command(name = "signal-forge")]
#[command(about = "EMA crossover signals filtered by ADX, ATR and RSI", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the watchlist once and print any signals
    Scan {
        /// Symbols to scan (comma-separated, default: the 7 major USD pairs)
        #[arg(long)]
        symbols: Option<String>,
        /// Candles fetched per symbol
        #[arg(long, default_value_t = engine::scanner::DEFAULT_CANDLES)]
        candles: usize,
        /// Seed for the synthetic forex feed
        #[arg(long, default_value_t = engine::scanner::DEFAULT_SEED)]
        seed: u64,
        /// Do not record signals in the history database
        #[arg(long)]
        no_persist: bool,
        /// Optional JSON export path for the scan report
        #[arg(long)]
        export: Option<String>,
    },
    /// Scan repeatedly until Ctrl+C
    Watch {
        #[arg(long)]
        symbols: Option<String>,
        /// Seconds between scans
        #[arg(long, default_value_t = engine::scanner::DEFAULT_REFRESH_SECS)]
        refresh_secs: u64,
        #[arg(long, default_value_t = engine::scanner::DEFAULT_CANDLES)]
        candles: usize,
        #[arg(long, default_value_t = engine::scanner::DEFAULT_SEED)]
        seed: u64,
        /// Stop after N scans
        #[arg(long)]
        cycles: Option<u32>,
    },
    /// Show recorded signals, newest first
    History {
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: i64,
    },
    /// Launch the JSON API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = 3001)]
        port: u16,
        /// Also run the continuous scanner in the background
        #[arg(long)]
        watch: bool,
    },
}

#[derive(Clone)]
struct AppState {
    source: Arc<dyn CandleSource>,
    db: Arc<persistence::Database>,
    config: Arc<ScanConfig>,
    progress: Arc<ScanProgress>,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,signal_forge=debug,sqlx=warn")
    } else {
        EnvFilter::new("info,engine=info,signal_forge=info,sqlx=warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

fn db_path() -> String {
    std::env::var("SIGNAL_FORGE_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string())
}

async fn open_database() -> anyhow::Result<(persistence::Database, String)> {
    let path = db_path();
    let db = persistence::Database::new(&path).await.map_err(|e| {
        error!("Failed to initialize database: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })?;
    Ok((db, path))
}

/// Crypto through Binance, forex through the seeded synthetic feed
fn build_source(config: &ScanConfig) -> anyhow::Result<Arc<dyn CandleSource>> {
    let binance = match std::env::var("SIGNAL_FORGE_BINANCE_URL") {
        Ok(url) => BinanceClient::with_base_url(&url)?,
        Err(_) => BinanceClient::new()?,
    };
    let forex = SyntheticSource::new(config.seed, config.interval_minutes);
    Ok(Arc::new(RoutedSource::new(binance, forex)))
}

fn scan_config(symbols: Option<String>, candles: usize, seed: u64) -> ScanConfig {
    let mut config = ScanConfig {
        candles,
        seed,
        ..ScanConfig::default()
    };
    if let Some(list) = symbols {
        let parsed = parse_symbols(&list);
        if !parsed.is_empty() {
            config.symbols = parsed;
        }
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Scan {
            symbols,
            candles,
            seed,
            no_persist,
            export,
        } => {
            cmd_scan(scan_config(symbols, candles, seed), no_persist, export).await?;
        }
        Commands::Watch {
            symbols,
            refresh_secs,
            candles,
            seed,
            cycles,
        } => {
            let config = ScanConfig {
                refresh_secs,
                max_cycles: cycles,
                ..scan_config(symbols, candles, seed)
            };
            cmd_watch(config).await?;
        }
        Commands::History { symbol, limit } => {
            cmd_history(symbol, limit).await?;
        }
        Commands::Serve { host, port, watch } => {
            cmd_serve(&host, port, watch).await?;
        }
    }

    Ok(())
}

// ============================================================================
// Scan command
// ============================================================================

fn print_report(report: &ScanReport) {
    for signal in &report.signals {
        println!("{}", SignalCard(signal));
        println!("{}", risk_reward_summary(signal));
        println!();
    }
    if !report.no_signal.is_empty() {
        println!("No signal: {}", report.no_signal.join(", "));
    }
    for failure in &report.failed {
        println!("Failed: {} ({})", failure.symbol, failure.error);
    }
}

async fn cmd_scan(
    config: ScanConfig,
    no_persist: bool,
    export: Option<String>,
) -> anyhow::Result<()> {
    println!("\n=== Signal Forge v{} ===", APP_VERSION);
    println!("Symbols: {}", config.symbols.join(", "));
    println!("Candles: {} | Seed: {}\n", config.candles, config.seed);

    let source = build_source(&config)?;
    let report = scan_once(source, &config.symbols, &config, Utc::now()).await;
    print_report(&report);

    if !no_persist && !report.signals.is_empty() {
        let (db, path) = open_database().await?;
        let new = save_signals(db.pool(), &report).await?;
        println!("Recorded {} new signal(s) in {}", new, path);
    }

    if let Some(path) = export {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json)?;
        println!("Report exported to {}", path);
    }

    Ok(())
}

// ============================================================================
// Watch command
// ============================================================================

async fn cmd_watch(config: ScanConfig) -> anyhow::Result<()> {
    println!("\n=== Signal Forge v{} ===", APP_VERSION);
    println!(
        "Watching {} every {}s. Press Ctrl+C to stop\n",
        config.symbols.join(", "),
        config.refresh_secs
    );

    let (db, _) = open_database().await?;
    let source = build_source(&config)?;
    let progress = Arc::new(ScanProgress::new());

    let progress_for_ctrlc = progress.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl+C received, stopping after current scan...");
        progress_for_ctrlc.cancel();
    });

    let progress_clone = progress.clone();
    let handle = tokio::spawn(run_continuous(
        source,
        config,
        progress_clone,
        Some(db.pool_clone()),
    ));

    // Print each cycle's new signals as they appear
    let mut shown_cycle = 0u32;
    loop {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let snapshot = progress.snapshot();
        if snapshot.cycle != shown_cycle && snapshot.status != ScanStatus::Scanning {
            shown_cycle = snapshot.cycle;
            let fresh: Vec<_> = snapshot
                .latest
                .iter()
                .filter(|s| Some(s.created_at) == snapshot.last_scan)
                .collect();
            println!("--- Scan {} ({} signal(s)) ---", shown_cycle, fresh.len());
            for signal in fresh {
                println!("{}\n", SignalCard(signal));
            }
            if let Some(err) = &snapshot.last_error {
                println!("Last error: {}", err);
            }
        }
        if snapshot.status == ScanStatus::Stopped || handle.is_finished() {
            break;
        }
    }

    if let Err(e) = handle.await {
        error!("Scanner task failed: {}", e);
    }
    println!(
        "Stopped after {} scan(s), {} new signal(s) recorded",
        shown_cycle,
        progress.snapshot().saved
    );
    Ok(())
}

// ============================================================================
// History command
// ============================================================================

fn print_record(r: &SignalRecord) {
    println!(
        "{}  {:<8} {:<4}  entry {}  SL {}  TP {}  ({})",
        r.created_at,
        r.symbol,
        r.action,
        format_price(Some(r.entry), &r.symbol),
        format_price(Some(r.stop_loss), &r.symbol),
        format_price(Some(r.take_profit), &r.symbol),
        r.source.as_deref().unwrap_or("unknown"),
    );
}

async fn cmd_history(symbol: Option<String>, limit: i64) -> anyhow::Result<()> {
    let (db, path) = open_database().await?;
    let repo = SignalRepository::new(db.pool());
    let total = repo.count().await?;
    let records = match &symbol {
        Some(s) => repo.for_symbol(s, limit).await?,
        None => repo.recent(limit).await?,
    };

    println!("Database: {} ({} signals recorded)\n", path, total);
    if records.is_empty() {
        println!("No signals recorded yet");
    }
    for record in &records {
        print_record(record);
    }
    Ok(())
}

// ============================================================================
// Serve command: Axum JSON API
// ============================================================================

async fn cmd_serve(host: &str, port: u16, watch: bool) -> anyhow::Result<()> {
    info!("Signal Forge v{} starting...", APP_VERSION);

    let (db, path) = open_database().await?;
    info!("Database initialized: {}", path);

    let config = ScanConfig::default();
    let state = AppState {
        source: build_source(&config)?,
        db: Arc::new(db),
        config: Arc::new(config),
        progress: Arc::new(ScanProgress::new()),
    };

    if watch {
        tokio::spawn(run_continuous(
            Arc::clone(&state.source),
            (*state.config).clone(),
            Arc::clone(&state.progress),
            Some(state.db.pool_clone()),
        ));
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(api_health))
        .route("/signals", get(api_signals))
        .route("/history", get(api_history))
        .route("/status", get(api_status))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(cors);

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("\n=== Signal Forge v{} ===", APP_VERSION);
    println!("Listening on http://{}", addr);
    println!("\nEndpoints:");
    println!("  GET  /api/health              - Health check");
    println!("  GET  /api/signals?symbols=    - Scan now and return signals");
    println!("  GET  /api/history?symbol=     - Recorded signals");
    println!("  GET  /api/status              - Background scanner state");
    println!("\n  Database: {}", path);
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// GET /api/health
async fn api_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "signal-forge",
        "version": APP_VERSION,
    }))
}

/// GET /api/signals: scan now, record and return the report
async fn api_signals(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let symbols = params
        .get("symbols")
        .map(|s| parse_symbols(s))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| state.config.symbols.clone());

    let report = scan_once(
        Arc::clone(&state.source),
        &symbols,
        &state.config,
        Utc::now(),
    )
    .await;

    if let Err(e) = save_signals(state.db.pool(), &report).await {
        error!("Failed to record signals: {}", e);
    }

    let cards: Vec<String> = report
        .signals
        .iter()
        .map(|s| format!("{}\n{}", SignalCard(s), risk_reward_summary(s)))
        .collect();

    Json(serde_json::json!({
        "success": true,
        "data": report,
        "cards": cards,
    }))
}

/// GET /api/history?symbol=&limit=
async fn api_history(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let limit: i64 = params
        .get("limit")
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_HISTORY_LIMIT);
    let repo = SignalRepository::new(state.db.pool());
    let result = match params.get("symbol") {
        Some(symbol) => repo.for_symbol(symbol, limit).await,
        None => repo.recent(limit).await,
    };

    match result {
        Ok(records) => Json(serde_json::json!({
            "success": true,
            "data": records,
            "limit": limit,
        })),
        Err(e) => Json(serde_json::json!({
            "success": false,
            "error": format!("Failed to query signal history: {}", e),
            "data": [],
        })),
    }
}

/// GET /api/status
async fn api_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "data": state.progress.snapshot(),
    }))
}
