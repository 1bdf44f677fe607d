use alerter::TelegramAlerter;
use api_client::BinanceClient;
use backtester::{KlineCache, ReplayHarness};
use chrono::{NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use clock::SystemClock;
use comfy_table::Table;
use core_types::interval_duration;
use engine::{ExitEvaluator, LiveEngine, LlmDecisionSource, TradeEngine, TradingPipeline};
use futures::future::join_all;
use market_data::SnapshotCollector;
use portfolio_store::PortfolioStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// The main entry point for the Meridian trading application.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Secrets (API keys, LLM key, Telegram token) may come from .env.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = configuration::load_config()?;

    match cli.command {
        Commands::Run => handle_run(config).await,
        Commands::Backtest(args) => handle_backtest(config, args).await,
        Commands::Backfill(args) => handle_backfill(config, args).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// An AI-decision-driven leveraged paper-trading engine with deterministic
/// historical replay.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live trading loop.
    Run,
    /// Replay the pipeline over a historical window.
    Backtest(BacktestArgs),
    /// Pre-fill the historical kline cache.
    Backfill(BackfillArgs),
}

#[derive(Parser)]
struct BacktestArgs {
    /// Start date of the replay window (format: YYYY-MM-DD). Defaults to the
    /// configured backtest.start_date.
    #[arg(long)]
    from: Option<NaiveDate>,

    /// End date of the replay window (format: YYYY-MM-DD). Defaults to the
    /// configured backtest.end_date.
    #[arg(long)]
    to: Option<NaiveDate>,
}

#[derive(Parser)]
struct BackfillArgs {
    /// Start date of the range to cache (format: YYYY-MM-DD).
    #[arg(long)]
    from: NaiveDate,

    /// End date of the range to cache (format: YYYY-MM-DD).
    #[arg(long)]
    to: NaiveDate,
}

// ==============================================================================
// Command Handlers
// ==============================================================================

/// Wires the live pipeline: real clock, real exchange, LLM decision source.
async fn handle_run(config: configuration::settings::Config) -> anyhow::Result<()> {
    let clock = Arc::new(SystemClock);
    let exchange = Arc::new(BinanceClient::new(&config.api));

    let store = PortfolioStore::new(&config.paths.live_dir, config.engine.starting_capital)?;
    let mut trade_engine = TradeEngine::new(
        store,
        config.risk_management.clone(),
        config.simulation.clone(),
        clock.clone(),
    )?;

    if config.api.live_forwarding_enabled {
        tracing::info!("live forwarding is enabled; order intents will be sent to the exchange");
        trade_engine = trade_engine.with_forwarder(exchange.clone());
    }
    if let Some(alerter) = TelegramAlerter::new(&config.telegram) {
        trade_engine = trade_engine.with_alerter(alerter);
    }

    let pipeline = TradingPipeline::new(
        config.engine.symbols.clone(),
        SnapshotCollector::new(exchange, config.engine.clone(), config.exits.clone()),
        Arc::new(LlmDecisionSource::new(config.llm.clone())),
        ExitEvaluator::new(config.exits.clone()),
        trade_engine,
        clock,
    );

    let pace = interval_duration(&config.engine.interval)
        .ok_or_else(|| anyhow::anyhow!("unparseable engine.interval: {}", config.engine.interval))?;
    let mut live = LiveEngine::new(pipeline, pace);
    live.run().await?;
    Ok(())
}

/// Runs a replay over the requested window and prints the summary.
async fn handle_backtest(
    config: configuration::settings::Config,
    args: BacktestArgs,
) -> anyhow::Result<()> {
    let start_date = args.from.unwrap_or(config.backtest.start_date);
    let end_date = args.to.unwrap_or(config.backtest.end_date);
    let start = Utc
        .from_utc_datetime(&start_date.and_hms_opt(0, 0, 0).expect("midnight is valid"));
    let end = Utc.from_utc_datetime(&end_date.and_hms_opt(0, 0, 0).expect("midnight is valid"));
    if start >= end {
        anyhow::bail!("backtest start {start_date} must precede end {end_date}");
    }

    let data_source = BinanceClient::new(&config.api);
    let harness = ReplayHarness::new(
        config.clone(),
        Arc::new(LlmDecisionSource::new(config.llm.clone())),
    );
    let outcome = harness.run(&data_source, start, end).await?;

    let report = &outcome.report;
    let mut table = Table::new();
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Run".to_string(), outcome.run_id.to_string()]);
    table.add_row(vec![
        "Window".to_string(),
        format!("{start_date} → {end_date}"),
    ]);
    table.add_row(vec![
        "Final equity".to_string(),
        report.final_equity.round_dp(2).to_string(),
    ]);
    table.add_row(vec![
        "Return %".to_string(),
        report.total_return_pct.round_dp(2).to_string(),
    ]);
    table.add_row(vec![
        "Realized PnL".to_string(),
        report.realized_pnl.round_dp(2).to_string(),
    ]);
    table.add_row(vec![
        "Fees paid".to_string(),
        report.total_fees.round_dp(2).to_string(),
    ]);
    table.add_row(vec![
        "Sortino".to_string(),
        report.sortino_ratio.round_dp(3).to_string(),
    ]);
    table.add_row(vec![
        "Sharpe".to_string(),
        report
            .sharpe_ratio
            .map(|s| s.round_dp(3).to_string())
            .unwrap_or_else(|| "n/a".to_string()),
    ]);
    table.add_row(vec![
        "Max drawdown %".to_string(),
        report.max_drawdown_pct.round_dp(2).to_string(),
    ]);
    table.add_row(vec![
        "Trades (won/lost)".to_string(),
        format!(
            "{} ({}/{})",
            report.total_trades, report.winning_trades, report.losing_trades
        ),
    ]);
    println!("{table}");
    println!("Artifacts: {}", outcome.run_dir.display());

    Ok(())
}

/// Warms the kline cache for every configured symbol and timeframe.
async fn handle_backfill(
    config: configuration::settings::Config,
    args: BackfillArgs,
) -> anyhow::Result<()> {
    if args.from >= args.to {
        anyhow::bail!("backfill start {} must precede end {}", args.from, args.to);
    }
    let start = Utc.from_utc_datetime(&args.from.and_hms_opt(0, 0, 0).expect("midnight is valid"));
    let end = Utc.from_utc_datetime(&args.to.and_hms_opt(0, 0, 0).expect("midnight is valid"));

    let cache = Arc::new(KlineCache::new(&config.paths.cache_dir)?);
    let intervals = [
        config.engine.interval.clone(),
        config.engine.structure_interval.clone(),
        config.engine.trend_interval.clone(),
    ];

    println!(
        "Backfilling {} symbols x {} intervals from {} to {}",
        config.engine.symbols.len(),
        intervals.len(),
        args.from,
        args.to
    );

    let tasks: Vec<_> = config
        .engine
        .symbols
        .iter()
        .flat_map(|symbol| {
            intervals.iter().map(|interval| {
                let cache = Arc::clone(&cache);
                let api = config.api.clone();
                let symbol = symbol.clone();
                let interval = interval.clone();
                tokio::spawn(async move {
                    let client = BinanceClient::new(&api);
                    let bars = cache
                        .ensure_coverage(&client, &symbol, &interval, start, end)
                        .await?;
                    println!("  {symbol} {interval}: {} bars cached", bars.len());
                    Ok::<(), backtester::BacktestError>(())
                })
            })
        })
        .collect();

    for result in join_all(tasks).await {
        result??;
    }
    println!("Backfill complete.");

    Ok(())
}
