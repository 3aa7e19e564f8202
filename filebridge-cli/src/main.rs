//! Filebridge CLI: operate a terminal bridge from the shell.
//!
//! Commands:
//! - `watch`: connect, subscribe, and log every notification
//! - `send`: dispatch one raw command and report the outcome
//! - `history`: request historic bars and export them as CSV
//! - `trades`: request the trade history and print it as JSON
//! - `close-all`: close every open order

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::{NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use filebridge_core::codec::{HistoricSeries, HistoricTrades, SeriesKey};
use filebridge_core::{
    Bridge, BridgeConfig, BridgeEvent, ChannelHandler, LoggingHandler, NoopHandler, SendOutcome, WatchSet,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "filebridge", about = "Filebridge CLI: file-based terminal bridge")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Shared files directory. Overrides `files_dir` from the config file.
    #[arg(long, global = true)]
    files_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and log every notification.
    Watch {
        /// Symbols to subscribe to tick data for (e.g., EURUSD,GBPUSD).
        #[arg(long, value_delimiter = ',')]
        symbols: Vec<String>,

        /// Bar subscriptions as SYMBOL:TIMEFRAME pairs (e.g., EURUSD:M1,GBPUSD:H1).
        #[arg(long)]
        bars: Option<String>,

        /// Stop after this many seconds. Runs until killed when absent.
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Dispatch a raw command.
    Send {
        /// Command name (e.g., CLOSE_ORDERS_BY_SYMBOL).
        name: String,

        /// Comma-separated payload.
        #[arg(default_value = "")]
        payload: String,
    },
    /// Request historic bars and export them as CSV.
    History {
        #[arg(long)]
        symbol: String,

        /// Timeframe (e.g., M1, H1, D1).
        #[arg(long)]
        timeframe: String,

        /// Lookback in days.
        #[arg(long, default_value_t = 30)]
        days: i64,

        /// Output CSV file.
        #[arg(long)]
        out: PathBuf,

        /// How long to wait for the terminal's answer.
        #[arg(long, default_value_t = 30)]
        wait_secs: u64,
    },
    /// Request the trade history and print it as JSON.
    Trades {
        /// Lookback in days.
        #[arg(long, default_value_t = 30)]
        days: u32,

        /// How long to wait for the terminal's answer.
        #[arg(long, default_value_t = 30)]
        wait_secs: u64,
    },
    /// Close every open order.
    CloseAll,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.files_dir)?;

    match cli.command {
        Commands::Watch {
            symbols,
            bars,
            seconds,
        } => run_watch(config, &symbols, bars.as_deref(), seconds),
        Commands::Send { name, payload } => run_send(config, &name, &payload),
        Commands::History {
            symbol,
            timeframe,
            days,
            out,
            wait_secs,
        } => run_history(config, &symbol, &timeframe, days, &out, wait_secs),
        Commands::Trades { days, wait_secs } => run_trades(config, days, wait_secs),
        Commands::CloseAll => run_close_all(config),
    }
}

fn load_config(path: Option<&Path>, files_dir: Option<PathBuf>) -> Result<BridgeConfig> {
    let config = match path {
        Some(path) => BridgeConfig::from_file(path)?,
        None => BridgeConfig::default(),
    };
    let config = match files_dir {
        Some(dir) => config.with_files_dir(dir),
        None => config,
    };
    config.validate()?;
    Ok(config)
}

fn run_watch(config: BridgeConfig, symbols: &[String], bars: Option<&str>, seconds: Option<u64>) -> Result<()> {
    let bar_pairs = bars.map(parse_bar_pairs).transpose()?.unwrap_or_default();
    let bridge = Bridge::connect(config, Arc::new(LoggingHandler))?;

    if !symbols.is_empty() {
        report("SUBSCRIBE_SYMBOLS", bridge.dispatcher().subscribe_symbols(symbols));
    }
    if !bar_pairs.is_empty() {
        report(
            "SUBSCRIBE_SYMBOLS_BAR_DATA",
            bridge.dispatcher().subscribe_symbols_bar_data(bar_pairs.as_slice()),
        );
    }

    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs(s));
    while deadline.map_or(true, |d| Instant::now() < d) {
        thread::sleep(Duration::from_millis(200));
    }
    bridge.stop();
    Ok(())
}

fn run_send(config: BridgeConfig, name: &str, payload: &str) -> Result<()> {
    let bridge = Bridge::connect_with(config, Arc::new(NoopHandler), WatchSet::NONE)?;
    let outcome = bridge.dispatcher().send(name, payload);
    report(name, outcome);
    if !outcome.is_written() {
        bail!("command {name} was not written: {outcome:?}");
    }
    Ok(())
}

fn run_close_all(config: BridgeConfig) -> Result<()> {
    let bridge = Bridge::connect_with(config, Arc::new(NoopHandler), WatchSet::NONE)?;
    let outcome = bridge.dispatcher().close_all_orders();
    report("CLOSE_ALL_ORDERS", outcome);
    if !outcome.is_written() {
        bail!("CLOSE_ALL_ORDERS was not written: {outcome:?}");
    }
    Ok(())
}

/// Connect with only the historic watcher running, so one-shot requests
/// leave orders and messages for the next `watch`.
fn connect_historic(config: BridgeConfig) -> Result<(Bridge, Receiver<BridgeEvent>)> {
    let (tx, rx) = mpsc::channel();
    let bridge = Bridge::connect_with(config, Arc::new(ChannelHandler::new(tx)), WatchSet::HISTORIC)?;
    Ok((bridge, rx))
}

fn run_history(
    config: BridgeConfig,
    symbol: &str,
    timeframe: &str,
    days: i64,
    out: &Path,
    wait_secs: u64,
) -> Result<()> {
    if days <= 0 {
        bail!("--days must be positive");
    }
    let (bridge, rx) = connect_historic(config)?;

    let end = Utc::now();
    let start = end - chrono::Duration::days(days);
    let outcome = bridge
        .dispatcher()
        .get_historic_data(symbol, timeframe, start.timestamp(), end.timestamp());
    report("GET_HISTORIC_DATA", outcome);
    if !outcome.is_written() {
        bail!("history request was not written: {outcome:?}");
    }

    let wanted = SeriesKey::new(symbol, timeframe);
    let series = wait_for(&rx, Duration::from_secs(wait_secs), |event| match event {
        BridgeEvent::HistoricData { key, series } if key == wanted => Some(series),
        _ => None,
    })
    .with_context(|| format!("no historic data for {wanted} within {wait_secs}s"))?;

    let csv = export_series_csv(&series)?;
    std::fs::write(out, csv).with_context(|| format!("failed to write {}", out.display()))?;
    println!("{} bars written to {}", series.len(), out.display());
    Ok(())
}

fn run_trades(config: BridgeConfig, days: u32, wait_secs: u64) -> Result<()> {
    let trades = request_trades(config, days, Duration::from_secs(wait_secs))?;
    println!("{}", serde_json::to_string_pretty(&trades)?);
    Ok(())
}

/// Send GET_HISTORIC_TRADES and wait for the answer. An empty history is a
/// valid answer.
fn request_trades(config: BridgeConfig, days: u32, timeout: Duration) -> Result<HistoricTrades> {
    let (bridge, rx) = connect_historic(config)?;
    let outcome = bridge.dispatcher().get_historic_trades(days);
    report("GET_HISTORIC_TRADES", outcome);
    if !outcome.is_written() {
        bail!("trades request was not written: {outcome:?}");
    }

    wait_for(&rx, timeout, |event| match event {
        BridgeEvent::HistoricTrades(trades) => Some(trades),
        _ => None,
    })
    .with_context(|| format!("no trade history within {}s", timeout.as_secs()))
}

fn report(name: &str, outcome: SendOutcome) {
    match outcome {
        SendOutcome::Written { slot, sequence_id } => info!(command = name, slot, id = sequence_id, "sent"),
        SendOutcome::TimedOut { sequence_id } => warn!(command = name, id = sequence_id, "no free slot"),
        SendOutcome::Cancelled { sequence_id } => warn!(command = name, id = sequence_id, "cancelled"),
    }
}

/// Take events until `pick` accepts one or `timeout` passes.
fn wait_for<T>(
    rx: &Receiver<BridgeEvent>,
    timeout: Duration,
    mut pick: impl FnMut(BridgeEvent) -> Option<T>,
) -> Option<T> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        if let Some(value) = pick(rx.recv_timeout(remaining).ok()?) {
            return Some(value);
        }
    }
}

/// Parse `EURUSD:M1,GBPUSD:H1` into symbol/timeframe pairs.
fn parse_bar_pairs(arg: &str) -> Result<Vec<(String, String)>> {
    arg.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once(':') {
            Some((symbol, timeframe)) if !symbol.is_empty() && !timeframe.is_empty() => {
                Ok((symbol.to_string(), timeframe.to_string()))
            }
            _ => bail!("invalid bar subscription '{pair}', expected SYMBOL:TIMEFRAME"),
        })
        .collect()
}

/// Export one historic series as CSV, oldest bar first.
///
/// Columns: time, open, high, low, close, tick_volume. Bar times in the
/// terminal's `YYYY.MM.DD HH:MM` form are rewritten as ISO 8601; anything
/// else is passed through.
fn export_series_csv(series: &HistoricSeries) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["time", "open", "high", "low", "close", "tick_volume"])?;

    let mut rows: Vec<(Option<NaiveDateTime>, &String, _)> = series
        .iter()
        .map(|(time, bar)| (parse_bar_time(time), time, bar))
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    for (parsed, raw, bar) in rows {
        let time = parsed.map_or_else(|| raw.clone(), |t| t.format("%Y-%m-%dT%H:%M:%S").to_string());
        wtr.write_record([
            &time,
            &format!("{:.5}", bar.open),
            &format!("{:.5}", bar.high),
            &format!("{:.5}", bar.low),
            &format!("{:.5}", bar.close),
            &bar.tick_volume.to_string(),
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

fn parse_bar_time(time: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(time, "%Y.%m.%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(time, "%Y.%m.%d %H:%M:%S"))
        .ok()
}
