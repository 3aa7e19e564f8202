//! Notification sinks.
//!
//! Watchers call an [`EventHandler`] from their own threads, after releasing
//! the snapshot lock, so a handler may read bridge accessors or send
//! commands.

use std::sync::mpsc::Sender;
use std::sync::Mutex;

use tracing::{error, info};

use crate::codec::{
    Bar, HistoricSeries, HistoricTrades, MessageEntry, MessageKind, Order, SeriesKey, Tick,
};

/// Orders that disappeared or appeared between two polls of the orders file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderChange {
    pub removed: Vec<(String, Order)>,
    pub added: Vec<(String, Order)>,
    /// Number of open orders after the change.
    pub open_count: usize,
}

impl OrderChange {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Callback set for bridge notifications. All methods default to no-ops.
pub trait EventHandler: Send + Sync {
    /// At most once per orders poll, when tickets were added or removed.
    fn on_order_event(&self, _change: &OrderChange) {}

    /// Once per new message, in ascending timestamp order.
    fn on_message(&self, _entry: &MessageEntry) {}

    /// Once per symbol whose quote changed.
    fn on_tick(&self, _symbol: &str, _tick: &Tick) {}

    /// Once per symbol/timeframe whose bar changed.
    fn on_bar_data(&self, _key: &SeriesKey, _bar: &Bar) {}

    /// Once per series in a consumed historic data drop.
    fn on_historic_data(&self, _key: &SeriesKey, _series: &HistoricSeries) {}

    /// Once per consumed historic trades drop.
    fn on_historic_trades(&self, _trades: &HistoricTrades) {}
}

/// Ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl EventHandler for NoopHandler {}

/// A notification as a value, for channel-based consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    Orders(OrderChange),
    Message(MessageEntry),
    Tick { symbol: String, tick: Tick },
    Bar { key: SeriesKey, bar: Bar },
    HistoricData { key: SeriesKey, series: HistoricSeries },
    HistoricTrades(HistoricTrades),
}

/// Forwards every notification into an `mpsc` channel. A disconnected
/// receiver is ignored.
#[derive(Debug)]
pub struct ChannelHandler {
    tx: Mutex<Sender<BridgeEvent>>,
}

impl ChannelHandler {
    pub fn new(tx: Sender<BridgeEvent>) -> Self {
        Self { tx: Mutex::new(tx) }
    }

    fn emit(&self, event: BridgeEvent) {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let _ = tx.send(event);
    }
}

impl EventHandler for ChannelHandler {
    fn on_order_event(&self, change: &OrderChange) {
        self.emit(BridgeEvent::Orders(change.clone()));
    }

    fn on_message(&self, entry: &MessageEntry) {
        self.emit(BridgeEvent::Message(entry.clone()));
    }

    fn on_tick(&self, symbol: &str, tick: &Tick) {
        self.emit(BridgeEvent::Tick {
            symbol: symbol.to_string(),
            tick: *tick,
        });
    }

    fn on_bar_data(&self, key: &SeriesKey, bar: &Bar) {
        self.emit(BridgeEvent::Bar {
            key: key.clone(),
            bar: bar.clone(),
        });
    }

    fn on_historic_data(&self, key: &SeriesKey, series: &HistoricSeries) {
        self.emit(BridgeEvent::HistoricData {
            key: key.clone(),
            series: series.clone(),
        });
    }

    fn on_historic_trades(&self, trades: &HistoricTrades) {
        self.emit(BridgeEvent::HistoricTrades(trades.clone()));
    }
}

/// Logs every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_order_event(&self, change: &OrderChange) {
        info!(
            open = change.open_count,
            added = change.added.len(),
            removed = change.removed.len(),
            "order event"
        );
    }

    fn on_message(&self, entry: &MessageEntry) {
        let msg = &entry.message;
        match msg.kind {
            MessageKind::Error => error!(
                millis = entry.millis,
                error_type = msg.error_type().unwrap_or_default(),
                "{}",
                msg.description().unwrap_or_default()
            ),
            _ => info!(
                millis = entry.millis,
                kind = %msg.kind,
                "{}",
                msg.text().unwrap_or_default()
            ),
        }
    }

    fn on_tick(&self, symbol: &str, tick: &Tick) {
        info!(symbol, bid = tick.bid, ask = tick.ask, "tick");
    }

    fn on_bar_data(&self, key: &SeriesKey, bar: &Bar) {
        info!(
            symbol = %key.symbol,
            timeframe = %key.timeframe,
            time = %bar.time,
            open = bar.open,
            high = bar.high,
            low = bar.low,
            close = bar.close,
            tick_volume = bar.tick_volume,
            "bar"
        );
    }

    fn on_historic_data(&self, key: &SeriesKey, series: &HistoricSeries) {
        info!(symbol = %key.symbol, timeframe = %key.timeframe, bars = series.len(), "historic data");
    }

    fn on_historic_trades(&self, trades: &HistoricTrades) {
        info!(trades = trades.len(), "historic trades");
    }
}
