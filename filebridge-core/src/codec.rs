//! Snapshot codec: typed records for the JSON documents the peer writes.
//!
//! Every document is a JSON object. The peer writes files in place, so a
//! reader can observe a truncated document; callers treat any
//! [`CodecError`] from a watched file as "no change this tick".

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("empty document")]
    Empty,

    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
}

// ── Orders ───────────────────────────────────────────────────────────

/// One open or pending order as reported by the peer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Order {
    pub magic: i64,
    pub symbol: String,
    pub lots: f64,
    /// `buy`, `sell`, `buylimit`, `selllimit`, `buystop` or `sellstop`.
    #[serde(rename = "type")]
    pub order_type: String,
    pub open_price: f64,
    pub open_time: String,
    #[serde(rename = "SL")]
    pub stop_loss: f64,
    #[serde(rename = "TP")]
    pub take_profit: f64,
    pub pnl: f64,
    pub commission: f64,
    pub swap: f64,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountInfo {
    pub name: String,
    pub number: i64,
    pub currency: String,
    pub leverage: f64,
    pub free_margin: f64,
    pub balance: f64,
    pub equity: f64,
}

/// Content of the orders file: open orders keyed by ticket, plus account info.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrdersDocument {
    pub orders: BTreeMap<String, Order>,
    pub account_info: AccountInfo,
}

// ── Messages ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    Error,
    Info,
    Other(String),
}

/// A record without a `type` reads as an empty `Other` kind.
impl Default for MessageKind {
    fn default() -> Self {
        MessageKind::Other(String::new())
    }
}

impl From<String> for MessageKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ERROR" => MessageKind::Error,
            "INFO" => MessageKind::Info,
            _ => MessageKind::Other(s),
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Error => write!(f, "ERROR"),
            MessageKind::Info => write!(f, "INFO"),
            MessageKind::Other(s) => write!(f, "{s}"),
        }
    }
}

/// A message record: its `type` plus whatever fields the peer attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerMessage {
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl PeerMessage {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// `error_type` of an ERROR message.
    pub fn error_type(&self) -> Option<&str> {
        self.field("error_type")
    }

    /// `description` of an ERROR message.
    pub fn description(&self) -> Option<&str> {
        self.field("description")
    }

    /// `message` of an INFO message.
    pub fn text(&self) -> Option<&str> {
        self.field("message")
    }
}

/// A message together with its millisecond timestamp key.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEntry {
    pub millis: i64,
    pub message: PeerMessage,
}

/// Content of the messages file. Keys are decimal millisecond timestamps;
/// the map iterates in ascending timestamp order.
pub type MessagesDocument = BTreeMap<i64, PeerMessage>;

// ── Market / bar data ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Tick {
    pub bid: f64,
    pub ask: f64,
}

pub type MarketDataDocument = BTreeMap<String, Tick>;

/// Latest bar of a subscribed symbol/timeframe.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Bar {
    pub time: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub tick_volume: i64,
}

pub type BarDataDocument = BTreeMap<String, Bar>;

// ── Historic data / trades ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoricBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub tick_volume: i64,
}

/// Bars of one series keyed by the peer's bar time string (`2024.01.02 00:00`).
pub type HistoricSeries = BTreeMap<String, HistoricBar>;

pub type HistoricDataDocument = BTreeMap<String, HistoricSeries>;

/// Trade history. The engine does not interpret its shape.
pub type HistoricTrades = serde_json::Map<String, Value>;

// ── Series keys ──────────────────────────────────────────────────────

/// A `<symbol>_<timeframe>` key, e.g. `EURUSD_M1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeriesKey {
    pub symbol: String,
    pub timeframe: String,
}

impl SeriesKey {
    pub fn new(symbol: impl Into<String>, timeframe: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: timeframe.into(),
        }
    }

    /// Split a document key. Keys that do not have exactly two parts
    /// (including symbols that themselves contain `_`) yield `None`.
    pub fn parse(key: &str) -> Option<Self> {
        let mut parts = key.split('_');
        let symbol = parts.next()?;
        let timeframe = parts.next()?;
        if parts.next().is_some() || symbol.is_empty() || timeframe.is_empty() {
            return None;
        }
        Some(Self::new(symbol, timeframe))
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.symbol, self.timeframe)
    }
}

// ── Parsing ──────────────────────────────────────────────────────────

fn parse<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    if text.trim().is_empty() {
        return Err(CodecError::Empty);
    }
    Ok(serde_json::from_str(text)?)
}

pub fn parse_orders(text: &str) -> Result<OrdersDocument, CodecError> {
    parse(text)
}

pub fn parse_messages(text: &str) -> Result<MessagesDocument, CodecError> {
    parse(text)
}

pub fn parse_market_data(text: &str) -> Result<MarketDataDocument, CodecError> {
    parse(text)
}

pub fn parse_bar_data(text: &str) -> Result<BarDataDocument, CodecError> {
    parse(text)
}

pub fn parse_historic_data(text: &str) -> Result<HistoricDataDocument, CodecError> {
    parse(text)
}

pub fn parse_historic_trades(text: &str) -> Result<HistoricTrades, CodecError> {
    parse(text)
}
