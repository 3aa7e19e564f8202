//! Command vocabulary understood by the peer, as typed builders over
//! [`CommandDispatcher::send`].
//!
//! Payloads are comma-separated. Prices and volumes use a fixed 5-decimal
//! rendering that does not depend on the process locale.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dispatcher::{CommandDispatcher, SendOutcome};

pub const SUBSCRIBE_SYMBOLS: &str = "SUBSCRIBE_SYMBOLS";
pub const SUBSCRIBE_SYMBOLS_BAR_DATA: &str = "SUBSCRIBE_SYMBOLS_BAR_DATA";
pub const GET_HISTORIC_DATA: &str = "GET_HISTORIC_DATA";
pub const GET_HISTORIC_TRADES: &str = "GET_HISTORIC_TRADES";
pub const OPEN_ORDER: &str = "OPEN_ORDER";
pub const MODIFY_ORDER: &str = "MODIFY_ORDER";
pub const CLOSE_ORDER: &str = "CLOSE_ORDER";
pub const CLOSE_ALL_ORDERS: &str = "CLOSE_ALL_ORDERS";
pub const CLOSE_ORDERS_BY_SYMBOL: &str = "CLOSE_ORDERS_BY_SYMBOL";
pub const CLOSE_ORDERS_BY_MAGIC: &str = "CLOSE_ORDERS_BY_MAGIC";

/// Render a decimal field.
pub fn format_decimal(value: f64) -> String {
    format!("{value:.5}")
}

/// Strip characters that would break the `<:seq|NAME|a,b,c:>` frame.
pub fn sanitize_field(value: &str) -> String {
    value
        .replace("<:", "")
        .replace(":>", "")
        .chars()
        .filter(|c| !matches!(c, ',' | '|' | '\r' | '\n'))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Buy,
    Sell,
    BuyLimit,
    SellLimit,
    BuyStop,
    SellStop,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Buy => "buy",
            OrderType::Sell => "sell",
            OrderType::BuyLimit => "buylimit",
            OrderType::SellLimit => "selllimit",
            OrderType::BuyStop => "buystop",
            OrderType::SellStop => "sellstop",
        }
    }

    pub fn is_pending(&self) -> bool {
        !matches!(self, OrderType::Buy | OrderType::Sell)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(OrderType::Buy),
            "sell" => Ok(OrderType::Sell),
            "buylimit" => Ok(OrderType::BuyLimit),
            "selllimit" => Ok(OrderType::SellLimit),
            "buystop" => Ok(OrderType::BuyStop),
            "sellstop" => Ok(OrderType::SellStop),
            other => Err(format!("unknown order type '{other}'")),
        }
    }
}

/// Arguments of `OPEN_ORDER`. Zero means "not set" for price (market
/// orders), stop loss, take profit and expiration.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub order_type: OrderType,
    pub lots: f64,
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub magic: i64,
    pub comment: String,
    /// Seconds since the epoch.
    pub expiration: i64,
}

impl OrderRequest {
    /// A market order with no SL/TP, magic 0 and no comment.
    pub fn market(symbol: impl Into<String>, order_type: OrderType, lots: f64) -> Self {
        Self {
            symbol: symbol.into(),
            order_type,
            lots,
            price: 0.0,
            stop_loss: 0.0,
            take_profit: 0.0,
            magic: 0,
            comment: String::new(),
            expiration: 0,
        }
    }

    pub fn payload(&self) -> String {
        [
            sanitize_field(&self.symbol),
            self.order_type.as_str().to_string(),
            format_decimal(self.lots),
            format_decimal(self.price),
            format_decimal(self.stop_loss),
            format_decimal(self.take_profit),
            self.magic.to_string(),
            sanitize_field(&self.comment),
            self.expiration.to_string(),
        ]
        .join(",")
    }
}

/// Arguments of `MODIFY_ORDER`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifyRequest {
    pub ticket: u64,
    pub lots: f64,
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub expiration: i64,
}

impl ModifyRequest {
    pub fn payload(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.ticket,
            format_decimal(self.lots),
            format_decimal(self.price),
            format_decimal(self.stop_loss),
            format_decimal(self.take_profit),
            self.expiration
        )
    }
}

impl CommandDispatcher {
    /// Subscribe to tick data for `symbols`.
    pub fn subscribe_symbols<S: AsRef<str>>(&self, symbols: &[S]) -> SendOutcome {
        let payload = symbols
            .iter()
            .map(|s| sanitize_field(s.as_ref()))
            .collect::<Vec<_>>()
            .join(",");
        self.send(SUBSCRIBE_SYMBOLS, &payload)
    }

    /// Subscribe to bar data for `(symbol, timeframe)` pairs.
    pub fn subscribe_symbols_bar_data<S: AsRef<str>, T: AsRef<str>>(
        &self,
        pairs: &[(S, T)],
    ) -> SendOutcome {
        let payload = pairs
            .iter()
            .map(|(s, t)| format!("{},{}", sanitize_field(s.as_ref()), sanitize_field(t.as_ref())))
            .collect::<Vec<_>>()
            .join(",");
        self.send(SUBSCRIBE_SYMBOLS_BAR_DATA, &payload)
    }

    /// Request bars between two epoch-second timestamps. The answer lands in
    /// the historic data file.
    pub fn get_historic_data(&self, symbol: &str, timeframe: &str, start: i64, end: i64) -> SendOutcome {
        let payload = format!(
            "{},{},{start},{end}",
            sanitize_field(symbol),
            sanitize_field(timeframe)
        );
        self.send(GET_HISTORIC_DATA, &payload)
    }

    /// Request the trade history of the last `lookback_days` days.
    pub fn get_historic_trades(&self, lookback_days: u32) -> SendOutcome {
        self.send(GET_HISTORIC_TRADES, &lookback_days.to_string())
    }

    pub fn open_order(&self, request: &OrderRequest) -> SendOutcome {
        self.send(OPEN_ORDER, &request.payload())
    }

    pub fn modify_order(&self, request: &ModifyRequest) -> SendOutcome {
        self.send(MODIFY_ORDER, &request.payload())
    }

    /// Close `lots` of an order; zero closes the whole position.
    pub fn close_order(&self, ticket: u64, lots: f64) -> SendOutcome {
        self.send(CLOSE_ORDER, &format!("{ticket},{}", format_decimal(lots)))
    }

    pub fn close_all_orders(&self) -> SendOutcome {
        self.send(CLOSE_ALL_ORDERS, "")
    }

    pub fn close_orders_by_symbol(&self, symbol: &str) -> SendOutcome {
        self.send(CLOSE_ORDERS_BY_SYMBOL, &sanitize_field(symbol))
    }

    pub fn close_orders_by_magic(&self, magic: i64) -> SendOutcome {
        self.send(CLOSE_ORDERS_BY_MAGIC, &magic.to_string())
    }
}
