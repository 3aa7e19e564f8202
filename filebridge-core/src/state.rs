//! In-memory snapshots, one lock per entity.
//!
//! Each entity has exactly one writer: its watcher. Readers get clones, so
//! they never hold a lock while a watcher wants to publish.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::codec::{
    AccountInfo, BarDataDocument, HistoricDataDocument, HistoricTrades, MarketDataDocument, Order,
};

#[derive(Debug, Default)]
pub struct SharedState {
    pub(crate) orders: RwLock<BTreeMap<String, Order>>,
    pub(crate) account_info: RwLock<AccountInfo>,
    pub(crate) market_data: RwLock<MarketDataDocument>,
    pub(crate) bar_data: RwLock<BarDataDocument>,
    pub(crate) historic_data: RwLock<HistoricDataDocument>,
    pub(crate) historic_trades: RwLock<HistoricTrades>,
    last_delivered_millis: AtomicI64,
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_orders(&self) -> BTreeMap<String, Order> {
        read(&self.orders).clone()
    }

    pub fn account_info(&self) -> AccountInfo {
        read(&self.account_info).clone()
    }

    pub fn market_data(&self) -> MarketDataDocument {
        read(&self.market_data).clone()
    }

    pub fn bar_data(&self) -> BarDataDocument {
        read(&self.bar_data).clone()
    }

    pub fn historic_data(&self) -> HistoricDataDocument {
        read(&self.historic_data).clone()
    }

    pub fn historic_trades(&self) -> HistoricTrades {
        read(&self.historic_trades).clone()
    }

    /// Highest message timestamp delivered so far (0 when none).
    pub fn last_delivered_millis(&self) -> i64 {
        self.last_delivered_millis.load(Ordering::Acquire)
    }

    pub(crate) fn set_last_delivered_millis(&self, millis: i64) {
        self.last_delivered_millis.store(millis, Ordering::Release);
    }
}
