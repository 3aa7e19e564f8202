use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, info};

use super::{persist_mirror, RawCache, WatchContext, Watcher};
use crate::codec::{self, Order};
use crate::handler::OrderChange;
use crate::state;

/// Tickets in `prev` but not `next` are removed; tickets in `next` but not
/// `prev` are added. Orders whose fields changed under the same ticket are
/// neither.
pub fn diff_orders(prev: &BTreeMap<String, Order>, next: &BTreeMap<String, Order>) -> OrderChange {
    let removed = prev
        .iter()
        .filter(|(ticket, _)| !next.contains_key(*ticket))
        .map(|(ticket, order)| (ticket.clone(), order.clone()))
        .collect();
    let added = next
        .iter()
        .filter(|(ticket, _)| !prev.contains_key(*ticket))
        .map(|(ticket, order)| (ticket.clone(), order.clone()))
        .collect();
    OrderChange {
        removed,
        added,
        open_count: next.len(),
    }
}

pub(crate) struct OrdersWatcher {
    source: RawCache,
    mirror: PathBuf,
    ctx: WatchContext,
}

impl OrdersWatcher {
    pub(crate) fn new(source: RawCache, mirror: PathBuf, ctx: WatchContext) -> Self {
        Self { source, mirror, ctx }
    }
}

impl Watcher for OrdersWatcher {
    const NAME: &'static str = "orders";

    fn tick(&mut self) {
        let Some(text) = self.source.poll() else {
            return;
        };
        let doc = match codec::parse_orders(&text) {
            Ok(doc) => doc,
            Err(e) => {
                debug!(path = %self.source.path().display(), error = %e, "torn orders read");
                return;
            }
        };

        let change = {
            let mut orders = state::write(&self.ctx.state.orders);
            let change = diff_orders(&orders, &doc.orders);
            *orders = doc.orders;
            change
        };
        *state::write(&self.ctx.state.account_info) = doc.account_info;

        if self.ctx.verbose {
            for (ticket, order) in &change.removed {
                info!(ticket = %ticket, symbol = %order.symbol, lots = order.lots, "order removed");
            }
            for (ticket, order) in &change.added {
                info!(ticket = %ticket, symbol = %order.symbol, lots = order.lots, "new order");
            }
        }

        if !change.is_empty() {
            self.ctx.handler.on_order_event(&change);
        }
        persist_mirror(&self.mirror, &text);
    }
}
