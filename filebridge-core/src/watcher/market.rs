use tracing::debug;

use super::{RawCache, WatchContext, Watcher};
use crate::codec::{self, Tick};
use crate::state;

/// Replaces the quote snapshot on every change and notifies once per
/// symbol whose quote is new or different.
pub(crate) struct MarketDataWatcher {
    source: RawCache,
    ctx: WatchContext,
}

impl MarketDataWatcher {
    pub(crate) fn new(source: RawCache, ctx: WatchContext) -> Self {
        Self { source, ctx }
    }
}

impl Watcher for MarketDataWatcher {
    const NAME: &'static str = "market-data";

    fn tick(&mut self) {
        let Some(text) = self.source.poll() else {
            return;
        };
        let doc = match codec::parse_market_data(&text) {
            Ok(doc) => doc,
            Err(e) => {
                debug!(path = %self.source.path().display(), error = %e, "torn market data read");
                return;
            }
        };

        let changed: Vec<(String, Tick)> = {
            let mut snapshot = state::write(&self.ctx.state.market_data);
            let changed: Vec<_> = doc
                .iter()
                .filter(|(symbol, tick)| snapshot.get(*symbol) != Some(*tick))
                .map(|(symbol, tick)| (symbol.clone(), *tick))
                .collect();
            *snapshot = doc;
            changed
        };

        for (symbol, tick) in &changed {
            self.ctx.handler.on_tick(symbol, tick);
        }
    }
}
