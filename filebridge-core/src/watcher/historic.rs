use tracing::{debug, warn};

use super::{RawCache, WatchContext, Watcher};
use crate::codec::{self, SeriesKey};
use crate::files;
use crate::state;

/// Watches both historic files on one loop. Each drop is folded into state
/// and then deleted; the deletion is the peer's delivery receipt.
pub(crate) struct HistoricWatcher {
    data: RawCache,
    trades: RawCache,
    ctx: WatchContext,
}

impl HistoricWatcher {
    pub(crate) fn new(data: RawCache, trades: RawCache, ctx: WatchContext) -> Self {
        Self { data, trades, ctx }
    }

    fn poll_data(&mut self) {
        let Some(text) = self.data.poll() else {
            return;
        };
        let doc = match codec::parse_historic_data(&text) {
            Ok(doc) => doc,
            Err(e) => {
                debug!(path = %self.data.path().display(), error = %e, "torn historic data read");
                return;
            }
        };

        {
            let mut historic = state::write(&self.ctx.state.historic_data);
            for (key, series) in &doc {
                historic.insert(key.clone(), series.clone());
            }
        }
        consume(&mut self.data);

        for (key, series) in &doc {
            if let Some(key) = SeriesKey::parse(key) {
                self.ctx.handler.on_historic_data(&key, series);
            }
        }
    }

    fn poll_trades(&mut self) {
        let Some(text) = self.trades.poll() else {
            return;
        };
        let trades = match codec::parse_historic_trades(&text) {
            Ok(trades) => trades,
            Err(e) => {
                debug!(path = %self.trades.path().display(), error = %e, "torn historic trades read");
                return;
            }
        };

        *state::write(&self.ctx.state.historic_trades) = trades.clone();
        consume(&mut self.trades);

        self.ctx.handler.on_historic_trades(&trades);
    }
}

/// Delete a consumed drop. Once the file is gone the raw cache is cleared so
/// an identical later drop counts as new; if deletion fails the cache stays
/// so the same content is not delivered twice.
fn consume(source: &mut RawCache) {
    match files::remove(source.path()) {
        Ok(()) => source.clear(),
        Err(e) => warn!(path = %source.path().display(), error = %e, "could not delete consumed file"),
    }
}

impl Watcher for HistoricWatcher {
    const NAME: &'static str = "historic";

    fn tick(&mut self) {
        self.poll_data();
        self.poll_trades();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::BridgeEvent;
    use crate::watcher::test_support::{context, drain};
    use std::fs;

    fn watcher(dir: &std::path::Path) -> (HistoricWatcher, std::sync::mpsc::Receiver<BridgeEvent>, WatchContext) {
        let (ctx, rx) = context();
        let w = HistoricWatcher::new(
            RawCache::new(dir.join("historic_data.txt")),
            RawCache::new(dir.join("historic_trades.txt")),
            ctx.clone(),
        );
        (w, rx, ctx)
    }

    #[test]
    fn drops_are_merged_and_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let (mut w, rx, ctx) = watcher(dir.path());
        let path = dir.path().join("historic_data.txt");

        fs::write(&path, r#"{"EURUSD_D1": {"2024.03.01 00:00": {"close": 1.08}}}"#).unwrap();
        w.tick();
        assert!(!path.exists());

        fs::write(&path, r#"{"GBPUSD_H1": {"2024.03.01 10:00": {"close": 1.26}}}"#).unwrap();
        w.tick();
        assert!(!path.exists());

        let historic = ctx.state.historic_data();
        assert_eq!(historic.len(), 2);
        assert!(historic.contains_key("EURUSD_D1"));
        assert!(historic.contains_key("GBPUSD_H1"));

        let keys: Vec<String> = drain(&rx)
            .into_iter()
            .filter_map(|e| match e {
                BridgeEvent::HistoricData { key, .. } => Some(key.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec!["EURUSD_D1", "GBPUSD_H1"]);
    }

    #[test]
    fn identical_redrop_is_processed_again() {
        let dir = tempfile::tempdir().unwrap();
        let (mut w, rx, _ctx) = watcher(dir.path());
        let path = dir.path().join("historic_data.txt");
        let raw = r#"{"EURUSD_D1": {"2024.03.01 00:00": {"close": 1.08}}}"#;

        fs::write(&path, raw).unwrap();
        w.tick();
        fs::write(&path, raw).unwrap();
        w.tick();

        assert_eq!(drain(&rx).len(), 2);
    }

    #[test]
    fn torn_drop_is_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let (mut w, rx, _ctx) = watcher(dir.path());
        let path = dir.path().join("historic_data.txt");

        fs::write(&path, r#"{"EURUSD_D1": {"2024.03"#).unwrap();
        w.tick();
        assert!(path.exists());
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn trades_replace_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let (mut w, rx, ctx) = watcher(dir.path());
        let path = dir.path().join("historic_trades.txt");

        fs::write(&path, r#"{"101": {"symbol": "EURUSD", "pnl": 3.5}}"#).unwrap();
        w.tick();
        fs::write(&path, r#"{"202": {"symbol": "USDJPY", "pnl": -1}}"#).unwrap();
        w.tick();

        assert!(!path.exists());
        let trades = ctx.state.historic_trades();
        assert_eq!(trades.len(), 1);
        assert!(trades.contains_key("202"));
        assert_eq!(drain(&rx).len(), 2);
    }
}
