use tracing::debug;

use super::{RawCache, WatchContext, Watcher};
use crate::codec::{self, Bar, SeriesKey};
use crate::state;

/// Like the market data watcher, keyed by `<symbol>_<timeframe>`. Keys that
/// do not split into symbol and timeframe are kept in the snapshot but not
/// notified.
pub(crate) struct BarDataWatcher {
    source: RawCache,
    ctx: WatchContext,
}

impl BarDataWatcher {
    pub(crate) fn new(source: RawCache, ctx: WatchContext) -> Self {
        Self { source, ctx }
    }
}

impl Watcher for BarDataWatcher {
    const NAME: &'static str = "bar-data";

    fn tick(&mut self) {
        let Some(text) = self.source.poll() else {
            return;
        };
        let doc = match codec::parse_bar_data(&text) {
            Ok(doc) => doc,
            Err(e) => {
                debug!(path = %self.source.path().display(), error = %e, "torn bar data read");
                return;
            }
        };

        let changed: Vec<(SeriesKey, Bar)> = {
            let mut snapshot = state::write(&self.ctx.state.bar_data);
            let changed: Vec<_> = doc
                .iter()
                .filter(|(key, bar)| snapshot.get(*key) != Some(*bar))
                .filter_map(|(key, bar)| SeriesKey::parse(key).map(|k| (k, bar.clone())))
                .collect();
            *snapshot = doc;
            changed
        };

        for (key, bar) in &changed {
            self.ctx.handler.on_bar_data(key, bar);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::BridgeEvent;
    use crate::watcher::test_support::{context, drain};
    use std::fs;

    #[test]
    fn notifies_changed_series_and_skips_malformed_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bars.txt");
        let (ctx, rx) = context();
        let mut w = BarDataWatcher::new(RawCache::new(path.clone()), ctx.clone());

        fs::write(
            &path,
            r#"{"EURUSD_M1": {"time": "10:00", "close": 1.1},
                "US_30_H1": {"time": "10:00", "close": 35000},
                "AUDCAD_M5": {"time": "10:00", "close": 0.9}}"#,
        )
        .unwrap();
        w.tick();
        let keys: Vec<String> = drain(&rx)
            .into_iter()
            .map(|e| match e {
                BridgeEvent::Bar { key, .. } => key.to_string(),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(keys, vec!["AUDCAD_M5", "EURUSD_M1"]);
        assert_eq!(ctx.state.bar_data().len(), 3);

        fs::write(
            &path,
            r#"{"EURUSD_M1": {"time": "10:01", "close": 1.2},
                "US_30_H1": {"time": "10:00", "close": 35000},
                "AUDCAD_M5": {"time": "10:00", "close": 0.9}}"#,
        )
        .unwrap();
        w.tick();
        let events = drain(&rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            BridgeEvent::Bar { key, bar } if key.symbol == "EURUSD" && bar.time == "10:01"
        ));
    }
}
