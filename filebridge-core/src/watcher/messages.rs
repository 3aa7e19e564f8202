use std::ops::Bound;
use std::path::PathBuf;

use tracing::debug;

use super::{persist_mirror, RawCache, WatchContext, Watcher};
use crate::codec::{self, MessageEntry};

/// Delivers each message once, in ascending timestamp order, never at or
/// below the highest timestamp already delivered.
pub(crate) struct MessagesWatcher {
    source: RawCache,
    mirror: PathBuf,
    ctx: WatchContext,
    last_delivered: i64,
}

impl MessagesWatcher {
    pub(crate) fn new(source: RawCache, mirror: PathBuf, ctx: WatchContext) -> Self {
        let last_delivered = ctx.state.last_delivered_millis();
        Self {
            source,
            mirror,
            ctx,
            last_delivered,
        }
    }
}

impl Watcher for MessagesWatcher {
    const NAME: &'static str = "messages";

    fn tick(&mut self) {
        let Some(text) = self.source.poll() else {
            return;
        };
        let doc = match codec::parse_messages(&text) {
            Ok(doc) => doc,
            Err(e) => {
                debug!(path = %self.source.path().display(), error = %e, "torn messages read");
                return;
            }
        };

        for (&millis, message) in doc.range((Bound::Excluded(self.last_delivered), Bound::Unbounded)) {
            self.last_delivered = millis;
            self.ctx.state.set_last_delivered_millis(millis);
            self.ctx.handler.on_message(&MessageEntry {
                millis,
                message: message.clone(),
            });
        }

        persist_mirror(&self.mirror, &text);
    }
}
