//! Restart recovery from the durable mirror files.
//!
//! Runs before any watcher starts. The messages mirror only yields a
//! delivery floor; nothing is replayed. The orders mirror, when enabled,
//! becomes the baseline the first live poll diffs against.

use tracing::{error, info, warn};

use crate::codec::{self, OrdersDocument};
use crate::error::BridgeError;
use crate::files;
use crate::paths::BridgePaths;

/// Baseline reconstructed from disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Baseline {
    /// Highest timestamp in the messages mirror.
    pub last_delivered_millis: i64,
    /// Raw messages mirror content, used to prime the watcher's raw cache.
    pub messages_raw: Option<String>,
    /// Parsed orders mirror and its raw content.
    pub orders: Option<(OrdersDocument, String)>,
}

/// Read both mirrors. A corrupt messages mirror is fatal; the engine wrote
/// it, so failing to parse it means engine state is damaged.
pub fn recover(paths: &BridgePaths, restore_orders: bool) -> Result<Baseline, BridgeError> {
    let mut baseline = Baseline::default();

    let text = files::read_text(&paths.messages_stored);
    if !text.is_empty() {
        let messages = codec::parse_messages(&text).map_err(|source| {
            error!(path = %paths.messages_stored.display(), "messages mirror is corrupt");
            BridgeError::CorruptMirror {
                path: paths.messages_stored.clone(),
                content: text.clone(),
                source,
            }
        })?;
        baseline.last_delivered_millis = messages.keys().next_back().copied().unwrap_or(0);
        baseline.messages_raw = Some(text);
        info!(floor = baseline.last_delivered_millis, "message delivery floor restored");
    }

    if restore_orders {
        let text = files::read_text(&paths.orders_stored);
        if !text.is_empty() {
            match codec::parse_orders(&text) {
                Ok(doc) => {
                    info!(orders = doc.orders.len(), "orders baseline restored");
                    baseline.orders = Some((doc, text));
                }
                Err(e) => warn!(
                    path = %paths.orders_stored.display(),
                    error = %e,
                    "orders mirror unreadable, starting from empty orders"
                ),
            }
        }
    }

    Ok(baseline)
}
