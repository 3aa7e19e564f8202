//! State watchers: one polling loop per inbound file.
//!
//! Every loop follows the same skeleton:
//! 1. sleep the poll interval (plus optional jitter)
//! 2. skip until the readiness gate is open
//! 3. read the file; empty content means "no change"
//! 4. skip content identical to the previous read
//! 5. parse; a parse failure is a torn write, retried on the next tick
//! 6. diff against the previous snapshot and publish the new one
//! 7. notify, after the snapshot lock is released
//!
//! The per-kind steps 5-7 live in the submodules.

mod bars;
mod historic;
mod market;
mod messages;
mod orders;

pub use orders::diff_orders;

pub(crate) use bars::BarDataWatcher;
pub(crate) use historic::HistoricWatcher;
pub(crate) use market::MarketDataWatcher;
pub(crate) use messages::MessagesWatcher;
pub(crate) use orders::OrdersWatcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::files;
use crate::handler::EventHandler;
use crate::lifecycle::Lifecycle;
use crate::state::SharedState;

/// Sleep policy of a watcher loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub jitter: Duration,
}

impl PollSchedule {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            jitter: Duration::ZERO,
        }
    }

    /// Interval plus a uniform random extra in `[0, jitter]`.
    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.interval;
        }
        self.interval + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Last raw content read from one watched file.
#[derive(Debug)]
pub(crate) struct RawCache {
    path: PathBuf,
    last: String,
}

impl RawCache {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            last: String::new(),
        }
    }

    /// Start from content already seen (restored from a mirror).
    pub(crate) fn primed(path: PathBuf, last: String) -> Self {
        Self { path, last }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file and return its content if it is non-empty and differs
    /// from the previous read. The content is cached before parsing so a
    /// torn read is not parsed twice.
    pub(crate) fn poll(&mut self) -> Option<String> {
        let text = files::read_text(&self.path);
        if text.is_empty() || text == self.last {
            return None;
        }
        self.last.clone_from(&text);
        Some(text)
    }

    pub(crate) fn clear(&mut self) {
        self.last.clear();
    }
}

/// What every watcher needs besides its own file.
#[derive(Clone)]
pub(crate) struct WatchContext {
    pub state: Arc<SharedState>,
    pub handler: Arc<dyn EventHandler>,
    pub verbose: bool,
}

/// Persist `content` to a mirror file. Failures are logged only.
pub(crate) fn persist_mirror(path: &Path, content: &str) {
    if let Err(e) = files::write_atomic(path, content) {
        warn!(path = %path.display(), error = %e, "mirror write failed");
    }
}

pub(crate) trait Watcher: Send + 'static {
    /// Short name used in thread names and logs.
    const NAME: &'static str;

    /// One poll of the watched file(s).
    fn tick(&mut self);
}

fn run<W: Watcher>(mut watcher: W, lifecycle: Arc<Lifecycle>, schedule: PollSchedule) {
    debug!(watcher = W::NAME, "watcher started");
    while lifecycle.is_active() {
        thread::sleep(schedule.next_delay());
        if !lifecycle.is_ready() {
            continue;
        }
        watcher.tick();
    }
    debug!(watcher = W::NAME, "watcher stopped");
}

/// Run `watcher` on its own named thread until the lifecycle is deactivated.
pub(crate) fn spawn<W: Watcher>(
    watcher: W,
    lifecycle: Arc<Lifecycle>,
    schedule: PollSchedule,
) -> Result<JoinHandle<()>, BridgeError> {
    thread::Builder::new()
        .name(format!("filebridge-{}", W::NAME))
        .spawn(move || run(watcher, lifecycle, schedule))
        .map_err(|source| BridgeError::Spawn {
            name: W::NAME.to_string(),
            source,
        })
}
