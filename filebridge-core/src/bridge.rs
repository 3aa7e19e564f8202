//! Bridge controller: wires recovery, watchers and the dispatcher together
//! and owns their threads.

use std::collections::BTreeMap;
use std::fs;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use crate::codec::{
    AccountInfo, BarDataDocument, HistoricDataDocument, HistoricTrades, MarketDataDocument, Order,
};
use crate::config::BridgeConfig;
use crate::dispatcher::CommandDispatcher;
use crate::error::BridgeError;
use crate::handler::EventHandler;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::paths::BridgePaths;
use crate::recovery::{self, Baseline};
use crate::state::{self, SharedState};
use crate::watcher::{
    self, BarDataWatcher, HistoricWatcher, MarketDataWatcher, MessagesWatcher, OrdersWatcher,
    PollSchedule, RawCache, WatchContext,
};

/// Which inbound files a bridge polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSet {
    pub orders: bool,
    pub messages: bool,
    pub market_data: bool,
    pub bar_data: bool,
    /// Historic data and historic trades drop files.
    pub historic: bool,
}

impl WatchSet {
    pub const ALL: WatchSet = WatchSet {
        orders: true,
        messages: true,
        market_data: true,
        bar_data: true,
        historic: true,
    };

    /// Commands only; no inbound file is read.
    pub const NONE: WatchSet = WatchSet {
        orders: false,
        messages: false,
        market_data: false,
        bar_data: false,
        historic: false,
    };

    pub const HISTORIC: WatchSet = WatchSet {
        historic: true,
        ..WatchSet::NONE
    };
}

/// A running bridge. Dropping it stops the watchers.
pub struct Bridge {
    config: BridgeConfig,
    paths: BridgePaths,
    state: Arc<SharedState>,
    dispatcher: Arc<CommandDispatcher>,
    lifecycle: Arc<Lifecycle>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Bridge {
    /// Start the bridge and block until it is ready.
    ///
    /// Validates the configuration, restores the baseline from the mirror
    /// files, starts one watcher thread per inbound file, resets the peer's
    /// command IDs, waits the settle period and finally opens the readiness
    /// gate. Notifications start only after this returns.
    pub fn connect(config: BridgeConfig, handler: Arc<dyn EventHandler>) -> Result<Self, BridgeError> {
        Self::connect_with(config, handler, WatchSet::ALL)
    }

    /// Like [`Bridge::connect`], but only starts the watchers in `watches`.
    ///
    /// Files outside the set are left untouched, so a short-lived bridge
    /// that skips the messages file leaves pending messages (and the
    /// messages mirror) for the next full connect.
    pub fn connect_with(
        config: BridgeConfig,
        handler: Arc<dyn EventHandler>,
        watches: WatchSet,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        if !config.files_dir.is_dir() {
            return Err(BridgeError::MissingDirectory {
                path: config.files_dir.clone(),
            });
        }

        let paths = BridgePaths::from_config(&config);
        fs::create_dir_all(&paths.dir).map_err(|source| BridgeError::Io {
            path: paths.dir.clone(),
            source,
        })?;

        let lifecycle = Arc::new(Lifecycle::new());
        let state = Arc::new(SharedState::new());
        let dispatcher = Arc::new(CommandDispatcher::from_config(&paths, &config, lifecycle.clone()));

        lifecycle_step(&lifecycle, LifecycleState::Recovering);
        let baseline = recovery::recover(&paths, config.restore_orders)?;

        let bridge = Self {
            config,
            paths,
            state,
            dispatcher,
            lifecycle,
            workers: Mutex::new(Vec::new()),
        };

        lifecycle_step(&bridge.lifecycle, LifecycleState::PollingNotReady);
        if let Err(e) = bridge.start_watchers(baseline, handler, watches) {
            bridge.stop();
            return Err(e);
        }

        bridge.dispatcher.reset_command_ids();
        thread::sleep(bridge.config.start_settle());
        bridge.lifecycle.open_gate();
        info!(dir = %bridge.paths.dir.display(), "bridge ready");
        Ok(bridge)
    }

    fn start_watchers(
        &self,
        baseline: Baseline,
        handler: Arc<dyn EventHandler>,
        watches: WatchSet,
    ) -> Result<(), BridgeError> {
        let Baseline {
            last_delivered_millis,
            messages_raw,
            orders,
        } = baseline;

        self.state.set_last_delivered_millis(last_delivered_millis);
        let orders_source = match orders {
            Some((doc, raw)) => {
                *state::write(&self.state.orders) = doc.orders;
                *state::write(&self.state.account_info) = doc.account_info;
                RawCache::primed(self.paths.orders.clone(), raw)
            }
            None => RawCache::new(self.paths.orders.clone()),
        };
        let messages_source = match messages_raw {
            Some(raw) => RawCache::primed(self.paths.messages.clone(), raw),
            None => RawCache::new(self.paths.messages.clone()),
        };

        let ctx = WatchContext {
            state: self.state.clone(),
            handler,
            verbose: self.config.verbose,
        };
        let schedule = PollSchedule {
            interval: self.config.poll_interval(),
            jitter: self.config.poll_jitter(),
        };
        let paths = &self.paths;

        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());
        if watches.orders {
            workers.push(watcher::spawn(
                OrdersWatcher::new(orders_source, paths.orders_stored.clone(), ctx.clone()),
                self.lifecycle.clone(),
                schedule,
            )?);
        }
        if watches.messages {
            workers.push(watcher::spawn(
                MessagesWatcher::new(messages_source, paths.messages_stored.clone(), ctx.clone()),
                self.lifecycle.clone(),
                schedule,
            )?);
        }
        if watches.market_data {
            workers.push(watcher::spawn(
                MarketDataWatcher::new(RawCache::new(paths.market_data.clone()), ctx.clone()),
                self.lifecycle.clone(),
                schedule,
            )?);
        }
        if watches.bar_data {
            workers.push(watcher::spawn(
                BarDataWatcher::new(RawCache::new(paths.bar_data.clone()), ctx.clone()),
                self.lifecycle.clone(),
                schedule,
            )?);
        }
        if watches.historic {
            workers.push(watcher::spawn(
                HistoricWatcher::new(
                    RawCache::new(paths.historic_data.clone()),
                    RawCache::new(paths.historic_trades.clone()),
                    ctx,
                ),
                self.lifecycle.clone(),
                schedule,
            )?);
        }
        Ok(())
    }

    /// Deactivate and join every watcher thread. Safe to call more than once.
    ///
    /// May be called from an [`EventHandler`] callback. The calling watcher
    /// thread is not joined; it exits once the callback returns.
    pub fn stop(&self) {
        self.lifecycle.deactivate();
        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        if workers.is_empty() {
            return;
        }
        let current = thread::current().id();
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("watcher thread panicked");
            }
        }
        info!("bridge stopped");
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle.is_ready()
    }

    /// Command surface. Cloning the `Arc` lets other threads send commands.
    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn paths(&self) -> &BridgePaths {
        &self.paths
    }

    pub fn open_orders(&self) -> BTreeMap<String, Order> {
        self.state.open_orders()
    }

    pub fn account_info(&self) -> AccountInfo {
        self.state.account_info()
    }

    pub fn market_data(&self) -> MarketDataDocument {
        self.state.market_data()
    }

    pub fn bar_data(&self) -> BarDataDocument {
        self.state.bar_data()
    }

    pub fn historic_data(&self) -> HistoricDataDocument {
        self.state.historic_data()
    }

    pub fn historic_trades(&self) -> HistoricTrades {
        self.state.historic_trades()
    }

    pub fn last_delivered_millis(&self) -> i64 {
        self.state.last_delivered_millis()
    }
}

fn lifecycle_step(lifecycle: &Lifecycle, next: LifecycleState) {
    if !lifecycle.advance(next) {
        warn!(?next, current = ?lifecycle.state(), "lifecycle did not advance");
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop();
    }
}
