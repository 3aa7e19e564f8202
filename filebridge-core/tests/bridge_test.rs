//! End-to-end bridge tests against a temporary shared directory.
//!
//! The test plays the terminal: it writes the inbound JSON files and
//! inspects command slots, while the bridge runs its real watcher threads.

use std::fs;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use filebridge_core::codec::Tick;
use filebridge_core::{
    Bridge, BridgeConfig, BridgeError, BridgeEvent, ChannelHandler, EventHandler, LifecycleState, WatchSet,
};

const WAIT: Duration = Duration::from_secs(5);

fn fast_config(dir: &Path) -> BridgeConfig {
    BridgeConfig {
        poll_interval_ms: 1,
        reset_quiet_period_ms: 10,
        start_settle_ms: 10,
        max_retry_command_secs: 1,
        verbose: false,
        ..BridgeConfig::new(dir)
    }
}

fn connect(dir: &Path) -> (Bridge, Receiver<BridgeEvent>) {
    let (tx, rx) = mpsc::channel();
    let bridge = Bridge::connect(fast_config(dir), Arc::new(ChannelHandler::new(tx))).unwrap();
    (bridge, rx)
}

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

/// Collect events until `quiet` passes without one.
fn settle(rx: &Receiver<BridgeEvent>, quiet: Duration) -> Vec<BridgeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.recv_timeout(quiet) {
        events.push(event);
    }
    events
}

#[test]
fn order_changes_are_notified_and_mirrored() {
    let dir = tempfile::tempdir().unwrap();
    let (bridge, rx) = connect(dir.path());
    let paths = bridge.paths().clone();

    let raw = r#"{"orders": {"101": {"symbol": "EURUSD", "lots": 0.1, "type": "buy"}},
                  "account_info": {"balance": 1000, "equity": 1001}}"#;
    fs::write(&paths.orders, raw).unwrap();

    match rx.recv_timeout(WAIT).unwrap() {
        BridgeEvent::Orders(change) => {
            assert_eq!(change.added.len(), 1);
            assert_eq!(change.added[0].0, "101");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(bridge.open_orders().len(), 1);
    assert_eq!(bridge.account_info().equity, 1001.0);
    assert!(wait_until(|| fs::read_to_string(&paths.orders_stored).ok().as_deref() == Some(raw)));

    fs::write(&paths.orders, r#"{"orders": {}}"#).unwrap();
    match rx.recv_timeout(WAIT).unwrap() {
        BridgeEvent::Orders(change) => {
            assert_eq!(change.removed.len(), 1);
            assert_eq!(change.open_count, 0);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn messages_delivered_once_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let (bridge, rx) = connect(dir.path());
    let paths = bridge.paths().clone();

    fs::write(
        &paths.messages,
        r#"{"1700000000300": {"type": "INFO", "message": "c"},
            "1700000000100": {"type": "INFO", "message": "a"},
            "1700000000200": {"type": "ERROR", "error_type": "X", "description": "b"}}"#,
    )
    .unwrap();

    let events = settle(&rx, Duration::from_millis(100));
    let millis: Vec<i64> = events
        .iter()
        .filter_map(|e| match e {
            BridgeEvent::Message(entry) => Some(entry.millis),
            _ => None,
        })
        .collect();
    assert_eq!(millis, vec![1700000000100, 1700000000200, 1700000000300]);
    assert_eq!(bridge.last_delivered_millis(), 1700000000300);
}

#[test]
fn restart_resumes_after_last_delivered_message() {
    let dir = tempfile::tempdir().unwrap();
    let first_doc = r#"{"100": {"type": "INFO"}, "200": {"type": "INFO"}}"#;

    {
        let (bridge, rx) = connect(dir.path());
        fs::write(&bridge.paths().messages, first_doc).unwrap();
        let events = settle(&rx, Duration::from_millis(100));
        assert_eq!(events.len(), 2);
        assert!(wait_until(|| fs::read_to_string(&bridge.paths().messages_stored)
            .map(|s| s == first_doc)
            .unwrap_or(false)));
    }

    let (bridge, rx) = connect(dir.path());
    assert_eq!(bridge.last_delivered_millis(), 200);
    // Same document still on disk: nothing is replayed.
    assert!(settle(&rx, Duration::from_millis(50)).is_empty());

    fs::write(
        &bridge.paths().messages,
        r#"{"100": {"type": "INFO"}, "200": {"type": "INFO"}, "300": {"type": "INFO"}}"#,
    )
    .unwrap();
    let millis: Vec<i64> = settle(&rx, Duration::from_millis(100))
        .into_iter()
        .filter_map(|e| match e {
            BridgeEvent::Message(entry) => Some(entry.millis),
            _ => None,
        })
        .collect();
    assert_eq!(millis, vec![300]);
}

#[test]
fn restart_restores_orders_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let raw = r#"{"orders": {"7": {"symbol": "USDJPY"}}}"#;

    {
        let (bridge, rx) = connect(dir.path());
        fs::write(&bridge.paths().orders, raw).unwrap();
        rx.recv_timeout(WAIT).unwrap();
        assert!(wait_until(|| bridge.paths().orders_stored.exists()));
    }

    let (bridge, rx) = connect(dir.path());
    assert_eq!(bridge.open_orders().len(), 1);
    // Orders file unchanged since the mirror was written: no event.
    assert!(settle(&rx, Duration::from_millis(50)).is_empty());
}

#[test]
fn corrupt_messages_mirror_aborts_startup() {
    let dir = tempfile::tempdir().unwrap();
    let ns = dir.path().join("DWX");
    fs::create_dir_all(&ns).unwrap();
    fs::write(ns.join("DWX_Messages_Stored.txt"), "{\"1\": ").unwrap();

    let (tx, _rx) = mpsc::channel();
    let err = Bridge::connect(fast_config(dir.path()), Arc::new(ChannelHandler::new(tx)))
        .err()
        .unwrap();
    assert!(matches!(err, BridgeError::CorruptMirror { .. }));
}

#[test]
fn historic_drops_are_folded_and_consumed() {
    let dir = tempfile::tempdir().unwrap();
    let (bridge, rx) = connect(dir.path());
    let paths = bridge.paths().clone();

    fs::write(&paths.historic_data, r#"{"EURUSD_D1": {"2024.03.01 00:00": {"close": 1.08}}}"#).unwrap();
    assert!(wait_until(|| !paths.historic_data.exists()));
    fs::write(&paths.historic_data, r#"{"GBPUSD_H4": {"2024.03.01 04:00": {"close": 1.26}}}"#).unwrap();
    assert!(wait_until(|| !paths.historic_data.exists()));

    let historic = bridge.historic_data();
    assert!(historic.contains_key("EURUSD_D1"));
    assert!(historic.contains_key("GBPUSD_H4"));

    fs::write(&paths.historic_trades, r#"{"55": {"symbol": "EURUSD", "pnl": 2.0}}"#).unwrap();
    assert!(wait_until(|| !paths.historic_trades.exists()));
    assert!(bridge.historic_trades().contains_key("55"));

    let kinds: Vec<&'static str> = settle(&rx, Duration::from_millis(50))
        .iter()
        .map(|e| match e {
            BridgeEvent::HistoricData { .. } => "data",
            BridgeEvent::HistoricTrades(_) => "trades",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["data", "data", "trades"]);
}

#[test]
fn quotes_and_bars_notify_per_key() {
    let dir = tempfile::tempdir().unwrap();
    let (bridge, rx) = connect(dir.path());
    let paths = bridge.paths().clone();

    fs::write(&paths.market_data, r#"{"EURUSD": {"bid": 1.1, "ask": 1.1001}}"#).unwrap();
    match rx.recv_timeout(WAIT).unwrap() {
        BridgeEvent::Tick { symbol, tick } => {
            assert_eq!(symbol, "EURUSD");
            assert_eq!(tick.ask, 1.1001);
        }
        other => panic!("unexpected event {other:?}"),
    }

    fs::write(&paths.bar_data, r#"{"EURUSD_M1": {"time": "2024.03.01 10:00", "close": 1.1}}"#).unwrap();
    match rx.recv_timeout(WAIT).unwrap() {
        BridgeEvent::Bar { key, bar } => {
            assert_eq!(key.timeframe, "M1");
            assert_eq!(bar.close, 1.1);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(bridge.bar_data().len(), 1);
}

#[test]
fn commands_after_startup_continue_the_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let (bridge, _rx) = connect(dir.path());
    let paths = bridge.paths().clone();

    // Startup reset occupies slot 0 until the terminal consumes it.
    assert_eq!(fs::read_to_string(paths.command_slot(0)).unwrap(), "<:1|RESET_COMMAND_IDS|:>");

    let outcome = bridge.dispatcher().subscribe_symbols(&["EURUSD", "GBPUSD"]);
    assert!(outcome.is_written());
    assert_eq!(
        fs::read_to_string(paths.command_slot(1)).unwrap(),
        "<:2|SUBSCRIBE_SYMBOLS|EURUSD,GBPUSD:>"
    );
}

#[test]
fn stop_cancels_and_drop_is_clean() {
    let dir = tempfile::tempdir().unwrap();
    let (bridge, _rx) = connect(dir.path());
    let dispatcher = bridge.dispatcher().clone();

    bridge.stop();
    assert_eq!(bridge.state(), LifecycleState::Stopped);
    assert!(!dispatcher.close_all_orders().is_written());
    drop(bridge);
}

#[test]
fn historic_only_bridge_leaves_messages_for_the_next_connect() {
    let dir = tempfile::tempdir().unwrap();
    let (tx, rx) = mpsc::channel();
    let bridge =
        Bridge::connect_with(fast_config(dir.path()), Arc::new(ChannelHandler::new(tx)), WatchSet::HISTORIC).unwrap();
    let paths = bridge.paths().clone();

    fs::write(&paths.messages, r#"{"100": {"type": "ERROR", "description": "rejected"}}"#).unwrap();
    fs::write(&paths.historic_trades, "{}").unwrap();

    // An empty trade history is still an answer.
    match rx.recv_timeout(WAIT).unwrap() {
        BridgeEvent::HistoricTrades(trades) => assert!(trades.is_empty()),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(settle(&rx, Duration::from_millis(50)).is_empty());
    assert!(!paths.messages_stored.exists());
    assert_eq!(bridge.last_delivered_millis(), 0);
    drop(bridge);

    let (bridge, rx) = connect(dir.path());
    let millis: Vec<i64> = settle(&rx, Duration::from_millis(100))
        .into_iter()
        .filter_map(|e| match e {
            BridgeEvent::Message(entry) => Some(entry.millis),
            _ => None,
        })
        .collect();
    assert_eq!(millis, vec![100]);
    assert_eq!(bridge.last_delivered_millis(), 100);
}

/// Stops the bridge from inside the first tick callback and reports the
/// state it saw, after releasing its handle.
struct StopOnTick {
    bridge: Mutex<Option<Arc<Bridge>>>,
    done: Mutex<Sender<LifecycleState>>,
}

impl EventHandler for StopOnTick {
    fn on_tick(&self, _symbol: &str, _tick: &Tick) {
        let bridge = self.bridge.lock().unwrap().take();
        if let Some(bridge) = bridge {
            bridge.stop();
            let state = bridge.state();
            // Last handle: the bridge is dropped on this watcher thread.
            drop(bridge);
            let _ = self.done.lock().unwrap().send(state);
        }
    }
}

#[test]
fn handler_can_stop_and_drop_the_bridge_on_a_watcher_thread() {
    let dir = tempfile::tempdir().unwrap();
    let (done_tx, done_rx) = mpsc::channel();
    let handler = Arc::new(StopOnTick {
        bridge: Mutex::new(None),
        done: Mutex::new(done_tx),
    });

    let bridge = Arc::new(Bridge::connect(fast_config(dir.path()), handler.clone()).unwrap());
    let market_data = bridge.paths().market_data.clone();
    *handler.bridge.lock().unwrap() = Some(bridge);

    fs::write(&market_data, r#"{"EURUSD": {"bid": 1.1, "ask": 1.1001}}"#).unwrap();
    assert_eq!(done_rx.recv_timeout(WAIT).unwrap(), LifecycleState::Stopped);
}
