//! Filebridge Core: a file-based command/event bridge to a trading terminal.
//!
//! The terminal and this crate share nothing but a directory:
//! - Commands go out as framed tokens written into rotating slot files
//! - Orders, messages, quotes, bars and historic data come back as JSON files
//! - One polling watcher per inbound file diffs snapshots and notifies
//! - Mirror files let a restarted bridge resume without replaying messages

pub mod bridge;
pub mod codec;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod files;
pub mod handler;
pub mod lifecycle;
pub mod paths;
pub mod recovery;
pub mod state;
pub mod watcher;

pub use bridge::{Bridge, WatchSet};
pub use config::{BridgeConfig, ConfigError};
pub use dispatcher::{CommandDispatcher, SendOutcome};
pub use error::BridgeError;
pub use handler::{BridgeEvent, ChannelHandler, EventHandler, LoggingHandler, NoopHandler, OrderChange};
pub use lifecycle::LifecycleState;
