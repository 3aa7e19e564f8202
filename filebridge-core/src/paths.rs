//! File layout of the shared directory.
//!
//! Layout: `{files_dir}/{ns}/{ns}_{Name}.txt`

use std::path::{Path, PathBuf};

use crate::config::BridgeConfig;

/// Every path the bridge reads, writes or deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgePaths {
    pub dir: PathBuf,
    pub orders: PathBuf,
    pub messages: PathBuf,
    pub market_data: PathBuf,
    pub bar_data: PathBuf,
    pub historic_data: PathBuf,
    pub historic_trades: PathBuf,
    pub orders_stored: PathBuf,
    pub messages_stored: PathBuf,
    command_prefix: String,
}

impl BridgePaths {
    pub fn new(files_dir: &Path, namespace: &str) -> Self {
        let dir = files_dir.join(namespace);
        let file = |name: &str| dir.join(format!("{namespace}_{name}.txt"));
        Self {
            orders: file("Orders"),
            messages: file("Messages"),
            market_data: file("Market_Data"),
            bar_data: file("Bar_Data"),
            historic_data: file("Historic_Data"),
            historic_trades: file("Historic_Trades"),
            orders_stored: file("Orders_Stored"),
            messages_stored: file("Messages_Stored"),
            command_prefix: format!("{namespace}_Commands_"),
            dir,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(&config.files_dir, &config.namespace)
    }

    /// Path of command slot `index`.
    pub fn command_slot(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}{index}.txt", self.command_prefix))
    }

    /// All `count` command slot paths, in scan order.
    pub fn command_slots(&self, count: usize) -> Vec<PathBuf> {
        (0..count).map(|i| self.command_slot(i)).collect()
    }
}
