//! Fatal bridge errors.
//!
//! Transient conditions (torn reads, a full slot pool) never reach this type;
//! they are logged and absorbed where they occur.

use std::path::PathBuf;

use thiserror::Error;

use crate::codec::CodecError;
use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("directory does not exist: {}", path.display())]
    MissingDirectory { path: PathBuf },

    #[error("the contents of {} could not be parsed: {source}. Content: {content}", path.display())]
    CorruptMirror {
        path: PathBuf,
        content: String,
        #[source]
        source: CodecError,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
