//! Command dispatcher: writes commands into a rotating pool of slot files.
//!
//! A slot file that exists is a command the peer has not consumed yet; the
//! peer deletes it after reading. The dispatcher only ever creates slot
//! files, never overwrites or removes them.
//!
//! `send` holds one lock across sequence assignment and the whole claim
//! loop, so concurrent callers never share an ID or race for a slot. When
//! every slot stays occupied for the retry window the command is dropped
//! with a warning; the channel has no way to report failure back to the
//! peer, so callers get a [`SendOutcome`] and nothing more.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::files;
use crate::lifecycle::Lifecycle;
use crate::paths::BridgePaths;

/// Sequence IDs cycle through `1..=SEQUENCE_MODULUS`.
pub const SEQUENCE_MODULUS: u32 = 100_000;

/// Name of the command that tells the peer to forget seen sequence IDs.
pub const RESET_COMMAND_IDS: &str = "RESET_COMMAND_IDS";

/// One framed command: `<:seq|NAME|payload:>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub sequence_id: u32,
    pub name: String,
    pub payload: String,
}

impl Command {
    pub fn to_token(&self) -> String {
        format!("<:{}|{}|{}:>", self.sequence_id, self.name, self.payload)
    }
}

/// Wrapping sequence counter.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    last: u32,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next ID: 1, 2, …, 100000, 1, …
    pub fn next_id(&mut self) -> u32 {
        self.last = self.last % SEQUENCE_MODULUS + 1;
        self.last
    }

    pub fn reset(&mut self) {
        self.last = 0;
    }

    pub fn last(&self) -> u32 {
        self.last
    }
}

/// What happened to one `send` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to slot `slot`.
    Written { slot: usize, sequence_id: u32 },
    /// Every slot stayed occupied for the whole retry window.
    TimedOut { sequence_id: u32 },
    /// The bridge was stopped while waiting for a slot.
    Cancelled { sequence_id: u32 },
}

impl SendOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, SendOutcome::Written { .. })
    }
}

/// Timing knobs of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTiming {
    /// Sleep between two scans of a fully occupied pool.
    pub retry_interval: Duration,
    /// Give up on a command after this long.
    pub max_retry: Duration,
    /// Sleep after `RESET_COMMAND_IDS` so the peer sees it first.
    pub reset_quiet_period: Duration,
}

impl DispatchTiming {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            retry_interval: config.poll_interval(),
            max_retry: config.max_retry(),
            reset_quiet_period: config.reset_quiet_period(),
        }
    }
}

#[derive(Debug)]
pub struct CommandDispatcher {
    slots: Vec<PathBuf>,
    timing: DispatchTiming,
    sequence: Mutex<SequenceCounter>,
    lifecycle: Arc<Lifecycle>,
}

impl CommandDispatcher {
    pub fn new(slots: Vec<PathBuf>, timing: DispatchTiming, lifecycle: Arc<Lifecycle>) -> Self {
        Self {
            slots,
            timing,
            sequence: Mutex::new(SequenceCounter::new()),
            lifecycle,
        }
    }

    pub fn from_config(
        paths: &BridgePaths,
        config: &BridgeConfig,
        lifecycle: Arc<Lifecycle>,
    ) -> Self {
        Self::new(
            paths.command_slots(config.command_slots),
            DispatchTiming::from_config(config),
            lifecycle,
        )
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Last sequence ID handed out (0 right after a reset).
    pub fn last_sequence_id(&self) -> u32 {
        self.lock_sequence().last()
    }

    /// Frame `name`/`payload` with the next sequence ID and write it into the
    /// first free slot, retrying until the retry window closes.
    pub fn send(&self, name: &str, payload: &str) -> SendOutcome {
        let mut sequence = self.lock_sequence();
        self.dispatch(&mut sequence, name, payload)
    }

    /// Reset the sequence counter, send `RESET_COMMAND_IDS`, then sleep for
    /// the quiet period so the peer applies the reset before anything else.
    pub fn reset_command_ids(&self) -> SendOutcome {
        let outcome = {
            let mut sequence = self.lock_sequence();
            sequence.reset();
            self.dispatch(&mut sequence, RESET_COMMAND_IDS, "")
        };
        thread::sleep(self.timing.reset_quiet_period);
        outcome
    }

    fn lock_sequence(&self) -> std::sync::MutexGuard<'_, SequenceCounter> {
        self.sequence.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dispatch(&self, sequence: &mut SequenceCounter, name: &str, payload: &str) -> SendOutcome {
        let command = Command {
            sequence_id: sequence.next_id(),
            name: name.to_string(),
            payload: payload.to_string(),
        };
        let token = command.to_token();
        let deadline = Instant::now() + self.timing.max_retry;

        loop {
            if !self.lifecycle.is_active() {
                info!(command = %command.name, id = command.sequence_id, "bridge stopped, command abandoned");
                return SendOutcome::Cancelled {
                    sequence_id: command.sequence_id,
                };
            }

            if let Some(slot) = self.claim_free_slot(&token) {
                debug!(command = %command.name, id = command.sequence_id, slot, "command written");
                return SendOutcome::Written {
                    slot,
                    sequence_id: command.sequence_id,
                };
            }

            if Instant::now() >= deadline {
                warn!(
                    command = %command.name,
                    id = command.sequence_id,
                    retry_secs = self.timing.max_retry.as_secs_f64(),
                    "no free command slot, command dropped"
                );
                return SendOutcome::TimedOut {
                    sequence_id: command.sequence_id,
                };
            }

            thread::sleep(self.timing.retry_interval);
        }
    }

    /// Scan slots 0..N-1 and write `token` into the first one that does not exist.
    fn claim_free_slot(&self, token: &str) -> Option<usize> {
        for (index, path) in self.slots.iter().enumerate() {
            if path.exists() {
                continue;
            }
            match files::write_atomic(path, token) {
                Ok(()) => return Some(index),
                Err(e) => debug!(slot = index, error = %e, "slot write failed"),
            }
        }
        None
    }
}
