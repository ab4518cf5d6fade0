//! One-shot resolution of the package compression dictionary.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::decompress::DecompressionDict;
use crate::{Error, Result};

const UNRESOLVED: u8 = 0;
const RESOLVING: u8 = 1;
const READY: u8 = 2;
const FAILED: u8 = 3;

/// Resolution state of a package's compression dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DictionaryState {
    /// Nobody has asked for the dictionary yet.
    Unresolved,
    /// A caller is loading it.
    Resolving,
    /// Resolution finished. The package may still have no dictionary.
    Ready,
    /// Resolution failed. Terminal.
    Failed,
}

impl DictionaryState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            UNRESOLVED => Self::Unresolved,
            RESOLVING => Self::Resolving,
            READY => Self::Ready,
            _ => Self::Failed,
        }
    }
}

/// Holds the dictionary once it is materialized.
///
/// Exactly one caller wins the `Unresolved -> Resolving` transition and runs
/// the load without holding any lock. Everyone else blocks until the state
/// leaves `Resolving` and then sees the same outcome.
pub(crate) struct DictionaryCell {
    state: AtomicU8,
    value: OnceLock<Option<DecompressionDict>>,
    failure: OnceLock<String>,
    gate: Mutex<()>,
    settled: Condvar,
}

impl DictionaryCell {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(UNRESOLVED),
            value: OnceLock::new(),
            failure: OnceLock::new(),
            gate: Mutex::new(()),
            settled: Condvar::new(),
        }
    }

    pub fn state(&self) -> DictionaryState {
        DictionaryState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// The dictionary, if resolution succeeded and the package has one.
    pub fn get(&self) -> Option<&DecompressionDict> {
        if self.state.load(Ordering::Acquire) != READY {
            return None;
        }
        self.value.get().and_then(Option::as_ref)
    }

    /// Resolve the dictionary with `load`, or wait for the caller that is.
    pub fn resolve<F>(&self, load: F) -> Result<()>
    where
        F: FnOnce() -> Result<Option<DecompressionDict>>,
    {
        loop {
            match self.state.load(Ordering::Acquire) {
                READY => return Ok(()),
                FAILED => return Err(self.failure_error()),
                RESOLVING => self.wait(),
                _ => {
                    if self
                        .state
                        .compare_exchange(UNRESOLVED, RESOLVING, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return self.commit(load());
                    }
                }
            }
        }
    }

    fn commit(&self, outcome: Result<Option<DecompressionDict>>) -> Result<()> {
        let result = {
            let _gate = self.gate.lock();
            match outcome {
                Ok(dict) => {
                    debug!(size = dict.as_ref().map_or(0, |d| d.len()), "compression dictionary ready");
                    let _ = self.value.set(dict);
                    self.state.store(READY, Ordering::Release);
                    Ok(())
                }
                Err(err) => {
                    let _ = self.failure.set(err.to_string());
                    self.state.store(FAILED, Ordering::Release);
                    Err(err)
                }
            }
        };
        self.settled.notify_all();
        result
    }

    fn wait(&self) {
        let mut gate = self.gate.lock();
        while self.state.load(Ordering::Acquire) == RESOLVING {
            self.settled.wait(&mut gate);
        }
    }

    fn failure_error(&self) -> Error {
        let message = self
            .failure
            .get()
            .cloned()
            .unwrap_or_else(|| "dictionary resolution failed".to_string());
        Error::InvalidDictionary(message)
    }
}
