//! Acquisition of the two external libraries and the joint-readiness gate.
//!
//! Both libraries load concurrently and in no particular order. `Readiness`
//! is the barrier that turns the two independent completions into a single
//! outcome, and `ReadyQueue` holds work requested before that outcome.

use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::ScriptLoadError;

/// Identity library script source
const IDENTITY_SCRIPT_SRC: &str = "https://accounts.google.com/gsi/client";

/// API client library script source
const API_SCRIPT_SRC: &str = "https://apis.google.com/js/api.js";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Library {
    Identity,
    Api,
}

impl Library {
    pub const ALL: [Library; 2] = [Library::Identity, Library::Api];

    pub fn script_src(&self) -> &'static str {
        match self {
            Library::Identity => IDENTITY_SCRIPT_SRC,
            Library::Api => API_SCRIPT_SRC,
        }
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Library::Identity => f.write_str("identity"),
            Library::Api => f.write_str("api"),
        }
    }
}

/// Fetches an external script. Resolves once the script has executed.
#[async_trait]
pub trait ScriptLoader: Send + Sync {
    async fn load(&self, library: Library) -> Result<(), ScriptLoadError>;
}

/// The single outcome of library acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    Pending,
    Ready,
    Failed(ScriptLoadError),
}

#[derive(Debug, Default)]
struct Flags {
    identity: bool,
    api: bool,
}

impl Flags {
    fn set(&mut self, library: Library) -> bool {
        let flag = match library {
            Library::Identity => &mut self.identity,
            Library::Api => &mut self.api,
        };
        let changed = !*flag;
        *flag = true;
        changed
    }

    fn both(&self) -> bool {
        self.identity && self.api
    }
}

/// Barrier over the two library-ready signals.
///
/// The outcome is settled at most once: either by the mark that completes
/// the pair, or by the first failure. Anything arriving afterwards is
/// ignored.
pub struct Readiness {
    flags: Mutex<Flags>,
    tx: watch::Sender<ReadyState>,
}

impl Readiness {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ReadyState::Pending);
        Self {
            flags: Mutex::new(Flags::default()),
            tx,
        }
    }

    /// Record that `library` is ready.
    ///
    /// Returns `true` only for the call that completes joint readiness.
    pub fn mark_ready(&self, library: Library) -> bool {
        let mut flags = self.flags.lock();
        if !flags.set(library) {
            debug!(%library, "Duplicate ready signal ignored");
            return false;
        }
        debug!(%library, "Library ready");

        if !flags.both() {
            return false;
        }
        let settled = self.tx.send_if_modified(|state| match state {
            ReadyState::Pending => {
                *state = ReadyState::Ready;
                true
            }
            _ => false,
        });
        if settled {
            info!("All libraries ready");
        }
        settled
    }

    /// Reject the outcome. Only the first failure is kept.
    pub fn fail(&self, error: ScriptLoadError) -> bool {
        let _flags = self.flags.lock();
        let settled = self.tx.send_if_modified(|state| match state {
            ReadyState::Pending => {
                *state = ReadyState::Failed(error.clone());
                true
            }
            _ => false,
        });
        if settled {
            warn!(error = %error, "Library acquisition failed");
        } else {
            debug!(error = %error, "Late failure ignored");
        }
        settled
    }

    pub fn state(&self) -> ReadyState {
        self.tx.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.tx.borrow(), ReadyState::Ready)
    }

    pub fn is_library_ready(&self, library: Library) -> bool {
        let flags = self.flags.lock();
        match library {
            Library::Identity => flags.identity,
            Library::Api => flags.api,
        }
    }

    /// Wait for the outcome.
    pub async fn wait(&self) -> Result<(), ScriptLoadError> {
        let mut rx = self.tx.subscribe();
        let state = match rx.wait_for(|s| !matches!(s, ReadyState::Pending)).await {
            Ok(state) => state.clone(),
            // The sender lives in self; report the last value it held
            Err(_) => self.state(),
        };
        match state {
            ReadyState::Ready => Ok(()),
            ReadyState::Failed(e) => Err(e),
            ReadyState::Pending => futures::future::pending().await,
        }
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

type Deferred = Box<dyn FnOnce() + Send>;

enum QueueState {
    Waiting(Vec<Deferred>),
    Released,
}

/// One-shot queue of operations gated on readiness.
///
/// Operations queued before `release` run once, in request order, when it
/// is called. Operations arriving afterwards run immediately.
pub struct ReadyQueue {
    state: Mutex<QueueState>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::Waiting(Vec::new())),
        }
    }

    /// Run `op` now if released, otherwise defer it.
    ///
    /// Returns `true` if the operation ran immediately.
    pub fn run_or_defer(&self, op: impl FnOnce() + Send + 'static) -> bool {
        {
            let mut state = self.state.lock();
            if let QueueState::Waiting(pending) = &mut *state {
                pending.push(Box::new(op));
                debug!(pending = pending.len(), "Operation deferred until ready");
                return false;
            }
        }
        op();
        true
    }

    /// Drain the queue. Subsequent calls do nothing.
    pub fn release(&self) -> usize {
        let pending = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, QueueState::Released) {
                QueueState::Waiting(pending) => pending,
                QueueState::Released => return 0,
            }
        };
        let count = pending.len();
        // Lock is released: a deferred op may enqueue more work, which runs inline
        for op in pending {
            op();
        }
        count
    }

    pub fn is_released(&self) -> bool {
        matches!(*self.state.lock(), QueueState::Released)
    }

    pub fn pending(&self) -> usize {
        match &*self.state.lock() {
            QueueState::Waiting(pending) => pending.len(),
            QueueState::Released => 0,
        }
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}
