//! Lifecycle notifications for UI code.
//!
//! Observers are plain callbacks. They are invoked synchronously, in
//! subscription order, and a panicking observer never stops delivery to
//! the observers registered after it.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::credential::{Claims, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum EventKind {
    #[serde(rename = "loaded")]
    Loaded,
    #[serde(rename = "signin")]
    SignIn,
    #[serde(rename = "signout")]
    SignOut,
    #[serde(rename = "revoke")]
    Revoke,
    #[serde(rename = "onetap_suppressed")]
    OneTapSuppressed,
    #[serde(rename = "onetap_failed")]
    OneTapFailed,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "auth-failed")]
    AuthFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Loaded => "loaded",
            EventKind::SignIn => "signin",
            EventKind::SignOut => "signout",
            EventKind::Revoke => "revoke",
            EventKind::OneTapSuppressed => "onetap_suppressed",
            EventKind::OneTapFailed => "onetap_failed",
            EventKind::Error => "error",
            EventKind::AuthFailed => "auth-failed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer callback: event kind, the user (if any), the raw decoded claims (if any).
pub type Observer = Arc<dyn Fn(EventKind, Option<&User>, Option<&Claims>) + Send + Sync>;

/// Wrap a closure as an [`Observer`].
///
/// Keep the returned handle to unsubscribe later; identity is by handle,
/// not by closure.
pub fn observer<F>(f: F) -> Observer
where
    F: Fn(EventKind, Option<&User>, Option<&Claims>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Ordered, duplicate-tolerant observer registry.
#[derive(Default)]
pub struct EventBus {
    observers: Mutex<Vec<Observer>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Observer) {
        self.observers.lock().push(observer);
    }

    /// Remove the first registration of `observer`. No-op if absent.
    pub fn unsubscribe(&self, observer: &Observer) {
        let mut observers = self.observers.lock();
        if let Some(pos) = observers.iter().position(|o| Arc::ptr_eq(o, observer)) {
            observers.remove(pos);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notify every observer registered at the time of the call.
    pub fn emit(&self, kind: EventKind, user: Option<&User>, raw: Option<&Claims>) {
        // Snapshot so observers may (un)subscribe from inside a callback
        let observers: Vec<Observer> = self.observers.lock().clone();
        debug!(event = %kind, observers = observers.len(), "Emitting lifecycle event");

        for (index, observer) in observers.iter().enumerate() {
            let result = catch_unwind(AssertUnwindSafe(|| observer(kind, user, raw)));
            if result.is_err() {
                warn!(event = %kind, observer = index, "Observer panicked, continuing");
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.len())
            .finish()
    }
}
