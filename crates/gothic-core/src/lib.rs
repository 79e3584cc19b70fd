//! gothic-core - browser sign-in session coordination
//!
//! Reconciles an identity provider library and a separate API authorization
//! library into one session:
//! - Concurrent acquisition of both libraries behind a single readiness gate
//! - Button rendering and one-tap prompts deferred until ready
//! - Two-step sign-in: credential decode, then access token authorization
//! - Lifecycle events fanned out to any number of observers
//! - A persisted marker recording that this user signed in before

pub mod button;
pub mod config;
pub mod credential;
pub mod error;
pub mod events;
pub mod loader;
pub mod marker;
pub mod provider;
pub mod session;
#[cfg(test)]
pub mod testutil;

pub use button::ButtonOptions;
pub use config::Config;
pub use credential::{Claims, JwtDecoder, User};
pub use error::{ConfigError, DecodeError, GothicError, ScriptLoadError};
pub use events::{observer, EventBus, EventKind, Observer};
pub use loader::{Library, ReadyQueue, Readiness, ScriptLoader};
pub use marker::{FileMarkerStore, MemoryMarkerStore};
pub use provider::Collaborators;
pub use session::Session;
