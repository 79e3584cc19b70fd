use thiserror::Error;

use crate::loader::Library;

#[derive(Error, Debug)]
pub enum GothicError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    ScriptLoad(#[from] ScriptLoadError),

    #[error("No container for sign-in button: '{0}'")]
    ContainerNotFound(String),

    #[error("Credential could not be decoded: {0}")]
    Decode(#[from] DecodeError),

    #[error("Authorization failed - no access token returned")]
    AuthorizationFailed,

    #[error("No user is signed in")]
    NotSignedIn,
}

/// An external library failed to load. Cloned to every readiness waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to load {library} library: {reason}")]
pub struct ScriptLoadError {
    pub library: Library,
    pub reason: String,
}

impl ScriptLoadError {
    pub fn new(library: Library, reason: impl Into<String>) -> Self {
        Self {
            library,
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Credential response carried no credential")]
    MissingCredential,

    #[error("Expected 3 token segments, found {0}")]
    Segments(usize),

    #[error("Payload is not valid base64url: {0}")]
    Base64(String),

    #[error("Payload is not valid JSON: {0}")]
    Json(String),

    #[error("Required claim missing: {0}")]
    MissingClaim(&'static str),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required field '{0}'")]
    Missing(&'static str),
}

/// Maximum length of a token fragment echoed into error messages
const MAX_TOKEN_ECHO_LENGTH: usize = 32;

impl DecodeError {
    /// Truncate token material so it never lands in logs in full
    pub(crate) fn excerpt(token: &str) -> String {
        match token.char_indices().nth(MAX_TOKEN_ECHO_LENGTH) {
            Some((idx, _)) => format!("{}... ({} total bytes)", &token[..idx], token.len()),
            None => token.to_string(),
        }
    }
}

pub type Result<T, E = GothicError> = std::result::Result<T, E>;
