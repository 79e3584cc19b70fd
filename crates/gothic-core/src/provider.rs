//! Interfaces to the collaborators the session depends on.
//!
//! The identity provider, token client, API client library, marker storage
//! and container lookup all live outside this crate (a browser binding, or a
//! fake in tests). The session talks to them only through these traits.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::button::ButtonOptions;
use crate::credential::Claims;
use crate::error::{DecodeError, ScriptLoadError};
use crate::loader::ScriptLoader;

/// Response delivered to the credential callback after sign-in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialResponse {
    pub credential: Option<String>,
    /// How the credential was selected ("auto", "user", "btn", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select_by: Option<String>,
}

impl CredentialResponse {
    pub fn new(credential: impl Into<String>) -> Self {
        Self {
            credential: Some(credential.into()),
            select_by: None,
        }
    }
}

/// Invoked by the identity provider with each credential it issues.
///
/// The returned future performs the sign-in handshake; the provider
/// binding is responsible for driving it to completion.
pub type CredentialCallback = Arc<dyn Fn(CredentialResponse) -> BoxFuture<'static, ()> + Send + Sync>;

/// Receives the outcome of a one-tap prompt.
pub type PromptListener = Box<dyn Fn(&PromptMoment) + Send + Sync>;

#[derive(Clone)]
pub struct IdentityConfig {
    pub client_id: String,
    pub auto_select: bool,
    pub callback: CredentialCallback,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("client_id", &self.client_id)
            .field("auto_select", &self.auto_select)
            .finish_non_exhaustive()
    }
}

/// Why a one-tap prompt was not shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotDisplayedReason {
    SuppressedByUser,
    UnknownReason,
    BrowserNotSupported,
    InvalidClient,
    MissingClientId,
    OptOutOrNoSession,
    SecureHttpRequired,
    UnregisteredOrigin,
    Other(String),
}

impl NotDisplayedReason {
    pub fn parse(reason: &str) -> Self {
        match reason {
            "suppressed_by_user" => Self::SuppressedByUser,
            "unknown_reason" => Self::UnknownReason,
            "browser_not_supported" => Self::BrowserNotSupported,
            "invalid_client" => Self::InvalidClient,
            "missing_client_id" => Self::MissingClientId,
            "opt_out_or_no_session" => Self::OptOutOrNoSession,
            "secure_http_required" => Self::SecureHttpRequired,
            "unregistered_origin" => Self::UnregisteredOrigin,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A notification from the one-tap prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptMoment {
    not_displayed: Option<NotDisplayedReason>,
    skipped: bool,
}

impl PromptMoment {
    pub fn displayed() -> Self {
        Self::default()
    }

    pub fn not_displayed(reason: NotDisplayedReason) -> Self {
        Self {
            not_displayed: Some(reason),
            skipped: false,
        }
    }

    pub fn skipped() -> Self {
        Self {
            not_displayed: None,
            skipped: true,
        }
    }

    pub fn is_not_displayed(&self) -> bool {
        self.not_displayed.is_some()
    }

    pub fn not_displayed_reason(&self) -> Option<&NotDisplayedReason> {
        self.not_displayed.as_ref()
    }

    pub fn is_skipped_moment(&self) -> bool {
        self.skipped
    }
}

/// Opaque handle to a UI element that can host the sign-in button.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Container {
    id: String,
}

impl Container {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

pub trait IdentityProvider: Send + Sync {
    fn configure(&self, config: IdentityConfig);
    fn render_button(&self, container: &Container, options: &ButtonOptions);
    fn prompt(&self, listener: PromptListener);
    fn disable_auto_select(&self);
    /// Revoke the grant for `email`. Resolves when the provider reports done.
    fn revoke(&self, email: &str) -> BoxFuture<'static, ()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClientConfig {
    pub client_id: String,
    pub scope: String,
    pub login_hint: String,
}

/// Token response; success iff an access token is present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TokenResponse {
    pub fn granted(token: impl Into<String>) -> Self {
        Self {
            access_token: Some(token.into()),
            error: None,
        }
    }

    pub fn denied(error: impl Into<String>) -> Self {
        Self {
            access_token: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait TokenClient: Send + Sync {
    async fn request_access_token(&self, prompt: &str) -> TokenResponse;
}

pub trait TokenClientFactory: Send + Sync {
    fn create_token_client(&self, config: TokenClientConfig) -> Arc<dyn TokenClient>;
}

#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn initialize_client(
        &self,
        api_key: &str,
        discovery_docs: &[String],
    ) -> Result<(), ScriptLoadError>;
}

pub trait CredentialDecoder: Send + Sync {
    fn decode(&self, token: &str) -> Result<Claims, DecodeError>;
}

/// Boolean-presence flags keyed by a fixed identifier.
pub trait MarkerStore: Send + Sync {
    fn has(&self, key: &str) -> bool;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

pub trait ContainerResolver: Send + Sync {
    fn find_by_id(&self, id: &str) -> Option<Container>;
}

/// Everything a session needs from the outside world.
#[derive(Clone)]
pub struct Collaborators {
    pub scripts: Arc<dyn ScriptLoader>,
    pub identity: Arc<dyn IdentityProvider>,
    pub tokens: Arc<dyn TokenClientFactory>,
    pub api: Arc<dyn ApiClient>,
    pub decoder: Arc<dyn CredentialDecoder>,
    pub markers: Arc<dyn MarkerStore>,
    pub containers: Arc<dyn ContainerResolver>,
}
