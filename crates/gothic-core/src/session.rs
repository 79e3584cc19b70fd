//! Sign-in session coordination.
//!
//! A `Session` owns the current user, the recognition flag captured at
//! startup, and the gate that holds UI operations until both external
//! libraries are ready. Sign-in completes in two steps: the identity
//! credential is decoded, then an access token is requested for the
//! configured scope. Only when both succeed is the user considered signed in.
//!
//! Every handshake is tagged with a generation. Signing out, revoking, or a
//! newer credential bumps the generation, and a handshake that resolves
//! under a stale generation is dropped without touching state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::future::try_join;
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::button::ButtonOptions;
use crate::config::Config;
use crate::credential::{Claims, User};
use crate::error::{DecodeError, GothicError, Result, ScriptLoadError};
use crate::events::{EventBus, EventKind, Observer};
use crate::loader::{Library, ReadyQueue, Readiness};
use crate::marker::{RECOGNITION_KEY, RECOGNITION_VALUE};
use crate::provider::{
    Collaborators, CredentialCallback, CredentialResponse, IdentityConfig, NotDisplayedReason,
    PromptMoment, TokenClient, TokenClientConfig,
};

/// Prompt value for the token request; empty lets the provider skip consent when possible
const TOKEN_PROMPT: &str = "";

#[derive(Default)]
struct SessionState {
    user: Option<User>,
    generation: u64,
    token_client: Option<Arc<dyn TokenClient>>,
    access_token: Option<String>,
}

struct Inner {
    config: Config,
    previously_recognized: bool,
    collaborators: Collaborators,
    bus: EventBus,
    readiness: Readiness,
    queue: ReadyQueue,
    load_started: AtomicBool,
    state: Mutex<SessionState>,
}

/// Handle to a sign-in session. Clone is cheap.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Create a session from validated configuration.
    ///
    /// The recognition marker is read once, here. Library acquisition starts
    /// with [`Session::load`], which must be called inside a tokio runtime.
    pub fn initialize(config: Config, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let previously_recognized = collaborators.markers.has(RECOGNITION_KEY);
        info!(
            client_id = %config.client_id,
            previously_recognized,
            "Session initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                previously_recognized,
                collaborators,
                bus: EventBus::new(),
                readiness: Readiness::new(),
                queue: ReadyQueue::new(),
                load_started: AtomicBool::new(false),
                state: Mutex::new(SessionState::default()),
            }),
        })
    }

    /// Acquire both external libraries concurrently.
    ///
    /// Resolves when both are ready, or with the first load failure. The
    /// acquisition runs on a task the session owns, so dropping this future
    /// does not stall readiness. Calling this again only waits for the
    /// outcome of the first call.
    pub async fn load(&self) -> Result<()> {
        if !self.inner.load_started.swap(true, Ordering::SeqCst) {
            debug!("Loading external libraries");
            let session = self.clone();
            tokio::spawn(async move {
                let identity = session.acquire(Library::Identity);
                let api = session.acquire(Library::Api);
                if let Err(e) = try_join(identity, api).await {
                    debug!(error = %e, "Library acquisition stopped");
                }
            });
        }
        self.ready().await?;
        Ok(())
    }

    async fn acquire(&self, library: Library) -> Result<(), ScriptLoadError> {
        let result = self.fetch(library).await;
        match result {
            Ok(()) => {
                if self.inner.readiness.mark_ready(library) {
                    self.on_ready();
                }
                Ok(())
            }
            Err(e) => {
                self.inner.readiness.fail(e.clone());
                Err(e)
            }
        }
    }

    async fn fetch(&self, library: Library) -> Result<(), ScriptLoadError> {
        let c = &self.inner.collaborators;
        c.scripts.load(library).await?;
        if library == Library::Api {
            c.api
                .initialize_client(&self.inner.config.api_key, &self.inner.config.discovery)
                .await?;
        }
        Ok(())
    }

    /// Configure the identity library, announce `loaded`, then replay
    /// deferred operations in request order.
    ///
    /// Observers always see `loaded` before any event a deferred one-tap
    /// prompt can produce.
    fn on_ready(&self) {
        self.configure_identity(true);
        self.inner.bus.emit(EventKind::Loaded, None, None);
        let replayed = self.inner.queue.release();
        debug!(replayed, "Deferred operations released");
    }

    /// Wait for joint readiness of both libraries.
    pub async fn ready(&self) -> Result<(), ScriptLoadError> {
        self.inner.readiness.wait().await
    }

    pub fn is_ready(&self) -> bool {
        self.inner.readiness.is_ready()
    }

    /// Whether a sign-in had completed in an earlier process, as of `initialize`.
    pub fn recognize(&self) -> bool {
        self.inner.previously_recognized
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.state.lock().user.clone()
    }

    /// Access token from the last completed sign-in.
    pub fn access_token(&self) -> Option<String> {
        self.inner.state.lock().access_token.clone()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn subscribe(&self, observer: Observer) {
        self.inner.bus.subscribe(observer);
    }

    pub fn unsubscribe(&self, observer: &Observer) {
        self.inner.bus.unsubscribe(observer);
    }

    /// Render the provider's sign-in button into the container `container_id`.
    ///
    /// The container is resolved immediately; rendering waits for readiness.
    pub fn render_button(&self, container_id: &str, options: ButtonOptions) -> Result<()> {
        let container = self
            .inner
            .collaborators
            .containers
            .find_by_id(container_id)
            .ok_or_else(|| GothicError::ContainerNotFound(container_id.to_string()))?;
        let options = options.merged_over_defaults();
        let identity = self.inner.collaborators.identity.clone();

        self.inner.queue.run_or_defer(move || {
            debug!(container = container.id(), "Rendering sign-in button");
            identity.render_button(&container, &options);
        });
        Ok(())
    }

    /// Start the one-tap flow once both libraries are ready.
    pub fn start_one_tap(&self) {
        let weak = self.downgrade();
        self.inner.queue.run_or_defer(move || {
            if let Some(session) = Session::upgrade(&weak) {
                session.prompt_one_tap();
            }
        });
    }

    fn prompt_one_tap(&self) {
        self.configure_identity(true);
        let weak = self.downgrade();
        debug!("Prompting one-tap");
        self.inner
            .collaborators
            .identity
            .prompt(Box::new(move |moment: &PromptMoment| {
                if let Some(session) = Session::upgrade(&weak) {
                    session.handle_prompt_moment(moment);
                }
            }));
    }

    fn handle_prompt_moment(&self, moment: &PromptMoment) {
        if let Some(reason) = moment.not_displayed_reason() {
            match reason {
                NotDisplayedReason::SuppressedByUser => {
                    info!("One-tap suppressed by user");
                    self.clear();
                    self.inner.bus.emit(EventKind::OneTapSuppressed, None, None);
                }
                NotDisplayedReason::UnknownReason => {
                    // Often a browser extension intercepting the prompt
                    warn!("One-tap not displayed for unknown reason");
                    self.inner.bus.emit(EventKind::OneTapFailed, None, None);
                }
                other => debug!(reason = ?other, "One-tap not displayed"),
            }
        }
        if moment.is_skipped_moment() {
            debug!("One-tap skipped");
            self.inner.bus.emit(EventKind::OneTapSuppressed, None, None);
        }
    }

    /// Forget the current user. Idempotent.
    pub fn sign_out(&self) {
        self.clear();
        info!("Signed out");
        self.inner.bus.emit(EventKind::SignOut, None, None);
    }

    /// Revoke the provider grant for the signed-in user, then sign out.
    ///
    /// If the session moved on while the provider was revoking (a new
    /// sign-in, a sign-out), the local state is left alone and no `revoke`
    /// event is emitted.
    pub async fn revoke_access(&self) -> Result<()> {
        let (email, generation) = {
            let state = self.inner.state.lock();
            let email = state
                .user
                .as_ref()
                .map(|u| u.email.clone())
                .ok_or(GothicError::NotSignedIn)?;
            (email, state.generation)
        };

        self.inner.collaborators.identity.revoke(&email).await;
        let current = self.inner.state.lock().generation;
        if current != generation {
            debug!(generation, current, "Session changed during revoke, state kept");
            return Ok(());
        }
        self.clear();
        info!("Access revoked");
        self.inner.bus.emit(EventKind::Revoke, None, None);
        Ok(())
    }

    fn clear(&self) {
        {
            let mut state = self.inner.state.lock();
            state.user = None;
            state.access_token = None;
            state.token_client = None;
            state.generation += 1;
        }
        if let Err(e) = self.inner.collaborators.markers.remove(RECOGNITION_KEY) {
            warn!(error = %e, "Failed to remove recognition marker");
        }
        if self.inner.readiness.is_library_ready(Library::Identity) {
            self.inner.collaborators.identity.disable_auto_select();
        } else {
            debug!("Identity library not loaded, auto-select left untouched");
        }
    }

    fn configure_identity(&self, auto_select: bool) {
        self.inner.collaborators.identity.configure(IdentityConfig {
            client_id: self.inner.config.client_id.clone(),
            auto_select,
            callback: self.credential_callback(),
        });
    }

    fn credential_callback(&self) -> CredentialCallback {
        let weak = self.downgrade();
        Arc::new(move |response: CredentialResponse| {
            let session = Session::upgrade(&weak);
            async move {
                match session {
                    Some(session) => session.complete_sign_in(response).await,
                    None => debug!("Credential arrived after session was dropped"),
                }
            }
            .boxed()
        })
    }

    /// Handle a credential from the identity provider.
    async fn complete_sign_in(&self, response: CredentialResponse) {
        let generation = {
            let mut state = self.inner.state.lock();
            state.user = None;
            state.access_token = None;
            state.generation += 1;
            state.generation
        };
        debug!(generation, select_by = ?response.select_by, "Credential received");

        let Some(token) = response.credential else {
            self.fail_sign_in(generation, EventKind::Error, None, DecodeError::MissingCredential.into());
            return;
        };

        let claims = match self.inner.collaborators.decoder.decode(&token) {
            Ok(claims) => claims,
            Err(e) => {
                self.fail_sign_in(generation, EventKind::Error, None, e.into());
                return;
            }
        };
        let user = match User::from_claims(&claims) {
            Ok(user) => user,
            Err(e) => {
                self.fail_sign_in(generation, EventKind::Error, Some(&claims), e.into());
                return;
            }
        };

        let access_token = match self.authorize(generation, &user).await {
            Ok(token) => token,
            Err(e) => {
                self.fail_sign_in(generation, EventKind::AuthFailed, Some(&claims), e);
                return;
            }
        };

        {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                debug!(generation, current = state.generation, "Stale sign-in discarded");
                return;
            }
            state.user = Some(user.clone());
            state.access_token = Some(access_token);
        }

        if let Err(e) = self
            .inner
            .collaborators
            .markers
            .set(RECOGNITION_KEY, RECOGNITION_VALUE)
        {
            warn!(error = %e, "Failed to persist recognition marker");
        }
        info!(email = %user.email, "Signed in");
        self.inner
            .bus
            .emit(EventKind::SignIn, Some(&user), Some(&claims));
    }

    /// Request an access token scoped to the configured scope, hinted with the user.
    async fn authorize(&self, generation: u64, user: &User) -> Result<String> {
        let client = self
            .inner
            .collaborators
            .tokens
            .create_token_client(TokenClientConfig {
                client_id: self.inner.config.client_id.clone(),
                scope: self.inner.config.scope.clone(),
                login_hint: user.email.clone(),
            });
        {
            let mut state = self.inner.state.lock();
            if state.generation == generation {
                state.token_client = Some(client.clone());
            }
        }

        let response = client.request_access_token(TOKEN_PROMPT).await;
        match response.access_token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => {
                debug!(error = ?response.error, "Token response carried no access token");
                Err(GothicError::AuthorizationFailed)
            }
        }
    }

    fn fail_sign_in(
        &self,
        generation: u64,
        kind: EventKind,
        claims: Option<&Claims>,
        error: GothicError,
    ) {
        {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                debug!(generation, error = %error, "Stale sign-in failure discarded");
                return;
            }
            state.user = None;
            state.token_client = None;
        }
        warn!(error = %error, event = %kind, "Sign-in failed");
        self.inner.bus.emit(kind, None, claims);
    }

    fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<Inner>) -> Option<Session> {
        weak.upgrade().map(|inner| Session { inner })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("client_id", &self.inner.config.client_id)
            .field("ready", &self.is_ready())
            .field("signed_in", &self.inner.state.lock().user.is_some())
            .finish()
    }
}
