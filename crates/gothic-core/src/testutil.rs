//! Fakes for every session collaborator.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::button::ButtonOptions;
use crate::config::Config;
use crate::credential::{Claims, JwtDecoder, User};
use crate::error::ScriptLoadError;
use crate::events::{observer, EventKind, Observer};
use crate::loader::{Library, ScriptLoader};
use crate::marker::MemoryMarkerStore;
use crate::provider::{
    ApiClient, Collaborators, Container, ContainerResolver, CredentialCallback,
    CredentialResponse, IdentityConfig, IdentityProvider, PromptListener, PromptMoment,
    TokenClient, TokenClientConfig, TokenClientFactory, TokenResponse,
};

/// Build an unsigned JWT carrying `claims`.
pub fn make_jwt(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

pub fn sample_claims() -> serde_json::Value {
    serde_json::json!({
        "email": "a@b.com",
        "given_name": "A",
        "family_name": "B",
        "picture": "p",
        "name": "A B",
    })
}

pub fn test_config() -> Config {
    Config::new("cid", "key", "scope", vec!["doc".to_string()])
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub kind: EventKind,
    pub user: Option<User>,
    pub raw: Option<Claims>,
}

#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Recorded>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observer(&self) -> Observer {
        let events = self.events.clone();
        observer(move |kind, user, raw| {
            events.lock().push(Recorded {
                kind,
                user: user.cloned(),
                raw: raw.cloned(),
            });
        })
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }
}

/// Script loader whose completions are released by the test.
#[derive(Default)]
pub struct FakeScripts {
    gates: Mutex<HashMap<Library, oneshot::Receiver<Result<(), ScriptLoadError>>>>,
    requested: Mutex<Vec<Library>>,
}

pub struct ScriptGates {
    senders: HashMap<Library, oneshot::Sender<Result<(), ScriptLoadError>>>,
}

impl ScriptGates {
    pub fn finish(&mut self, library: Library, result: Result<(), ScriptLoadError>) {
        if let Some(tx) = self.senders.remove(&library) {
            let _ = tx.send(result);
        }
    }
}

impl FakeScripts {
    /// Every script loads successfully without waiting.
    pub fn immediate() -> Self {
        Self::default()
    }

    pub fn gated() -> (Self, ScriptGates) {
        let mut gates = HashMap::new();
        let mut senders = HashMap::new();
        for library in Library::ALL {
            let (tx, rx) = oneshot::channel();
            gates.insert(library, rx);
            senders.insert(library, tx);
        }
        let scripts = Self {
            gates: Mutex::new(gates),
            requested: Mutex::new(Vec::new()),
        };
        (scripts, ScriptGates { senders })
    }

    pub fn requested(&self) -> Vec<Library> {
        self.requested.lock().clone()
    }
}

#[async_trait]
impl ScriptLoader for FakeScripts {
    async fn load(&self, library: Library) -> Result<(), ScriptLoadError> {
        self.requested.lock().push(library);
        let gate = self.gates.lock().remove(&library);
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(ScriptLoadError::new(library, "gate dropped"))),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct FakeIdentity {
    pub configured: Mutex<Vec<(String, bool)>>,
    pub rendered: Mutex<Vec<(String, ButtonOptions)>>,
    pub prompts: Mutex<usize>,
    pub auto_select_disabled: Mutex<usize>,
    pub revoked: Mutex<Vec<String>>,
    revoke_gate: Mutex<Option<oneshot::Receiver<()>>>,
    callback: Mutex<Option<CredentialCallback>>,
    listener: Mutex<Option<PromptListener>>,
}

impl FakeIdentity {
    /// Deliver a credential as the provider would, driving the handshake.
    pub fn credential(&self, response: CredentialResponse) -> BoxFuture<'static, ()> {
        let callback = self.callback.lock().clone();
        match callback {
            Some(cb) => cb(response),
            None => async {}.boxed(),
        }
    }

    /// Hold the next revocation until the returned sender fires.
    pub fn revoke_later(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.revoke_gate.lock() = Some(rx);
        tx
    }

    pub fn has_callback(&self) -> bool {
        self.callback.lock().is_some()
    }

    /// Deliver a prompt notification to the last one-tap listener.
    pub fn moment(&self, moment: PromptMoment) {
        if let Some(listener) = self.listener.lock().as_ref() {
            listener(&moment);
        }
    }

    pub fn prompt_count(&self) -> usize {
        *self.prompts.lock()
    }

    pub fn disabled_count(&self) -> usize {
        *self.auto_select_disabled.lock()
    }
}

impl IdentityProvider for FakeIdentity {
    fn configure(&self, config: IdentityConfig) {
        self.configured
            .lock()
            .push((config.client_id.clone(), config.auto_select));
        *self.callback.lock() = Some(config.callback);
    }

    fn render_button(&self, container: &Container, options: &ButtonOptions) {
        self.rendered
            .lock()
            .push((container.id().to_string(), options.clone()));
    }

    fn prompt(&self, listener: PromptListener) {
        *self.prompts.lock() += 1;
        *self.listener.lock() = Some(listener);
    }

    fn disable_auto_select(&self) {
        *self.auto_select_disabled.lock() += 1;
    }

    fn revoke(&self, email: &str) -> BoxFuture<'static, ()> {
        self.revoked.lock().push(email.to_string());
        let gate = self.revoke_gate.lock().take();
        async move {
            if let Some(rx) = gate {
                let _ = rx.await;
            }
        }
        .boxed()
    }
}

enum TokenPlan {
    Now(TokenResponse),
    Gated(oneshot::Receiver<TokenResponse>),
}

/// Token factory answering from a queue of planned responses.
///
/// With nothing queued every request is granted.
#[derive(Default)]
pub struct FakeTokens {
    plans: Mutex<VecDeque<TokenPlan>>,
    pub created: Mutex<Vec<TokenClientConfig>>,
}

impl FakeTokens {
    pub fn respond(&self, response: TokenResponse) {
        self.plans.lock().push_back(TokenPlan::Now(response));
    }

    pub fn respond_later(&self) -> oneshot::Sender<TokenResponse> {
        let (tx, rx) = oneshot::channel();
        self.plans.lock().push_back(TokenPlan::Gated(rx));
        tx
    }
}

struct FakeTokenClient {
    plan: Mutex<Option<TokenPlan>>,
}

#[async_trait]
impl TokenClient for FakeTokenClient {
    async fn request_access_token(&self, _prompt: &str) -> TokenResponse {
        let plan = self.plan.lock().take();
        match plan {
            Some(TokenPlan::Now(response)) => response,
            Some(TokenPlan::Gated(rx)) => rx.await.unwrap_or_default(),
            None => TokenResponse::granted("access-token"),
        }
    }
}

impl TokenClientFactory for FakeTokens {
    fn create_token_client(&self, config: TokenClientConfig) -> Arc<dyn TokenClient> {
        self.created.lock().push(config);
        let plan = self.plans.lock().pop_front();
        Arc::new(FakeTokenClient {
            plan: Mutex::new(plan),
        })
    }
}

#[derive(Default)]
pub struct FakeApi {
    pub fail: Mutex<Option<ScriptLoadError>>,
    pub initialized: Mutex<Vec<(String, Vec<String>)>>,
}

#[async_trait]
impl ApiClient for FakeApi {
    async fn initialize_client(
        &self,
        api_key: &str,
        discovery_docs: &[String],
    ) -> Result<(), ScriptLoadError> {
        self.initialized
            .lock()
            .push((api_key.to_string(), discovery_docs.to_vec()));
        match self.fail.lock().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct FakeContainers {
    ids: HashSet<String>,
}

impl FakeContainers {
    pub fn with(ids: &[&str]) -> Self {
        Self {
            ids: ids.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ContainerResolver for FakeContainers {
    fn find_by_id(&self, id: &str) -> Option<Container> {
        self.ids.contains(id).then(|| Container::new(id))
    }
}

pub struct Harness {
    pub scripts: Arc<FakeScripts>,
    pub identity: Arc<FakeIdentity>,
    pub tokens: Arc<FakeTokens>,
    pub api: Arc<FakeApi>,
    pub markers: Arc<MemoryMarkerStore>,
}

impl Harness {
    pub fn new(scripts: FakeScripts, markers: MemoryMarkerStore) -> Self {
        Self {
            scripts: Arc::new(scripts),
            identity: Arc::new(FakeIdentity::default()),
            tokens: Arc::new(FakeTokens::default()),
            api: Arc::new(FakeApi::default()),
            markers: Arc::new(markers),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            scripts: self.scripts.clone(),
            identity: self.identity.clone(),
            tokens: self.tokens.clone(),
            api: self.api.clone(),
            decoder: Arc::new(JwtDecoder),
            markers: self.markers.clone(),
            containers: Arc::new(FakeContainers::with(&["signin"])),
        }
    }
}
