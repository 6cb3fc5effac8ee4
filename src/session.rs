//! Agent session
//!
//! Ties the pieces together: registers (or finds) the agent, then runs the
//! feed manager and the decision pipeline as two background tasks joined by
//! an unbounded channel, so reading the feed never waits on a decision.

use crate::api::{AgentApiClient, PartnerApiClient, RegisterRequest};
use crate::config::{env_vars, Config};
use crate::feed::{FeedConnector, FeedManager, FeedStatus, WsConnector};
use crate::pipeline::DecisionPipeline;
use crate::policy::{ApprovalPolicy, RejectAll};
use crate::signing::{CanonicalSigner, RequestKey};
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Who the agent is: name, key pair and API key
pub struct AgentIdentity {
    pub name: String,
    key: Arc<RequestKey>,
    api_key: SecretString,
    /// Tenant for partner detail lookups
    pub company_id: Option<String>,
}

impl AgentIdentity {
    pub fn new(
        name: impl Into<String>,
        key: RequestKey,
        api_key: SecretString,
        company_id: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            key: Arc::new(key),
            api_key,
            company_id,
        }
    }

    /// Key from `agent.private_key_path`, API key from `APIKEY`
    pub fn from_config(config: &Config) -> Result<Self> {
        let key = RequestKey::from_file(&config.agent.private_key_path)?;
        let api_key = std::env::var(env_vars::API_KEY)
            .map_err(|_| Error::Config(format!("{} must be set", env_vars::API_KEY)))?;
        Ok(Self::new(
            config.agent.name.clone(),
            key,
            SecretString::from(api_key),
            config.partner.company_id.clone(),
        ))
    }

    pub fn key(&self) -> &Arc<RequestKey> {
        &self.key
    }

    /// Signer for partner requests made with this identity's key
    pub fn signer(&self) -> CanonicalSigner {
        CanonicalSigner::new(Some(Arc::clone(&self.key)))
    }
}

impl std::fmt::Debug for AgentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentIdentity")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("api_key", &"[REDACTED]")
            .field("company_id", &self.company_id)
            .finish()
    }
}

pub struct AgentSession {
    config: Config,
    identity: AgentIdentity,
    agent: Arc<AgentApiClient>,
    partner: Arc<PartnerApiClient>,
    connector: Arc<dyn FeedConnector>,
    policy: Arc<dyn ApprovalPolicy>,
    agent_id: OnceLock<String>,
    init_lock: tokio::sync::Mutex<()>,
    feed_status: OnceLock<Arc<FeedStatus>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AgentSession {
    /// Build a session. Nothing is contacted until [`initialize`](Self::initialize).
    ///
    /// The default policy rejects everything.
    pub fn new(config: Config, identity: AgentIdentity) -> Result<Self> {
        let endpoints = config.endpoints()?;
        let connector: Arc<dyn FeedConnector> =
            Arc::new(WsConnector::new(endpoints.feed().clone()));
        let agent = Arc::new(AgentApiClient::new(endpoints));
        let partner = Arc::new(PartnerApiClient::new(
            &config.partner.base_url,
            identity.api_key.clone(),
            identity.signer(),
        )?);

        Ok(Self {
            config,
            identity,
            agent,
            partner,
            connector,
            policy: Arc::new(RejectAll),
            agent_id: OnceLock::new(),
            init_lock: tokio::sync::Mutex::new(()),
            feed_status: OnceLock::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let identity = AgentIdentity::from_config(&config)?;
        Self::new(config, identity)
    }

    pub fn with_policy(mut self, policy: impl ApprovalPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Replace the WebSocket feed transport
    pub fn with_connector(mut self, connector: Arc<dyn FeedConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.get().map(String::as_str)
    }

    /// Present once the feed has been started
    pub fn feed_status(&self) -> Option<Arc<FeedStatus>> {
        self.feed_status.get().cloned()
    }

    /// Return the agent id already registered for this API key, registering
    /// a new agent when there is none
    pub async fn register_or_lookup(&self) -> Result<String> {
        let existing = self
            .agent
            .list_agents()
            .await
            .ok_or_else(|| Error::Registration("could not list existing agents".to_string()))?;

        if let Some(agent_id) = existing.into_iter().next() {
            tracing::info!(agent_id = %agent_id, "Agent already registered");
            return Ok(agent_id);
        }

        let request = RegisterRequest {
            name: self.identity.name.clone(),
            apikey: self.identity.api_key.expose_secret().to_string(),
            base64privatekey: self.identity.key.pem_base64(),
        };
        let response = self
            .agent
            .register(&request)
            .await
            .ok_or_else(|| Error::Registration("could not register".to_string()))?;

        tracing::info!(agent_id = %response.agent_id, name = %self.identity.name, "Agent registered");
        Ok(response.agent_id)
    }

    /// Register, then start the feed. Calling it again returns the same id
    /// and does not start a second feed.
    pub async fn initialize(&self) -> Result<String> {
        let _guard = self.init_lock.lock().await;
        if let Some(agent_id) = self.agent_id.get() {
            tracing::debug!(agent_id = %agent_id, "Session already initialized");
            return Ok(agent_id.clone());
        }

        let agent_id = self.register_or_lookup().await?;
        let agent_id = self.agent_id.get_or_init(|| agent_id).clone();
        self.start_feed();

        tracing::info!(agent_id = %agent_id, "Session initialized");
        Ok(agent_id)
    }

    fn start_feed(&self) {
        let (tx, rx) = mpsc::unbounded_channel();

        let manager = FeedManager::new(
            Arc::clone(&self.connector),
            self.config.feed.reconnect_delay(),
        );
        let _ = self.feed_status.set(manager.status());

        let pipeline = DecisionPipeline::new(
            self.agent.clone(),
            self.partner.clone(),
            Arc::clone(&self.policy),
            self.identity.company_id.clone(),
            &self.config.pipeline,
        );

        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.push(tokio::spawn(manager.run(tx)));
        tasks.push(tokio::spawn(pipeline.run(rx)));
    }

    /// Stop the feed and the pipeline
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if !tasks.is_empty() {
            tracing::info!("Shutting down agent session");
        }
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for AgentSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
