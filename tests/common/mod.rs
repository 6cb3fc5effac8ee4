//! In-process mock of the agent service and the partner service.
//!
//! One axum router serves both, so a test can point the agent host/port and
//! the partner base URL at the same listener.

#![allow(dead_code)]

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use signing_agent_client::{AgentIdentity, Config, RequestKey};
use secrecy::SecretString;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

pub const TEST_KEY: &str = include_str!("../fixtures/test_key.pem");
pub const API_KEY: &str = "test-api-key";

/// Payload that makes the mock close every open feed socket
pub const CLOSE_FEED: &str = "__close__";

#[derive(Debug, Clone)]
pub struct PartnerRequest {
    pub path: String,
    pub api_key: Option<String>,
    pub timestamp: Option<String>,
    pub sign: Option<String>,
}

#[derive(Debug, Default)]
pub struct Recorded {
    pub agents: Vec<String>,
    pub register_calls: Vec<Value>,
    pub approvals: Vec<String>,
    pub rejections: Vec<String>,
    pub partner_requests: Vec<PartnerRequest>,
    pub feed_connections: usize,
}

#[derive(Clone)]
struct MockState {
    recorded: Arc<Mutex<Recorded>>,
    partner_status: Arc<Mutex<StatusCode>>,
    partner_details: Arc<Mutex<Value>>,
    feed: broadcast::Sender<String>,
}

pub struct MockServer {
    addr: SocketAddr,
    state: MockState,
    handle: tokio::task::JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Self {
        let (feed, _) = broadcast::channel(64);
        let state = MockState {
            recorded: Arc::new(Mutex::new(Recorded::default())),
            partner_status: Arc::new(Mutex::new(StatusCode::OK)),
            partner_details: Arc::new(Mutex::new(json!({}))),
            feed,
        };

        let app = Router::new()
            .route("/api/v1/client", get(list_agents))
            .route("/api/v1/register", axum::routing::post(register))
            .route("/api/v1/client/feed", get(feed_socket))
            .route(
                "/api/v1/client/action/{id}",
                axum::routing::put(approve).delete(reject),
            )
            .route(
                "/api/v1/p/company/{company}/{resource}/{id}",
                get(transaction_details),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Agent and partner both pointed at this server
    pub fn config(&self, company_id: Option<&str>) -> Config {
        let mut config = Config::default();
        config.agent.host = self.addr.ip().to_string();
        config.agent.port = self.port();
        config.partner.base_url = self.base_url();
        config.partner.company_id = company_id.map(str::to_string);
        config.feed.reconnect_delay_secs = 1;
        config.pipeline.policy_timeout_secs = 2;
        config.pipeline.detail_timeout_secs = 2;
        config
    }

    pub fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.state.recorded.lock().unwrap()
    }

    pub fn set_partner_status(&self, status: StatusCode) {
        *self.state.partner_status.lock().unwrap() = status;
    }

    pub fn set_partner_details(&self, details: Value) {
        *self.state.partner_details.lock().unwrap() = details;
    }

    /// Send one text frame to every connected feed client
    pub fn push(&self, payload: &str) {
        let _ = self.state.feed.send(payload.to_string());
    }

    /// Poll until `check` holds, panicking after a few seconds
    pub async fn wait_until<F>(&self, what: &str, check: F)
    where
        F: Fn(&Recorded) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if check(&self.recorded()) {
                return;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("timed out waiting for {}: {:?}", what, self.recorded());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn test_key() -> RequestKey {
    RequestKey::from_pem(TEST_KEY).unwrap()
}

pub fn identity(company_id: Option<&str>) -> AgentIdentity {
    AgentIdentity::new(
        "test-agent",
        test_key(),
        SecretString::from(API_KEY.to_string()),
        company_id.map(str::to_string),
    )
}

async fn list_agents(State(state): State<MockState>) -> Json<Vec<String>> {
    Json(state.recorded.lock().unwrap().agents.clone())
}

async fn register(State(state): State<MockState>, Json(body): Json<Value>) -> Json<Value> {
    let mut recorded = state.recorded.lock().unwrap();
    recorded.register_calls.push(body);
    let agent_id = format!("agent-{}", recorded.agents.len() + 1);
    recorded.agents.push(agent_id.clone());
    Json(json!({ "agentId": agent_id }))
}

async fn approve(State(state): State<MockState>, Path(id): Path<String>) -> StatusCode {
    state.recorded.lock().unwrap().approvals.push(id);
    StatusCode::OK
}

async fn reject(State(state): State<MockState>, Path(id): Path<String>) -> StatusCode {
    state.recorded.lock().unwrap().rejections.push(id);
    StatusCode::OK
}

async fn transaction_details(
    State(state): State<MockState>,
    Path((company, resource, id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state
        .recorded
        .lock()
        .unwrap()
        .partner_requests
        .push(PartnerRequest {
            path: format!("/api/v1/p/company/{}/{}/{}", company, resource, id),
            api_key: header("x-api-key"),
            timestamp: header("x-timestamp"),
            sign: header("x-sign"),
        });

    let status = *state.partner_status.lock().unwrap();
    if status != StatusCode::OK {
        return status.into_response();
    }
    let details = state.partner_details.lock().unwrap().clone();
    Json(details).into_response()
}

async fn feed_socket(State(state): State<MockState>, ws: WebSocketUpgrade) -> Response {
    // Subscribe before the upgrade so nothing pushed after the connection is
    // counted can be missed
    let feed = state.feed.subscribe();
    ws.on_upgrade(move |socket| serve_feed(socket, state, feed))
}

async fn serve_feed(
    mut socket: WebSocket,
    state: MockState,
    mut feed: broadcast::Receiver<String>,
) {
    state.recorded.lock().unwrap().feed_connections += 1;

    loop {
        tokio::select! {
            payload = feed.recv() => {
                let Ok(payload) = payload else { break };
                if payload == CLOSE_FEED {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
