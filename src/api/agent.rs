//! Client for the primary (custody/signing) service
//!
//! Calls are best-effort: any failure is logged and comes back as `None`,
//! since the server owns the state of every action.

use super::http::execute;
use super::types::{RegisterRequest, RegisterResponse};
use super::AgentActions;
use crate::config::endpoints::routes;
use crate::config::AgentEndpoints;
use crate::Result;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde_json::Value;
use url::Url;

/// Stateless request executor for the agent API
#[derive(Debug, Clone)]
pub struct AgentApiClient {
    client: Client,
    endpoints: AgentEndpoints,
}

impl AgentApiClient {
    pub fn new(endpoints: AgentEndpoints) -> Self {
        Self::with_client(Client::new(), endpoints)
    }

    pub fn with_client(client: Client, endpoints: AgentEndpoints) -> Self {
        Self { client, endpoints }
    }

    pub fn endpoints(&self) -> &AgentEndpoints {
        &self.endpoints
    }

    /// Call `path` on the agent service
    pub async fn call(&self, method: Method, path: &str, body: Option<&Value>) -> Option<Value> {
        let url = match self.endpoints.url(path) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(path = path, error = %e, "Cannot build agent API url");
                return None;
            }
        };
        self.call_url(method, url, body).await
    }

    async fn call_url(&self, method: Method, url: Url, body: Option<&Value>) -> Option<Value> {
        match self.execute(method.clone(), &url, body).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(
                    method = %method,
                    url = %url,
                    error = %e,
                    "Agent API call failed"
                );
                None
            }
        }
    }

    async fn execute(&self, method: Method, url: &Url, body: Option<&Value>) -> Result<Value> {
        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.body(serde_json::to_string(body)?);
        }
        execute(request, &method, url).await
    }

    /// `GET /api/v1/client`: ids of agents already registered for this key
    pub async fn list_agents(&self) -> Option<Vec<String>> {
        let value = self.call(Method::GET, routes::CLIENT, None).await?;
        match serde_json::from_value::<Option<Vec<String>>>(value) {
            Ok(ids) => Some(ids.unwrap_or_default()),
            Err(e) => {
                tracing::warn!(error = %e, "Unexpected agent list payload");
                None
            }
        }
    }

    /// `POST /api/v1/register`
    pub async fn register(&self, request: &RegisterRequest) -> Option<RegisterResponse> {
        let body = match serde_json::to_value(request) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot encode registration request");
                return None;
            }
        };
        let value = self.call(Method::POST, routes::REGISTER, Some(&body)).await?;
        match serde_json::from_value(value) {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::warn!(error = %e, "Unexpected registration payload");
                None
            }
        }
    }

    async fn action(&self, method: Method, action_id: &str) -> bool {
        let url = match self.endpoints.action(action_id) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(action_id = action_id, error = %e, "Cannot build action url");
                return false;
            }
        };
        self.call_url(method, url, None).await.is_some()
    }
}

#[async_trait]
impl AgentActions for AgentApiClient {
    /// `PUT /api/v1/client/action/{id}`
    async fn approve(&self, action_id: &str) -> bool {
        self.action(Method::PUT, action_id).await
    }

    /// `DELETE /api/v1/client/action/{id}`
    async fn reject(&self, action_id: &str) -> bool {
        self.action(Method::DELETE, action_id).await
    }
}
