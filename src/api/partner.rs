//! Client for the partner (transaction detail) service
//!
//! Every request carries the static API key plus a fresh
//! `x-timestamp`/`x-sign` pair from the [`CanonicalSigner`].

use super::http::execute;
use super::types::ResourceKind;
use super::DetailSource;
use crate::signing::canonical::{HEADER_API_KEY, HEADER_SIGN, HEADER_TIMESTAMP};
use crate::signing::{CanonicalSigner, SignedRequest};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use url::Url;

pub struct PartnerApiClient {
    client: Client,
    base_url: Url,
    api_key: SecretString,
    signer: CanonicalSigner,
}

impl PartnerApiClient {
    pub fn new(base_url: &str, api_key: SecretString, signer: CanonicalSigner) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid partner url {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "Partner url {} cannot be a base url",
                base_url
            )));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            api_key,
            signer,
        })
    }

    /// `{base}/api/v1/p/company/{company}/{withdraw|transfer}/{id}`
    pub fn detail_url(
        &self,
        company_id: &str,
        resource: ResourceKind,
        transaction_id: &str,
    ) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("{} cannot be a base url", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "v1", "p", "company"])
            .push(company_id)
            .push(resource.as_path())
            .push(transaction_id);
        Ok(url)
    }

    /// Signed call to the partner service.
    ///
    /// Non-200 answers and transport failures give `Ok(None)`; a request
    /// that cannot be signed is an error and is never sent.
    pub async fn call(
        &self,
        method: Method,
        url: &Url,
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        let signed = self.signer.sign(method, url, body)?;

        match self.send(&signed).await {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(
                    method = %signed.method,
                    url = %signed.url,
                    error = %e,
                    "Partner API call failed"
                );
                Ok(None)
            }
        }
    }

    async fn send(&self, signed: &SignedRequest) -> Result<Value> {
        let mut request = self
            .client
            .request(signed.method.clone(), signed.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(HEADER_API_KEY, self.api_key.expose_secret())
            .header(HEADER_TIMESTAMP, &signed.timestamp)
            .header(HEADER_SIGN, &signed.signature);
        if let Some(body) = &signed.body_json {
            // The exact text that was signed
            request = request.body(body.clone());
        }
        execute(request, &signed.method, &signed.url).await
    }
}

impl std::fmt::Debug for PartnerApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartnerApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl DetailSource for PartnerApiClient {
    async fn transaction_details(
        &self,
        company_id: &str,
        resource: ResourceKind,
        transaction_id: &str,
    ) -> Result<Option<Value>> {
        let url = self.detail_url(company_id, resource, transaction_id)?;
        self.call(Method::GET, &url, None).await
    }
}
