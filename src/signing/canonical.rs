//! Canonical request signing for the partner service
//!
//! The string to sign is `timestamp ++ url ++ body`, with no separators and
//! the body only present when one is transmitted. The partner verifies the
//! exact same bytes, so the URL and body used here must be the ones that go
//! on the wire.

use super::RequestKey;
use crate::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use reqwest::Method;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use serde::Serialize;
use sha2::Sha256;
use std::sync::Arc;
use url::Url;

pub const HEADER_API_KEY: &str = "x-api-key";
pub const HEADER_TIMESTAMP: &str = "x-timestamp";
pub const HEADER_SIGN: &str = "x-sign";

/// A request with its authentication material, ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub method: Method,
    pub url: Url,
    /// Unix seconds, decimal
    pub timestamp: String,
    /// Exact JSON text to transmit, if any
    pub body_json: Option<String>,
    /// URL-safe base64 without padding
    pub signature: String,
}

/// Build the canonical string to sign
pub fn string_to_sign(timestamp: &str, url: &str, body_json: Option<&str>) -> String {
    let body = body_json.unwrap_or_default();
    let mut to_sign = String::with_capacity(timestamp.len() + url.len() + body.len());
    to_sign.push_str(timestamp);
    to_sign.push_str(url);
    to_sign.push_str(body);
    to_sign
}

/// Signs outbound partner requests with the agent's RSA key
#[derive(Debug, Clone)]
pub struct CanonicalSigner {
    key: Option<Arc<RequestKey>>,
}

impl CanonicalSigner {
    pub fn new(key: Option<Arc<RequestKey>>) -> Self {
        Self { key }
    }

    /// Sign with the current wall-clock time
    pub fn sign<B>(&self, method: Method, url: &Url, body: Option<&B>) -> Result<SignedRequest>
    where
        B: Serialize + ?Sized,
    {
        let timestamp = Utc::now().timestamp().to_string();
        self.sign_at(timestamp, method, url, body)
    }

    /// Sign with an explicit timestamp
    pub fn sign_at<B>(
        &self,
        timestamp: String,
        method: Method,
        url: &Url,
        body: Option<&B>,
    ) -> Result<SignedRequest>
    where
        B: Serialize + ?Sized,
    {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| Error::Signing("no private key loaded".to_string()))?;

        let body_json = body.map(serde_json::to_string).transpose()?;
        let to_sign = string_to_sign(&timestamp, url.as_str(), body_json.as_deref());
        let signature = URL_SAFE_NO_PAD.encode(key.sign(to_sign.as_bytes())?);

        Ok(SignedRequest {
            method,
            url: url.clone(),
            timestamp,
            body_json,
            signature,
        })
    }
}

/// Check an `x-sign` value the way the partner service does
pub fn verify(
    public_key: &RsaPublicKey,
    timestamp: &str,
    url: &str,
    body_json: Option<&str>,
    signature: &str,
) -> Result<()> {
    let raw = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|e| Error::Signing(format!("Signature is not base64url: {}", e)))?;
    let signature = Signature::try_from(raw.as_slice())
        .map_err(|e| Error::Signing(format!("Malformed signature: {}", e)))?;

    VerifyingKey::<Sha256>::new(public_key.clone())
        .verify(string_to_sign(timestamp, url, body_json).as_bytes(), &signature)
        .map_err(|_| Error::Signing("signature does not verify".to_string()))
}
