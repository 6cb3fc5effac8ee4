//! RSA request key
//!
//! SECURITY: this is the only place the private key exists.
//! - The key and its PEM text are never serialized or logged
//! - The PEM is only handed out base64-encoded for registration
//! - Signing is the only operation that touches the private half

use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::{RsaPrivateKey, RsaPublicKey};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::path::Path;

/// Private key used to sign partner-service requests
pub struct RequestKey {
    /// PKCS#1 v1.5 / SHA-256 signer
    signing_key: SigningKey<Sha256>,
    /// Public half (safe to expose)
    public_key: RsaPublicKey,
    /// Original PEM text, sent to the agent service on registration
    pem: SecretString,
}

impl RequestKey {
    /// Parse a PEM private key, PKCS#1 (`RSA PRIVATE KEY`) or PKCS#8
    pub fn from_pem(pem: &str) -> Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| Error::Key(format!("Invalid RSA private key: {}", e)))?;

        let public_key = private_key.to_public_key();

        Ok(Self {
            signing_key: SigningKey::<Sha256>::new(private_key),
            public_key,
            pem: SecretString::from(pem.to_string()),
        })
    }

    /// Read and parse a PEM file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let pem = std::fs::read_to_string(path).map_err(|e| {
            Error::Key(format!("Failed to read key file {}: {}", path.display(), e))
        })?;
        Self::from_pem(&pem)
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Standard base64 of the PEM text, as the register call expects it
    pub fn pem_base64(&self) -> String {
        STANDARD.encode(self.pem.expose_secret().as_bytes())
    }

    /// Sign `message` (hashed with SHA-256 inside), returning raw signature bytes
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signature = self
            .signing_key
            .try_sign(message)
            .map_err(|e| Error::Signing(format!("RSA signing failed: {}", e)))?;
        Ok(signature.to_vec())
    }
}

impl std::fmt::Debug for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestKey")
            .field("public_key", &"[RSA]")
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}
