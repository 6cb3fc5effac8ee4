//! Request signing
//!
//! Key material lives in [`RequestKey`]; [`CanonicalSigner`] turns a
//! partner request into its authentication headers.

pub mod canonical;
mod key;

pub use canonical::{string_to_sign, verify, CanonicalSigner, SignedRequest};
pub use key::RequestKey;
