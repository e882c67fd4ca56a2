// Caller identity for the HTTP surface
//
// Every mutating request names its caller in the `x-wallet-address` header.
// Commands then run through a Session bound to that address, so the caller
// is never part of a request body.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::handlers::ApiError;

pub const CALLER_HEADER: &str = "x-wallet-address";

/// Generate a fresh wallet address
/// Format: PM_[32 hex characters]
pub fn generate_wallet_address(seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(Uuid::new_v4().as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("PM_{}", digest[..32].to_uppercase())
}

/// Authenticated caller address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

impl Caller {
    pub fn address(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let address = parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(ApiError::missing_caller)?;
        Ok(Caller(address.to_string()))
    }
}
