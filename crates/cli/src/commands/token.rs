//! Development token issuance.
//!
//! Tokens are signed with `STOREFRONT_TOKEN_SECRET`, the same secret the
//! storefront verifies with.

use secrecy::SecretString;
use thiserror::Error;

use cartwheel_core::{ClientId, Role, ValidationError};
use cartwheel_storefront::services::SignedTokenResolver;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid argument: {0}")]
    Invalid(#[from] ValidationError),
}

/// Issue a bearer token for `client_id` with `role`.
///
/// # Errors
///
/// Returns an error if the secret is not set or the client id or role is
/// invalid.
pub fn issue(client_id: &str, role: &str) -> Result<String, TokenError> {
    dotenvy::dotenv().ok();

    let secret = std::env::var("STOREFRONT_TOKEN_SECRET")
        .map(SecretString::from)
        .map_err(|_| TokenError::MissingEnvVar("STOREFRONT_TOKEN_SECRET"))?;

    let client_id = ClientId::parse(client_id)?;
    let role: Role = role.parse()?;

    tracing::info!(client_id = %client_id, role = %role, "Issuing token");
    Ok(SignedTokenResolver::new(secret).issue(&client_id, role))
}
