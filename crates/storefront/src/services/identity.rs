//! Bearer-token identity resolution.
//!
//! Tokens have the form `<client-id>.<role>.<signature>` where `signature` is
//! the lowercase hex HMAC-SHA256 of `v1:<client-id>:<role>` under the token
//! secret. Client ids may themselves contain dots, so the token is split from
//! the right.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

use cartwheel_core::{ClientId, Principal, Role};

type HmacSha256 = Hmac<Sha256>;

const SIGNING_VERSION: &str = "v1";

/// Errors resolving a credential. All of them mean "unauthenticated".
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingCredentials,

    #[error("malformed credentials")]
    Malformed,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("unknown role")]
    UnknownRole,
}

/// Turns a presented credential into a principal.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, credential: &str) -> Result<Principal, AuthError>;
}

/// Issues and verifies HMAC-signed bearer tokens.
pub struct SignedTokenResolver {
    secret: SecretString,
}

impl SignedTokenResolver {
    #[must_use]
    pub const fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Mint a token for `client_id` with `role`.
    #[must_use]
    pub fn issue(&self, client_id: &ClientId, role: Role) -> String {
        let signature = hex::encode(
            self.mac(client_id.as_str(), role.as_str())
                .finalize()
                .into_bytes(),
        );
        format!("{}.{}.{signature}", client_id.as_str(), role.as_str())
    }

    fn mac(&self, client_id: &str, role: &str) -> HmacSha256 {
        // HMAC accepts keys of any length.
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.secret.expose_secret().as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(format!("{SIGNING_VERSION}:{client_id}:{role}").as_bytes());
        mac
    }

    fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let mut parts = token.rsplitn(3, '.');
        let (Some(signature), Some(role), Some(client_id)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::Malformed);
        };

        let signature = hex::decode(signature).map_err(|_| AuthError::Malformed)?;
        self.mac(client_id, role)
            .verify_slice(&signature)
            .map_err(|_| AuthError::InvalidSignature)?;

        let role = role.parse::<Role>().map_err(|_| AuthError::UnknownRole)?;
        let client_id = ClientId::parse(client_id).map_err(|_| AuthError::Malformed)?;
        Ok(Principal::new(client_id, role))
    }
}

impl std::fmt::Debug for SignedTokenResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedTokenResolver")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl IdentityResolver for SignedTokenResolver {
    async fn resolve(&self, credential: &str) -> Result<Principal, AuthError> {
        let token = credential.trim();
        if token.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        self.verify(token)
    }
}
