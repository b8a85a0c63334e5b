//! Bearer-token extractors.
//!
//! Handlers declare what they need in their signature:
//!
//! ```rust,ignore
//! async fn get_cart(RequireIdentity(principal): RequireIdentity) -> ... { }
//! async fn list_orders(RequireAdmin(principal): RequireAdmin) -> ... { }
//! async fn create_order(OptionalIdentity(principal): OptionalIdentity) -> ... { }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use cartwheel_core::Principal;

use crate::error::{AppError, set_sentry_user};
use crate::services::AuthError;
use crate::state::AppState;

const BEARER: &str = "Bearer ";

/// The bearer token, if an `Authorization` header is present.
fn bearer_token(parts: &Parts) -> Option<Result<&str, AuthError>> {
    let header = parts.headers.get(AUTHORIZATION)?;
    Some(
        header
            .to_str()
            .ok()
            .and_then(|value| {
                value
                    .get(..BEARER.len())
                    .filter(|scheme| scheme.eq_ignore_ascii_case(BEARER))
                    .and_then(|_| value.get(BEARER.len()..))
            })
            .ok_or(AuthError::Malformed),
    )
}

async fn resolve(parts: &Parts, state: &AppState) -> Result<Option<Principal>, AuthError> {
    let Some(token) = bearer_token(parts) else {
        return Ok(None);
    };
    let principal = state.identity().resolve(token?).await?;

    tracing::Span::current().record("client_id", principal.client_id.as_str());
    set_sentry_user(&principal.client_id);
    Ok(Some(principal))
}

/// Extractor that requires a resolved identity (401 otherwise).
pub struct RequireIdentity(pub Principal);

impl FromRequestParts<AppState> for RequireIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        resolve(parts, state)
            .await?
            .map(Self)
            .ok_or(AppError::Unauthenticated(AuthError::MissingCredentials))
    }
}

/// Extractor for routes that work with or without an identity.
///
/// A present but invalid credential is still rejected with 401.
pub struct OptionalIdentity(pub Option<Principal>);

impl FromRequestParts<AppState> for OptionalIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self(resolve(parts, state).await?))
    }
}

/// Extractor that requires an admin principal (401 without identity, 403
/// for non-admins).
pub struct RequireAdmin(pub Principal);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let RequireIdentity(principal) = RequireIdentity::from_request_parts(parts, state).await?;
        if !principal.is_admin() {
            tracing::warn!(client_id = %principal.client_id, "Non-admin attempted admin operation");
            return Err(AppError::Forbidden);
        }
        Ok(Self(principal))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(auth: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/cart");
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert!(bearer_token(&parts(None)).is_none());
        assert_eq!(
            bearer_token(&parts(Some("Bearer abc.customer.00"))).unwrap(),
            Ok("abc.customer.00")
        );
        assert_eq!(
            bearer_token(&parts(Some("bearer abc.customer.00"))).unwrap(),
            Ok("abc.customer.00")
        );
        assert_eq!(
            bearer_token(&parts(Some("Basic dXNlcjpwYXNz"))).unwrap(),
            Err(AuthError::Malformed)
        );
        assert_eq!(bearer_token(&parts(Some("Bea"))).unwrap(), Err(AuthError::Malformed));
    }
}
