// Principal extractors

use axum::{extract::FromRequestParts, http::request::Parts};
use gatehouse_core::Principal;

use crate::error::HttpAuthError;
use crate::middleware::AuthScope;

/// Authenticated principal of the default guard
/// This is required - returns 401 if not authenticated
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = HttpAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let scope = AuthScope::from_request_parts(parts, state).await?;
        let guard = scope.guard(None)?;
        let user = guard.authenticate().await?;
        Ok(CurrentUser(user))
    }
}

/// Principal of the default guard, if any
///
/// Only hard failures (configuration, provider) are rejected.
#[derive(Debug, Clone)]
pub struct OptionalUser(pub Option<Principal>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for OptionalUser
where
    S: Send + Sync,
{
    type Rejection = HttpAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let scope = AuthScope::from_request_parts(parts, state).await?;
        Ok(OptionalUser(scope.user().await?))
    }
}
