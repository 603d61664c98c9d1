// Per-request authentication scope
// Decision: The middleware only opens the scope; guards resolve lazily when a handler asks
// Decision: Urlencoded bodies are buffered so the token guard can read form fields.
//           Bodies that are too large or of unknown length pass through untouched.

use axum::{
    body::{to_bytes, Body, HttpBody},
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    Router,
};
use gatehouse_core::{AuthManager, AuthResult, Guard, Principal, RequestContext};
use std::sync::Arc;

use crate::error::HttpAuthError;
use crate::transport::HttpTransport;

/// Largest form body buffered for token lookup
pub const MAX_FORM_BODY_BYTES: usize = 64 * 1024;

/// Manager plus the current request's context, stored in request extensions
#[derive(Clone)]
pub struct AuthScope {
    pub manager: Arc<AuthManager>,
    pub ctx: RequestContext,
}

impl AuthScope {
    /// Guard by name, or the request's default guard
    pub fn guard(&self, name: Option<&str>) -> AuthResult<Arc<dyn Guard>> {
        self.manager.guard(&self.ctx, name)
    }

    /// Principal of the default guard
    pub async fn user(&self) -> AuthResult<Option<Principal>> {
        self.manager.user(&self.ctx).await
    }

    /// Switch the default guard for the rest of this request
    pub fn should_use(&self, name: &str) -> AuthResult<()> {
        self.manager.should_use(&self.ctx, Some(name))
    }
}

impl std::fmt::Debug for AuthScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthScope").field("ctx", &self.ctx).finish()
    }
}

/// Middleware opening an AuthScope for each request
pub async fn request_scope(
    State(manager): State<Arc<AuthManager>>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let mut transport = HttpTransport::from_parts(&parts);

    let body = if is_form(&parts) && fits_form_limit(&body) {
        match to_bytes(body, MAX_FORM_BODY_BYTES).await {
            Ok(bytes) => {
                transport = transport.with_form_body(&bytes);
                Body::from(bytes)
            }
            Err(e) => {
                tracing::debug!("Failed to buffer form body: {}", e);
                return HttpAuthError::bad_request("Request body too large or unreadable")
                    .into_response();
            }
        }
    } else {
        if is_form(&parts) {
            tracing::debug!(
                size_hint = ?body.size_hint().upper(),
                "Form body not captured for token lookup"
            );
        }
        body
    };

    let ctx = manager.request_context(Arc::new(transport));
    parts.extensions.insert(AuthScope { manager, ctx });

    next.run(Request::from_parts(parts, body)).await
}

fn is_form(parts: &Parts) -> bool {
    parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

/// Only bodies with a known length within the limit are buffered
fn fits_form_limit(body: &Body) -> bool {
    body.size_hint()
        .upper()
        .is_some_and(|upper| upper <= MAX_FORM_BODY_BYTES as u64)
}

/// Install the auth scope middleware on a router
pub fn with_auth<S>(router: Router<S>, manager: Arc<AuthManager>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(from_fn_with_state(manager, request_scope))
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthScope
where
    S: Send + Sync,
{
    type Rejection = HttpAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthScope>().cloned().ok_or_else(|| {
            tracing::error!("AuthScope missing from request; is the auth middleware installed?");
            HttpAuthError::internal("Authentication is misconfigured")
        })
    }
}
