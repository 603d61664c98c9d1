// Authentication HTTP routes
// Decision: Use /v1/auth/* prefix for all auth endpoints
// Decision: Login checks credentials through the provider, then issues a bearer token
//           from the configured login guard (jwt driver)

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use gatehouse_axum::{AuthScope, CurrentUser, HttpAuthError};
use gatehouse_core::{Credentials, GenericUser, JwtGuard};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token response
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// User info response
#[derive(Debug, Serialize, Deserialize)]
pub struct UserInfoResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// State for auth routes
#[derive(Debug, Clone)]
pub struct RoutesState {
    /// Guard that issues tokens on login
    pub login_guard: String,
}

/// Create auth routes
pub fn routes(state: RoutesState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/auth/login", post(login))
        .route("/v1/auth/logout", post(logout))
        .route("/v1/auth/me", get(me))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn login(
    State(state): State<RoutesState>,
    scope: AuthScope,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, HttpAuthError> {
    let guard = scope.guard(Some(&state.login_guard))?;
    let jwt = guard.downcast_ref::<JwtGuard>().ok_or_else(|| {
        tracing::error!(guard = %state.login_guard, "Login guard does not use the jwt driver");
        HttpAuthError::internal("Authentication is misconfigured")
    })?;

    let mut credentials = Credentials::new();
    credentials.insert("email".to_string(), Value::String(request.email.clone()));
    credentials.insert("password".to_string(), Value::String(request.password));

    let provider = guard.provider();
    let user = provider
        .retrieve_by_credentials(&credentials)
        .await?
        .ok_or_else(|| HttpAuthError::unauthorized("Invalid email or password"))?;

    if !provider
        .validate_credentials(user.as_ref(), &credentials)
        .await?
    {
        tracing::info!(email = %request.email, "Login rejected");
        return Err(HttpAuthError::unauthorized("Invalid email or password"));
    }

    guard.set_user(user).await;
    let access_token = jwt
        .login()
        .await?
        .ok_or_else(|| HttpAuthError::internal("Failed to issue token"))?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: jwt.codec().ttl_secs(),
    }))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserInfoResponse> {
    let attribute = |key: &str| {
        user.as_any()
            .downcast_ref::<GenericUser>()
            .and_then(|u| u.attribute(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    Json(UserInfoResponse {
        id: user.auth_identifier(),
        email: attribute("email"),
        name: attribute("name"),
    })
}

/// Tokens are stateless; logout only clears the principal cached for this request
async fn logout(scope: AuthScope) -> Result<StatusCode, HttpAuthError> {
    let guard = scope.guard(None)?;
    guard.authenticate().await?;
    guard.forget_user().await;
    Ok(StatusCode::NO_CONTENT)
}
