// Bearer-token guard ("jwt" driver)
// Decision: A rejected token (bad signature, expired, malformed) resolves to "no user"
//           on the read path; callers that need the reason call TokenCodec::verify directly
// Decision: login() only issues a token for an already-set principal, it never authenticates

use async_trait::async_trait;
use serde_json::Map;
use std::any::Any;
use std::sync::Arc;

use super::{validate_with_events, Guard, GuardContext, GuardState};
use crate::error::{AuthError, AuthResult};
use crate::events::{AuthEvent, EventSink};
use crate::token::{TokenCodec, TokenConfig};
use crate::traits::{Credentials, Principal, UserProvider};
use crate::transport::{bearer_token, Transport};

/// Guard resolving the principal from a signed bearer token
pub struct JwtGuard {
    name: String,
    provider: Arc<dyn UserProvider>,
    transport: Arc<dyn Transport>,
    events: Arc<dyn EventSink>,
    codec: Arc<TokenCodec>,
    state: GuardState,
}

impl JwtGuard {
    /// Driver identifier in guard configuration
    pub const DRIVER: &'static str = "jwt";

    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn UserProvider>,
        transport: Arc<dyn Transport>,
        codec: Arc<TokenCodec>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            transport,
            events,
            codec,
            state: GuardState::new(),
        }
    }

    /// Build from driver options (`secret`, `ttl`, `algo`, `jti`, `app_name`)
    pub fn from_context(context: GuardContext) -> AuthResult<Self> {
        let config: TokenConfig = context.options_as()?;
        let codec = TokenCodec::from_config(&config).map_err(|e| match e {
            AuthError::Configuration(msg) => {
                AuthError::config(format!("Auth guard [{}]: {}", context.name, msg))
            }
            other => other,
        })?;

        Ok(Self::new(
            context.name,
            context.provider,
            context.transport,
            Arc::new(codec),
            context.events,
        ))
    }

    /// Replace the codec (e.g. to share one instance or inject a clock)
    pub fn with_codec(mut self, codec: Arc<TokenCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Bearer token carried by the current request
    pub fn token_for_request(&self) -> Option<String> {
        bearer_token(self.transport.as_ref())
    }

    /// Issue a token for the cached principal
    ///
    /// Returns `None` when no principal has been set. Does not change guard state.
    pub async fn login(&self) -> AuthResult<Option<String>> {
        match self.state.current().await {
            Some(user) => {
                let token = self.codec.generate(&user.auth_identifier())?;
                tracing::debug!(guard = %self.name, user = %user.auth_identifier(), "Issued bearer token");
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    /// Issue a token for the cached principal with a custom lifetime and claims
    pub async fn login_with(
        &self,
        ttl_secs: u64,
        extra_claims: Map<String, serde_json::Value>,
    ) -> AuthResult<Option<String>> {
        match self.state.current().await {
            Some(user) => Ok(Some(self.codec.generate_with(
                &user.auth_identifier(),
                ttl_secs,
                extra_claims,
            )?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Guard for JwtGuard {
    fn name(&self) -> &str {
        &self.name
    }

    fn driver(&self) -> &'static str {
        Self::DRIVER
    }

    fn provider(&self) -> Arc<dyn UserProvider> {
        self.provider.clone()
    }

    fn state(&self) -> &GuardState {
        &self.state
    }

    fn events(&self) -> &dyn EventSink {
        self.events.as_ref()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn user_from_request(&self) -> AuthResult<Option<Principal>> {
        let Some(token) = self.token_for_request() else {
            return Ok(None);
        };

        let identifier = match self.codec.verify(&token) {
            Ok(identifier) => identifier,
            Err(e) => {
                tracing::debug!(guard = %self.name, error = %e, "Bearer token rejected");
                self.events.dispatch(AuthEvent::Failed {
                    guard: self.name.clone(),
                    user: None,
                    credentials: Credentials::new(),
                });
                return Ok(None);
            }
        };

        let user = self.provider.retrieve_by_id(&identifier).await?;
        if user.is_none() {
            tracing::debug!(guard = %self.name, subject = %identifier, "Token subject not found");
            let mut credentials = Credentials::new();
            credentials.insert("sub".to_string(), identifier.into());
            self.events.dispatch(AuthEvent::Failed {
                guard: self.name.clone(),
                user: None,
                credentials,
            });
        }
        Ok(user)
    }

    async fn validate(&self, credentials: &Credentials) -> AuthResult<bool> {
        validate_with_events(
            &self.name,
            self.provider.as_ref(),
            self.events.as_ref(),
            credentials,
            credentials,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{RecordingEventSink, AUTHENTICATED, FAILED, LOGIN};
    use crate::memory::{GenericUser, InMemoryUserProvider};
    use crate::token::FixedClock;
    use crate::transport::StaticTransport;
    use chrono::Duration;
    use serde_json::json;

    const SECRET: &str = "s3cr3t";

    struct Fixture {
        provider: Arc<InMemoryUserProvider>,
        codec: Arc<TokenCodec>,
        clock: Arc<FixedClock>,
        events: Arc<RecordingEventSink>,
    }

    impl Fixture {
        fn new() -> Self {
            let provider = Arc::new(
                InMemoryUserProvider::new()
                    .with_user(GenericUser::new("42").with_attribute("email", "ann@example.com")),
            );
            let clock = Arc::new(FixedClock::at_timestamp(1_700_000_000));
            let codec = Arc::new(TokenCodec::new(SECRET).with_clock(clock.clone()));
            Self {
                provider,
                codec,
                clock,
                events: Arc::new(RecordingEventSink::new()),
            }
        }

        fn guard(&self, transport: StaticTransport) -> JwtGuard {
            JwtGuard::new(
                "api",
                self.provider.clone(),
                Arc::new(transport),
                self.codec.clone(),
                self.events.clone(),
            )
        }

        fn token(&self, subject: &str) -> String {
            self.codec.generate_with(subject, 3600, Map::new()).unwrap()
        }
    }

    #[tokio::test]
    async fn test_user_from_bearer_token() {
        let fx = Fixture::new();
        let guard = fx.guard(StaticTransport::new().with_bearer(&fx.token("42")));

        let user = guard.user().await.unwrap().unwrap();
        assert_eq!(user.auth_identifier(), "42");
        assert!(guard.check().await.unwrap());
        assert_eq!(guard.id().await.unwrap().as_deref(), Some("42"));
        assert_eq!(fx.events.event_types(), vec![AUTHENTICATED]);
    }

    #[tokio::test]
    async fn test_user_is_memoized() {
        let fx = Fixture::new();
        let guard = fx.guard(StaticTransport::new().with_bearer(&fx.token("42")));

        guard.user().await.unwrap();
        guard.user().await.unwrap();
        guard.check().await.unwrap();

        assert_eq!(fx.provider.lookups(), 1);
    }

    #[tokio::test]
    async fn test_missing_header_is_guest() {
        let fx = Fixture::new();
        let guard = fx.guard(StaticTransport::new());

        assert!(guard.user().await.unwrap().is_none());
        assert!(!guard.check().await.unwrap());
        assert!(guard.guest().await.unwrap());
        assert_eq!(fx.provider.lookups(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_resolves_to_guest() {
        let fx = Fixture::new();
        let token = fx.token("42");
        fx.clock.advance(Duration::seconds(3600));
        let guard = fx.guard(StaticTransport::new().with_bearer(&token));

        assert!(guard.user().await.unwrap().is_none());
        assert!(matches!(
            guard.codec().verify(&token),
            Err(AuthError::TokenExpired)
        ));
        assert_eq!(fx.events.event_types(), vec![FAILED]);
    }

    #[tokio::test]
    async fn test_forged_token_resolves_to_guest() {
        let fx = Fixture::new();
        let forged = TokenCodec::new("not-the-secret").generate("42").unwrap();
        let guard = fx.guard(StaticTransport::new().with_bearer(&forged));

        assert!(guard.user().await.unwrap().is_none());
        assert_eq!(fx.provider.lookups(), 0);
    }

    #[tokio::test]
    async fn test_unknown_subject_resolves_to_guest() {
        let fx = Fixture::new();
        let guard = fx.guard(StaticTransport::new().with_bearer(&fx.token("404")));

        assert!(guard.user().await.unwrap().is_none());
        let events = fx.events.events();
        match &events[0] {
            AuthEvent::Failed { credentials, .. } => assert_eq!(credentials["sub"], json!("404")),
            other => panic!("Expected failed event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_authenticate_without_user() {
        let fx = Fixture::new();
        let guard = fx.guard(StaticTransport::new());

        match guard.authenticate().await {
            Err(AuthError::Unauthenticated { guard }) => assert_eq!(guard, "api"),
            other => panic!("Expected unauthenticated, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_set_user_skips_provider() {
        let fx = Fixture::new();
        let guard = fx.guard(StaticTransport::new().with_bearer(&fx.token("42")));
        assert!(!guard.has_user().await);

        guard.set_user(Arc::new(GenericUser::new("7"))).await;

        assert!(guard.has_user().await);
        assert_eq!(guard.user().await.unwrap().unwrap().auth_identifier(), "7");
        assert_eq!(fx.provider.lookups(), 0);
        assert_eq!(fx.events.event_types(), vec![LOGIN]);
    }

    #[tokio::test]
    async fn test_forget_user_derives_again() {
        let fx = Fixture::new();
        let guard = fx.guard(StaticTransport::new().with_bearer(&fx.token("42")));

        guard.set_user(Arc::new(GenericUser::new("7"))).await;
        guard.forget_user().await;
        assert!(!guard.has_user().await);

        let user = guard.user().await.unwrap().unwrap();
        assert_eq!(user.auth_identifier(), "42");
        assert_eq!(fx.provider.lookups(), 1);
    }

    #[tokio::test]
    async fn test_login_issues_token_for_cached_user() {
        let fx = Fixture::new();
        let guard = fx.guard(StaticTransport::new());

        assert!(guard.login().await.unwrap().is_none());

        guard.set_user(Arc::new(GenericUser::new("42"))).await;
        let token = guard.login().await.unwrap().unwrap();

        assert_eq!(fx.codec.verify(&token).unwrap(), "42");
        assert_eq!(guard.user().await.unwrap().unwrap().auth_identifier(), "42");
    }

    #[tokio::test]
    async fn test_login_with_extra_claims() {
        let fx = Fixture::new();
        let guard = fx.guard(StaticTransport::new());
        guard.set_user(Arc::new(GenericUser::new("42"))).await;

        let mut extra = Map::new();
        extra.insert("scope".to_string(), json!("read"));
        let token = guard.login_with(60, extra).await.unwrap().unwrap();

        let claims = fx.codec.parse(&token).unwrap();
        assert_eq!(claims["scope"], json!("read"));
    }

    #[tokio::test]
    async fn test_validate_does_not_touch_state() {
        let fx = Fixture::new();
        let guard = fx.guard(StaticTransport::new());
        let mut credentials = Credentials::new();
        credentials.insert("email".to_string(), json!("ann@example.com"));

        assert!(guard.validate(&credentials).await.unwrap());
        assert!(!guard.has_user().await);

        credentials.insert("email".to_string(), json!("nobody@example.com"));
        assert!(!guard.validate(&credentials).await.unwrap());
    }

    #[test]
    fn test_from_context_requires_secret() {
        let context = GuardContext {
            name: "api".to_string(),
            provider: Arc::new(InMemoryUserProvider::new()),
            options: Map::new(),
            transport: Arc::new(StaticTransport::new()),
            events: Arc::new(RecordingEventSink::new()),
        };

        match JwtGuard::from_context(context) {
            Err(AuthError::Configuration(msg)) => assert!(msg.contains("api")),
            _ => panic!("Expected configuration error"),
        }
    }
}
