// Opaque API token guard ("token" driver)
// Decision: Tokens are matched verbatim (or as sha256 hex) against a provider field;
//           the guard never stores or rotates them

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::any::Any;
use std::sync::Arc;

use super::{validate_with_events, Guard, GuardContext, GuardState};
use crate::error::AuthResult;
use crate::events::{AuthEvent, EventSink};
use crate::traits::{Credentials, Principal, UserProvider};
use crate::transport::{basic_password, bearer_token, Transport};

fn default_token_key() -> String {
    "api_token".to_string()
}

/// Options of the `token` driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGuardOptions {
    /// Query/form field carrying the token
    #[serde(default = "default_token_key")]
    pub input_key: String,
    /// Provider field the token is matched against
    #[serde(default = "default_token_key")]
    pub storage_key: String,
    /// Match on sha256 hex of the token instead of the raw value
    #[serde(default)]
    pub hash: bool,
}

impl Default for TokenGuardOptions {
    fn default() -> Self {
        Self {
            input_key: default_token_key(),
            storage_key: default_token_key(),
            hash: false,
        }
    }
}

/// Lowercase hex sha256 of a token
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Guard resolving the principal from an opaque API token
pub struct TokenGuard {
    name: String,
    provider: Arc<dyn UserProvider>,
    transport: Arc<dyn Transport>,
    events: Arc<dyn EventSink>,
    options: TokenGuardOptions,
    state: GuardState,
}

impl TokenGuard {
    pub const DRIVER: &'static str = "token";

    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn UserProvider>,
        transport: Arc<dyn Transport>,
        options: TokenGuardOptions,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            transport,
            events,
            options,
            state: GuardState::new(),
        }
    }

    pub fn from_context(context: GuardContext) -> AuthResult<Self> {
        let options: TokenGuardOptions = context.options_as()?;
        Ok(Self::new(
            context.name,
            context.provider,
            context.transport,
            options,
            context.events,
        ))
    }

    pub fn options(&self) -> &TokenGuardOptions {
        &self.options
    }

    /// Token carried by the current request
    ///
    /// Checked in order: query parameter, form field, bearer header, basic-auth password.
    pub fn token_for_request(&self) -> Option<String> {
        let transport = self.transport.as_ref();
        let key = self.options.input_key.as_str();

        [transport.query(key), transport.form(key)]
            .into_iter()
            .flatten()
            .find(|token| !token.is_empty())
            .or_else(|| bearer_token(transport))
            .or_else(|| basic_password(transport))
    }
}

#[async_trait]
impl Guard for TokenGuard {
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

        let stored = if self.options.hash {
            hash_token(&token)
        } else {
            token
        };

        let mut credentials = Credentials::new();
        credentials.insert(self.options.storage_key.clone(), Value::String(stored));

        let user = self.provider.retrieve_by_credentials(&credentials).await?;
        if user.is_none() {
            tracing::debug!(guard = %self.name, "API token did not match any user");
            self.events.dispatch(AuthEvent::Failed {
                guard: self.name.clone(),
                user: None,
                credentials: Credentials::new(),
            });
        }
        Ok(user)
    }

    async fn validate(&self, credentials: &Credentials) -> AuthResult<bool> {
        let value = match credentials.get(&self.options.input_key) {
            None | Some(Value::Null) => return Ok(false),
            Some(Value::String(s)) if s.is_empty() => return Ok(false),
            Some(value) => value.clone(),
        };

        let mut lookup = Credentials::new();
        lookup.insert(self.options.storage_key.clone(), value);

        validate_with_events(
            &self.name,
            self.provider.as_ref(),
            self.events.as_ref(),
            credentials,
            &lookup,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{RecordingEventSink, ATTEMPTING, FAILED, VALIDATED};
    use crate::memory::{GenericUser, InMemoryUserProvider};
    use crate::transport::StaticTransport;
    use serde_json::json;

    fn provider() -> Arc<InMemoryUserProvider> {
        Arc::new(
            InMemoryUserProvider::new()
                .with_user(GenericUser::new("1").with_attribute("api_token", "abc"))
                .with_user(GenericUser::new("2").with_attribute("api_token", hash_token("xyz")))
                .with_user(GenericUser::new("3").with_attribute("secret_key", "k3y")),
        )
    }

    fn make_guard(
        transport: StaticTransport,
        options: TokenGuardOptions,
    ) -> (TokenGuard, Arc<RecordingEventSink>) {
        let events = Arc::new(RecordingEventSink::new());
        let guard = TokenGuard::new(
            "api",
            provider(),
            Arc::new(transport),
            options,
            events.clone(),
        );
        (guard, events)
    }

    #[test]
    fn test_hash_token() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_options_defaults() {
        let options: TokenGuardOptions = serde_json::from_value(json!({})).unwrap();
        assert_eq!(options, TokenGuardOptions::default());
        assert_eq!(options.input_key, "api_token");
        assert!(!options.hash);
    }

    #[tokio::test]
    async fn test_user_from_query() {
        let (guard, _) = make_guard(
            StaticTransport::new().with_query("api_token", "abc"),
            TokenGuardOptions::default(),
        );

        let user = guard.user().await.unwrap().unwrap();
        assert_eq!(user.auth_identifier(), "1");
    }

    #[tokio::test]
    async fn test_user_from_hashed_token() {
        let options = TokenGuardOptions {
            hash: true,
            ..Default::default()
        };
        let (guard, _) = make_guard(StaticTransport::new().with_query("api_token", "xyz"), options);

        assert_eq!(guard.id().await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_raw_token_does_not_match_when_hashing() {
        let options = TokenGuardOptions {
            hash: true,
            ..Default::default()
        };
        let (guard, events) = make_guard(StaticTransport::new().with_query("api_token", "abc"), options);

        assert!(guard.user().await.unwrap().is_none());
        assert_eq!(events.event_types(), vec![FAILED]);
    }

    #[tokio::test]
    async fn test_token_source_order() {
        let transport = StaticTransport::new()
            .with_query("api_token", "")
            .with_form("api_token", "abc")
            .with_bearer("xyz");
        let (guard, _) = make_guard(transport, TokenGuardOptions::default());
        assert_eq!(guard.token_for_request().as_deref(), Some("abc"));

        let (guard, _) = guard_with_bearer("abc");
        assert_eq!(guard.id().await.unwrap().as_deref(), Some("1"));
    }

    fn guard_with_bearer(token: &str) -> (TokenGuard, Arc<RecordingEventSink>) {
        make_guard(
            StaticTransport::new().with_bearer(token),
            TokenGuardOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_basic_auth_password() {
        // "user:abc"
        let transport = StaticTransport::new().with_header("Authorization", "Basic dXNlcjphYmM=");
        let (guard, _) = make_guard(transport, TokenGuardOptions::default());

        assert_eq!(guard.token_for_request().as_deref(), Some("abc"));
        assert!(guard.check().await.unwrap());
    }

    #[tokio::test]
    async fn test_custom_keys() {
        let options = TokenGuardOptions {
            input_key: "key".to_string(),
            storage_key: "secret_key".to_string(),
            hash: false,
        };
        let (guard, _) = make_guard(StaticTransport::new().with_query("key", "k3y"), options);

        assert_eq!(guard.id().await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_no_token_is_guest() {
        let (guard, events) = make_guard(StaticTransport::new(), TokenGuardOptions::default());

        assert!(guard.guest().await.unwrap());
        assert!(events.events().is_empty());
    }

    #[tokio::test]
    async fn test_validate() {
        let (guard, events) = make_guard(StaticTransport::new(), TokenGuardOptions::default());

        let mut credentials = Credentials::new();
        assert!(!guard.validate(&credentials).await.unwrap());

        credentials.insert("api_token".to_string(), json!(""));
        assert!(!guard.validate(&credentials).await.unwrap());
        assert!(events.events().is_empty());

        credentials.insert("api_token".to_string(), json!("abc"));
        assert!(guard.validate(&credentials).await.unwrap());
        assert_eq!(events.event_types(), vec![ATTEMPTING, VALIDATED]);
        assert!(!guard.has_user().await);

        credentials.insert("api_token".to_string(), json!("nope"));
        assert!(!guard.validate(&credentials).await.unwrap());
    }

    #[tokio::test]
    async fn test_validate_remaps_to_storage_key() {
        let options = TokenGuardOptions {
            input_key: "key".to_string(),
            storage_key: "secret_key".to_string(),
            hash: false,
        };
        let (guard, _) = make_guard(StaticTransport::new(), options);

        let mut credentials = Credentials::new();
        credentials.insert("key".to_string(), json!("k3y"));
        assert!(guard.validate(&credentials).await.unwrap());
    }
}
