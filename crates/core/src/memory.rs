// In-memory principal storage
//
// GenericUser is an attribute bag principal; InMemoryUserProvider matches it
// against credential maps. Used by tests and by small deployments that seed
// users at startup.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::AuthResult;
use crate::traits::{Authenticatable, Credentials, Principal, UserProvider};

/// Principal backed by a plain attribute map
#[derive(Debug)]
pub struct GenericUser {
    id: String,
    attributes: Map<String, Value>,
    remember_token: Mutex<Option<String>>,
}

impl GenericUser {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Map::new(),
            remember_token: Mutex::new(None),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Match every non-password credential against id or attributes
    fn matches(&self, credentials: &Credentials) -> bool {
        credentials
            .iter()
            .filter(|(key, _)| !key.contains("password"))
            .all(|(key, expected)| {
                if key == "id" {
                    expected.as_str() == Some(self.id.as_str())
                } else {
                    self.attributes.get(key) == Some(expected)
                }
            })
    }
}

impl Authenticatable for GenericUser {
    fn auth_identifier(&self) -> String {
        self.id.clone()
    }

    fn remember_token(&self) -> Option<String> {
        self.remember_token.lock().clone()
    }

    fn set_remember_token(&self, token: &str) {
        *self.remember_token.lock() = Some(token.to_string());
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Checks a plaintext password against a stored attribute value
pub type PasswordVerifier = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// UserProvider over a list of GenericUser
#[derive(Default)]
pub struct InMemoryUserProvider {
    users: RwLock<Vec<Arc<GenericUser>>>,
    lookups: AtomicUsize,
    verifier: Option<PasswordVerifier>,
}

impl InMemoryUserProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: GenericUser) -> Self {
        self.users.get_mut().push(Arc::new(user));
        self
    }

    /// Use a custom password check (e.g. a hash verifier) instead of string equality
    pub fn with_password_verifier(
        mut self,
        verifier: impl Fn(&str, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    pub async fn insert(&self, user: GenericUser) {
        self.users.write().await.push(Arc::new(user));
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }

    /// Number of provider lookups served so far
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    async fn find(&self, predicate: impl Fn(&GenericUser) -> bool) -> Option<Principal> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.users
            .read()
            .await
            .iter()
            .find(|user| predicate(user.as_ref()))
            .map(|user| user.clone() as Principal)
    }

    fn check_password(&self, plain: &str, stored: &str) -> bool {
        match &self.verifier {
            Some(verifier) => verifier(plain, stored),
            None => plain == stored,
        }
    }
}

impl fmt::Debug for InMemoryUserProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryUserProvider")
            .field("lookups", &self.lookups())
            .field("verifier", &self.verifier.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl UserProvider for InMemoryUserProvider {
    async fn retrieve_by_id(&self, identifier: &str) -> AuthResult<Option<Principal>> {
        Ok(self.find(|user| user.id == identifier).await)
    }

    async fn retrieve_by_token(
        &self,
        identifier: &str,
        token: &str,
    ) -> AuthResult<Option<Principal>> {
        Ok(self
            .find(|user| {
                user.id == identifier && user.remember_token().as_deref() == Some(token)
            })
            .await)
    }

    async fn update_remember_token(
        &self,
        user: &dyn Authenticatable,
        token: &str,
    ) -> AuthResult<()> {
        let identifier = user.auth_identifier();
        user.set_remember_token(token);
        if let Some(stored) = self
            .users
            .read()
            .await
            .iter()
            .find(|stored| stored.id == identifier)
        {
            stored.set_remember_token(token);
        }
        Ok(())
    }

    async fn retrieve_by_credentials(
        &self,
        credentials: &Credentials,
    ) -> AuthResult<Option<Principal>> {
        let has_lookup_key = credentials.keys().any(|key| !key.contains("password"));
        if !has_lookup_key {
            return Ok(None);
        }
        Ok(self.find(|user| user.matches(credentials)).await)
    }

    async fn validate_credentials(
        &self,
        user: &dyn Authenticatable,
        credentials: &Credentials,
    ) -> AuthResult<bool> {
        let Some(plain) = credentials.get("password").and_then(Value::as_str) else {
            return Ok(false);
        };
        let Some(user) = user.as_any().downcast_ref::<GenericUser>() else {
            return Ok(false);
        };
        let Some(stored) = user.attribute("password").and_then(Value::as_str) else {
            return Ok(false);
        };
        Ok(self.check_password(plain, stored))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> InMemoryUserProvider {
        InMemoryUserProvider::new()
            .with_user(
                GenericUser::new("1")
                    .with_attribute("email", "ann@example.com")
                    .with_attribute("password", "hunter2"),
            )
            .with_user(GenericUser::new("2").with_attribute("email", "bob@example.com"))
    }

    fn credentials(value: Value) -> Credentials {
        match value {
            Value::Object(map) => map,
            _ => panic!("credentials must be an object"),
        }
    }

    #[tokio::test]
    async fn test_retrieve_by_id() {
        let provider = provider();

        let user = provider.retrieve_by_id("2").await.unwrap().unwrap();
        assert_eq!(user.auth_identifier(), "2");
        assert!(provider.retrieve_by_id("3").await.unwrap().is_none());
        assert_eq!(provider.lookups(), 2);
    }

    #[tokio::test]
    async fn test_retrieve_by_credentials_ignores_password() {
        let provider = provider();

        let creds = credentials(json!({ "email": "ann@example.com", "password": "wrong" }));
        let user = provider.retrieve_by_credentials(&creds).await.unwrap().unwrap();
        assert_eq!(user.auth_identifier(), "1");

        let creds = credentials(json!({ "password": "hunter2" }));
        assert!(provider.retrieve_by_credentials(&creds).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_validate_credentials() {
        let provider = provider();
        let user = provider.retrieve_by_id("1").await.unwrap().unwrap();

        let good = credentials(json!({ "email": "ann@example.com", "password": "hunter2" }));
        let bad = credentials(json!({ "email": "ann@example.com", "password": "nope" }));
        assert!(provider.validate_credentials(user.as_ref(), &good).await.unwrap());
        assert!(!provider.validate_credentials(user.as_ref(), &bad).await.unwrap());

        let no_password = provider.retrieve_by_id("2").await.unwrap().unwrap();
        assert!(!provider
            .validate_credentials(no_password.as_ref(), &good)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_password_verifier() {
        let provider = provider().with_password_verifier(|plain, stored| {
            format!("{}!", plain) == stored
        });
        provider
            .insert(GenericUser::new("3").with_attribute("password", "pw!"))
            .await;
        let user = provider.retrieve_by_id("3").await.unwrap().unwrap();

        let creds = credentials(json!({ "password": "pw" }));
        assert!(provider.validate_credentials(user.as_ref(), &creds).await.unwrap());
    }

    #[tokio::test]
    async fn test_remember_token() {
        let provider = provider();
        let user = provider.retrieve_by_id("2").await.unwrap().unwrap();

        provider.update_remember_token(user.as_ref(), "r3m").await.unwrap();

        let found = provider.retrieve_by_token("2", "r3m").await.unwrap();
        assert_eq!(found.unwrap().remember_token().as_deref(), Some("r3m"));
        assert!(provider.retrieve_by_token("2", "other").await.unwrap().is_none());
    }
}
