// Read-only access to the inbound request
//
// Guards only need three lookups: a header, a query parameter and a form field.
// HTTP adapters implement Transport over their own request types.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;

/// Marker preceding a bearer token in the Authorization header
const BEARER_MARKER: &str = "Bearer ";

/// Request accessor consumed by guards
pub trait Transport: Send + Sync {
    /// Header value by name (case-insensitive)
    fn header(&self, name: &str) -> Option<String>;

    /// Query string parameter by name
    fn query(&self, name: &str) -> Option<String>;

    /// Form/body field by name
    fn form(&self, name: &str) -> Option<String>;
}

/// Extract the bearer token from the Authorization header
///
/// Takes the text after the last `"Bearer "` marker, up to the next comma.
/// An empty token counts as absent.
pub fn bearer_token(transport: &dyn Transport) -> Option<String> {
    let header = transport.header("authorization")?;
    parse_bearer(&header).map(str::to_string)
}

fn parse_bearer(header: &str) -> Option<&str> {
    let position = header.rfind(BEARER_MARKER)?;
    let rest = &header[position + BEARER_MARKER.len()..];
    let token = match rest.find(',') {
        Some(comma) => &rest[..comma],
        None => rest,
    };

    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Extract the password half of HTTP basic credentials
pub fn basic_password(transport: &dyn Transport) -> Option<String> {
    let header = transport.header("authorization")?;
    let encoded = header
        .strip_prefix("Basic ")
        .or_else(|| header.strip_prefix("basic "))?;

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (_, password) = decoded.split_once(':')?;

    if password.is_empty() {
        None
    } else {
        Some(password.to_string())
    }
}

// ============================================================================
// StaticTransport - In-memory request for tests and embedding
// ============================================================================

/// Transport over plain maps
#[derive(Debug, Clone, Default)]
pub struct StaticTransport {
    headers: HashMap<String, String>,
    query: HashMap<String, String>,
    form: HashMap<String, String>,
}

impl StaticTransport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header (names are stored lowercased)
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Set `Authorization: Bearer <token>`
    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header("Authorization", format!("{}{}", BEARER_MARKER, token))
    }

    /// Set a query parameter
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Set a form field
    pub fn with_form(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(name.into(), value.into());
        self
    }
}

impl Transport for StaticTransport {
    fn header(&self, name: &str) -> Option<String> {
        self.headers.get(&name.to_ascii_lowercase()).cloned()
    }

    fn query(&self, name: &str) -> Option<String> {
        self.query.get(name).cloned()
    }

    fn form(&self, name: &str) -> Option<String> {
        self.form.get(name).cloned()
    }
}
