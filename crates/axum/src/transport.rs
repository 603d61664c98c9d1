// Transport over an axum request

use axum::http::{request::Parts, HeaderMap};
use gatehouse_core::Transport;
use std::collections::HashMap;

/// Snapshot of the request fields guards may read
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    headers: HeaderMap,
    query: HashMap<String, String>,
    form: HashMap<String, String>,
}

impl HttpTransport {
    /// Capture headers and query string from request parts
    pub fn from_parts(parts: &Parts) -> Self {
        Self {
            headers: parts.headers.clone(),
            query: parts
                .uri
                .query()
                .map(|query| decode_pairs(query.as_bytes()))
                .unwrap_or_default(),
            form: HashMap::new(),
        }
    }

    /// Attach an `application/x-www-form-urlencoded` body
    pub fn with_form_body(mut self, body: &[u8]) -> Self {
        self.form = decode_pairs(body);
        self
    }
}

/// Decode urlencoded pairs; the first occurrence of a key wins
fn decode_pairs(input: &[u8]) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(input).into_owned() {
        pairs.entry(key).or_insert(value);
    }
    pairs
}

impl Transport for HttpTransport {
    /// Repeated headers are joined with ", " into a single line
    fn header(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    fn query(&self, name: &str) -> Option<String> {
        self.query.get(name).cloned()
    }

    fn form(&self, name: &str) -> Option<String> {
        self.form.get(name).cloned()
    }
}
