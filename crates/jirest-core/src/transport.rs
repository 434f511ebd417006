//! HTTP access to the Jira REST API
//!
//! All paths are relative to the REST base URL, e.g.
//! `https://jira.example.com/rest/api/2/`. Any failure (status, connection,
//! body decoding) is logged and reported as `None`/`false`; callers never
//! see why a request failed.

use crate::Config;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Requests consumed by the object model
pub trait Transport {
    /// GET `path`; empty query values are dropped
    fn get(&self, path: &str, query: &[(&str, &str)]) -> Option<Value>;

    /// POST a JSON body and decode the JSON response
    fn post(&self, path: &str, body: &Value) -> Option<Value>;

    /// PUT a JSON body; success is acknowledged with an empty object
    fn put(&self, path: &str, body: &Value) -> Option<Value>;

    /// DELETE `path`; `true` on any 2xx
    fn delete(&self, path: &str, query: &[(&str, &str)]) -> bool;
}

/// Basic-auth credentials applied to every request
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value of the `Authorization` header
    pub fn header(&self) -> String {
        let pair = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(pair))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Blocking [`Transport`] backed by a `ureq` agent
pub struct HttpTransport {
    base_url: String,
    agent: ureq::Agent,
    timeout: Duration,
    credentials: Option<Credentials>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, credentials: Option<Credentials>) -> Self {
        Self::with_timeout(base_url, credentials, DEFAULT_TIMEOUT)
    }

    /// Create a transport whose requests all share `timeout`
    pub fn with_timeout(
        base_url: impl Into<String>,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            base_url: base_url.into(),
            agent,
            timeout,
            credentials,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::with_timeout(&config.base_url, config.credentials(), config.timeout())
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Absolute URL for a relative REST path
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let mut request = self
            .agent
            .request(method, &self.url(path))
            .set("Accept", "application/json");

        if let Some(credentials) = &self.credentials {
            request = request.set("Authorization", &credentials.header());
        }

        request
    }

    fn with_query(mut request: ureq::Request, query: &[(&str, &str)]) -> ureq::Request {
        for (name, value) in query {
            if !value.is_empty() {
                request = request.query(name, value);
            }
        }
        request
    }

    fn finish(
        method: &str,
        path: &str,
        result: Result<ureq::Response, ureq::Error>,
        accepted: &[u16],
    ) -> Option<Value> {
        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                warn!(method, path, status, "request rejected");
                return None;
            }
            Err(err) => {
                warn!(method, path, error = %err, "request failed");
                return None;
            }
        };

        let status = response.status();
        if !accepted.contains(&status) {
            warn!(method, path, status, "unexpected status");
            return None;
        }

        debug!(method, path, status, "request succeeded");

        if status == 204 {
            return Some(Value::Object(Map::new()));
        }

        match response.into_json::<Value>() {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(method, path, error = %err, "invalid JSON response");
                None
            }
        }
    }
}

impl Transport for HttpTransport {
    fn get(&self, path: &str, query: &[(&str, &str)]) -> Option<Value> {
        let request = Self::with_query(self.request("GET", path), query);
        Self::finish("GET", path, request.call(), &[200])
    }

    fn post(&self, path: &str, body: &Value) -> Option<Value> {
        let result = self.request("POST", path).send_json(body);
        Self::finish("POST", path, result, &[200, 201, 204])
    }

    fn put(&self, path: &str, body: &Value) -> Option<Value> {
        let result = self.request("PUT", path).send_json(body);
        Self::finish("PUT", path, result, &[200, 204]).map(|_| Value::Object(Map::new()))
    }

    fn delete(&self, path: &str, query: &[(&str, &str)]) -> bool {
        let request = Self::with_query(self.request("DELETE", path), query);
        match request.call() {
            Ok(response) if (200..300).contains(&response.status()) => true,
            Ok(response) => {
                warn!(method = "DELETE", path, status = response.status(), "unexpected status");
                false
            }
            Err(err) => {
                warn!(method = "DELETE", path, error = %err, "request failed");
                false
            }
        }
    }
}
