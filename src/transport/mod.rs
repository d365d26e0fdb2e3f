/// Transport module: one HTTP round trip per test step.
///
/// The flows talk to the bank API through the [`Transport`] trait so they can
/// run against the real host ([`HttpTransport`], `reqwest::blocking`) or an
/// in-process simulation in tests. Bodies are JSON on both sides; the status
/// check is left to the caller so that a failing step can report the body.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::HarnessError;

// ── Request / response ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepRequest {
    pub method: Method,
    /// Path and query relative to the API host, e.g. `/auth/v3/start`.
    pub path: String,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub bearer: Option<String>,
    /// JSON body. Ignored for GET.
    pub body: Option<Value>,
}

impl StepRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            bearer: None,
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            bearer: None,
            body: Some(body),
        }
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepResponse {
    pub status: u16,
    /// Decoded body. `Null` for an empty body, a JSON string for a body that
    /// is not JSON.
    pub body: Value,
}

impl StepResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Fail the step unless the status is 2xx.
    pub fn ensure_success(self, step: &'static str) -> Result<Self, HarnessError> {
        if self.is_success() {
            return Ok(self);
        }
        let body = match &self.body {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Err(HarnessError::StepFailed {
            step,
            status: self.status,
            body,
        })
    }

    /// A top-level string field, if present.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.body.get(field).and_then(Value::as_str)
    }

    /// A top-level field that must be present and non-null.
    pub fn require(&self, step: &'static str, field: &'static str) -> Result<&Value, HarnessError> {
        match self.body.get(field) {
            Some(Value::Null) | None => Err(HarnessError::MissingField { step, field }),
            Some(value) => Ok(value),
        }
    }

    pub fn require_str(&self, step: &'static str, field: &'static str) -> Result<&str, HarnessError> {
        self.require(step, field)?
            .as_str()
            .ok_or(HarnessError::MissingField { step, field })
    }

    pub fn object(&self) -> Option<&Map<String, Value>> {
        self.body.as_object()
    }
}

/// Decode a raw response body the way every step expects it.
pub fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

// ── Transport ──────────────────────────────────────────────────────────────

/// Sends one request and returns whatever the server answered.
///
/// Non-2xx statuses are returned as responses, not errors.
pub trait Transport {
    fn send(&self, request: StepRequest) -> Result<StepResponse, HarnessError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: StepRequest) -> Result<StepResponse, HarnessError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, request: StepRequest) -> Result<StepResponse, HarnessError> {
        (**self).send(request)
    }
}

// ── HttpTransport ──────────────────────────────────────────────────────────

/// `reqwest::blocking` client bound to one API host.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    /// Base URL with scheme and without a trailing slash.
    base_url: String,
}

impl HttpTransport {
    /// `host` may be a bare hostname (`api.bank.example`) or a full base URL.
    /// A bare host gets `https://`.
    pub fn new(host: &str) -> Result<Self, HarnessError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|source| HarnessError::Transport {
                path: host.to_string(),
                source,
            })?;
        Ok(Self {
            client,
            base_url: base_url(host),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn base_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("https://") || host.starts_with("http://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: StepRequest) -> Result<StepResponse, HarnessError> {
        let url = format!("{}{}", self.base_url, request.path);
        let transport_error = |source| HarnessError::Transport {
            path: request.path.clone(),
            source,
        };

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => {
                let body = request.body.as_ref().unwrap_or(&Value::Null);
                self.client.post(&url).json(body)
            }
        };
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        tracing::debug!(method = request.method.as_str(), %url, "sending request");
        let response = builder.send().map_err(transport_error)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().map_err(transport_error)?;
        tracing::debug!(status, len = bytes.len(), "response received");

        Ok(StepResponse {
            status,
            body: decode_body(&bytes),
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
