//! Flows module: the API workflows, one HTTP step at a time.
//!
//! [`StepDriver`] is the glue between a [`Transport`], the [`Session`] and
//! the handshake. Each step either is a plain bearer call or a protected
//! call that answers the current challenge and stores the next one.

pub mod auth;
pub mod browser;
pub mod payments;

use std::time::Duration;

use serde_json::{Map, Value};
use zeroize::Zeroizing;

use crate::error::HarnessError;
use crate::handshake::{challenge_respond, SessionKeys};
use crate::session::{Session, SessionKey};
use crate::transport::{Method, StepRequest, StepResponse, Transport};

pub use auth::AuthFlow;
pub use browser::{AppleScriptBrowser, Browser, NoBrowser};
pub use payments::Payments;

// ── Secrets ────────────────────────────────────────────────────────────────

/// Supplies the OTP and account password when a step needs them.
pub trait Secrets {
    fn otp(&self) -> Result<Zeroizing<String>, HarnessError>;
    fn password(&self) -> Result<Zeroizing<String>, HarnessError>;
}

/// Fixed credentials, typically from the environment config.
#[derive(Default, Clone)]
pub struct Credentials {
    pub otp: Option<String>,
    pub password: Option<String>,
}

impl Secrets for Credentials {
    fn otp(&self) -> Result<Zeroizing<String>, HarnessError> {
        self.otp
            .clone()
            .map(Zeroizing::new)
            .ok_or(HarnessError::MissingCredential("otp"))
    }

    fn password(&self) -> Result<Zeroizing<String>, HarnessError> {
        self.password
            .clone()
            .map(Zeroizing::new)
            .ok_or(HarnessError::MissingCredential("password"))
    }
}

// ── StepDriver ─────────────────────────────────────────────────────────────

/// Sends steps on behalf of one flow.
pub struct StepDriver<'a> {
    transport: &'a dyn Transport,
    session: Session<'a>,
    pacing: Duration,
}

impl<'a> StepDriver<'a> {
    pub fn new(transport: &'a dyn Transport, session: Session<'a>) -> Self {
        Self {
            transport,
            session,
            pacing: Duration::ZERO,
        }
    }

    /// Sleep this long before every request.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn session(&self) -> &Session<'a> {
        &self.session
    }

    fn send(&self, step: &'static str, request: StepRequest) -> Result<StepResponse, HarnessError> {
        if !self.pacing.is_zero() {
            std::thread::sleep(self.pacing);
        }
        let method = request.method;
        let path = request.path.clone();
        let response = self.transport.send(request)?;
        tracing::info!(step, method = method.as_str(), %path, status = response.status, "step");
        response.ensure_success(step)
    }

    /// A call without a bearer token (only `auth/start`).
    pub fn anonymous(
        &self,
        step: &'static str,
        path: &str,
        body: Value,
    ) -> Result<StepResponse, HarnessError> {
        self.send(step, StepRequest::post(path, body))
    }

    /// A bearer-authenticated call with no envelope.
    pub fn plain(
        &self,
        step: &'static str,
        method: Method,
        path: &str,
    ) -> Result<StepResponse, HarnessError> {
        let token = self.session.token()?;
        let request = match method {
            Method::Get => StepRequest::get(path),
            Method::Post => StepRequest::post(path, Value::Object(Map::new())),
        };
        self.send(step, request.with_bearer(token))
    }

    /// Answer the current challenge and POST `{sign, cryptogram, ..plain_fields}`.
    ///
    /// `extra` travels inside the envelope, `plain_fields` next to it. The
    /// response's challenge is not stored; see [`StepDriver::protected`].
    pub fn send_protected(
        &self,
        step: &'static str,
        path: &str,
        extra: Map<String, Value>,
        plain_fields: Map<String, Value>,
    ) -> Result<StepResponse, HarnessError> {
        let token = self.session.token()?;
        let envelope = challenge_respond(&SessionKeys::new(&self.session), extra)?;

        let mut body = plain_fields;
        body.insert("sign".to_string(), Value::String(envelope.sign));
        body.insert("cryptogram".to_string(), Value::String(envelope.cryptogram));

        self.send(step, StepRequest::post(path, Value::Object(body)).with_bearer(token))
    }

    /// [`StepDriver::send_protected`], then store the response's challenge.
    pub fn protected(
        &self,
        step: &'static str,
        path: &str,
        extra: Map<String, Value>,
        plain_fields: Map<String, Value>,
    ) -> Result<StepResponse, HarnessError> {
        let response = self.send_protected(step, path, extra, plain_fields)?;
        self.absorb_challenge(&response, Vec::new())?;
        Ok(response)
    }

    /// Store the response's `cryptogram` together with `also` in one batch.
    ///
    /// A response without a challenge clears the stored one, so the next
    /// protected call fails with `KeyNotFound` instead of replaying it.
    pub fn absorb_challenge(
        &self,
        response: &StepResponse,
        also: Vec<(SessionKey, Value)>,
    ) -> Result<(), HarnessError> {
        match response.str_field("cryptogram") {
            Some(cryptogram) => {
                let mut entries = also;
                entries.push((SessionKey::Cryptogram, Value::String(cryptogram.to_string())));
                self.session.put_many(entries)?;
            }
            None => {
                tracing::debug!("response carried no challenge, clearing the stored one");
                if !also.is_empty() {
                    self.session.put_many(also)?;
                }
                self.session.clear(&[SessionKey::Cryptogram])?;
            }
        }
        Ok(())
    }
}

/// Build a JSON object from `(name, value)` pairs.
pub(crate) fn fields<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryStore;
    use serde_json::json;
    use std::cell::RefCell;

    /// Replays canned responses and records what was sent.
    struct Scripted {
        responses: RefCell<Vec<StepResponse>>,
        sent: RefCell<Vec<StepRequest>>,
    }

    impl Scripted {
        fn new(responses: Vec<StepResponse>) -> Self {
            Self {
                responses: RefCell::new(responses),
                sent: RefCell::new(Vec::new()),
            }
        }
    }

    impl Transport for Scripted {
        fn send(&self, request: StepRequest) -> Result<StepResponse, HarnessError> {
            self.sent.borrow_mut().push(request);
            Ok(self.responses.borrow_mut().remove(0))
        }
    }

    fn ok(body: Value) -> StepResponse {
        StepResponse { status: 200, body }
    }

    #[test]
    fn test_plain_attaches_bearer_and_checks_status() {
        let store = MemoryStore::new();
        let session = Session::new(&store);
        session.put(SessionKey::Token, "tok").expect("seed token");
        let transport = Scripted::new(vec![
            ok(json!({ "cardAccounts": [] })),
            StepResponse {
                status: 500,
                body: json!("boom"),
            },
        ]);
        let driver = StepDriver::new(&transport, session);

        driver
            .plain("cards", Method::Get, "/cards/v3")
            .expect("first call succeeds");
        let err = driver
            .plain("cards", Method::Get, "/cards/v3")
            .expect_err("500 fails the step");
        assert!(matches!(err, HarnessError::StepFailed { status: 500, .. }));

        let sent = transport.sent.borrow();
        assert_eq!(sent[0].bearer.as_deref(), Some("tok"));
        assert_eq!(sent[0].method, Method::Get);
    }

    #[test]
    fn test_plain_without_token_is_key_not_found() {
        let store = MemoryStore::new();
        let transport = Scripted::new(Vec::new());
        let driver = StepDriver::new(&transport, Session::new(&store));
        let err = driver
            .plain("cards", Method::Get, "/cards/v3")
            .expect_err("no token yet");
        assert!(matches!(err, HarnessError::KeyNotFound(SessionKey::Token)));
        assert!(transport.sent.borrow().is_empty());
    }

    #[test]
    fn test_absorb_challenge_stores_or_clears() {
        let store = MemoryStore::new();
        let session = Session::new(&store);
        let transport = Scripted::new(Vec::new());
        let driver = StepDriver::new(&transport, session);

        driver
            .absorb_challenge(
                &ok(json!({ "cryptogram": "c1", "sessionGuid": "g" })),
                vec![(SessionKey::SessionGuid, json!("g"))],
            )
            .expect("absorb");
        assert_eq!(session.cryptogram().expect("stored"), "c1");
        assert_eq!(session.session_guid().expect("stored"), "g");

        driver
            .absorb_challenge(&ok(json!({ "status": "ok" })), Vec::new())
            .expect("absorb");
        assert!(matches!(
            session.cryptogram(),
            Err(HarnessError::KeyNotFound(SessionKey::Cryptogram))
        ));
    }

    #[test]
    fn test_credentials_report_missing_values() {
        let creds = Credentials {
            otp: Some("111111".to_string()),
            password: None,
        };
        assert_eq!(creds.otp().expect("otp").as_str(), "111111");
        assert!(matches!(
            creds.password(),
            Err(HarnessError::MissingCredential("password"))
        ));
    }
}
