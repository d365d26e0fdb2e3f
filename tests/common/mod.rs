//! Shared helpers for integration tests: fixture keys and a simulated bank.
//!
//! `SimBank` plays the server side of the envelope protocol. It verifies
//! every signature against the client public key, decrypts every cryptogram
//! with the server private key, and rejects a request whose `challengePass`
//! is not the last challenge it issued.
#![allow(dead_code)]

use std::cell::RefCell;

use base64::Engine;
use serde_json::{json, Map, Value};

use mbank_e2e::crypto;
use mbank_e2e::error::HarnessError;
use mbank_e2e::session::{Session, SessionKey};
use mbank_e2e::transport::{Method, StepRequest, StepResponse, Transport};

pub const CLIENT_PRIVATE: &str = include_str!("../fixtures/client_private.pem");
pub const CLIENT_PUBLIC: &str = include_str!("../fixtures/client_public.pem");
pub const SERVER_PRIVATE: &str = include_str!("../fixtures/server_private.pem");
pub const SERVER_PUBLIC: &str = include_str!("../fixtures/server_public.pem");
pub const DEVICES_JSON: &str = include_str!("../fixtures/devices.json");

pub const START_TOKEN: &str = "start-token";
pub const AUTH_TOKEN: &str = "auth-token";
pub const SESSION_GUID: &str = "3f1c2a9e-guid";
pub const OTP: &str = "111111";
pub const PASSWORD: &str = "correct horse";

/// Encrypt `plaintext` for the client, as the server does for a challenge.
pub fn challenge_for_client(plaintext: &str) -> String {
    let ct = crypto::encrypt_bytes(plaintext.as_bytes(), CLIENT_PUBLIC)
        .expect("encrypting a challenge should succeed");
    base64::engine::general_purpose::STANDARD.encode(ct)
}

/// Store the fixture client keypair and devices, as `keys load` does.
pub fn provision(session: &Session<'_>) {
    let keys = mbank_e2e::keys::ClientKeys {
        client_public_key: CLIENT_PUBLIC.to_string(),
        client_private_key: zeroize::Zeroizing::new(CLIENT_PRIVATE.to_string()),
    };
    let devices = serde_json::from_str(DEVICES_JSON).expect("devices fixture parses");
    mbank_e2e::keys::provision(session, &keys, &devices).expect("provision should succeed");
}

pub fn card_list() -> Value {
    json!({
        "cardAccounts": [
            {
                "contractId": 501,
                "cards": [{ "id": 11, "cardName": "Salary", "cardNumber": "5168000000000011" }]
            },
            {
                "contractId": 502,
                "cards": [{ "id": 22, "cardName": "Main", "cardNumber": "5168000000000022" }]
            }
        ]
    })
}

/// How the simulated bank behaves.
#[derive(Clone)]
pub struct SimConfig {
    /// `nextStep` returned by `auth/v4/nextstep`. `None` omits the field.
    pub first_next_step: Option<&'static str>,
    /// `nextStep` returned by `otp/confirm`.
    pub after_otp: Option<&'static str>,
    /// `redirectUrl` in the p2p confirmation.
    pub redirect_url: Option<&'static str>,
    /// Paths whose success response carries no new challenge.
    pub no_challenge_on: Vec<&'static str>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            first_next_step: Some("requestOtp"),
            after_otp: Some("enterPassword"),
            redirect_url: None,
            no_challenge_on: Vec::new(),
        }
    }
}

/// One protected request as the server saw it.
#[derive(Debug, Clone)]
pub struct Opened {
    pub path: String,
    /// Decrypted envelope payload.
    pub payload: Value,
    /// Body fields sent next to the envelope.
    pub plain: Map<String, Value>,
}

pub struct SimBank {
    config: SimConfig,
    challenge: RefCell<Option<String>>,
    issued: RefCell<u32>,
    pub requests: RefCell<Vec<StepRequest>>,
    pub opened: RefCell<Vec<Opened>>,
}

impl SimBank {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            challenge: RefCell::new(None),
            issued: RefCell::new(0),
            requests: RefCell::new(Vec::new()),
            opened: RefCell::new(Vec::new()),
        }
    }

    /// Issue a fresh challenge and return it encrypted for the client.
    pub fn issue_challenge(&self) -> String {
        let mut issued = self.issued.borrow_mut();
        *issued += 1;
        let plaintext = format!("CHAL-{:04}", *issued);
        *self.challenge.borrow_mut() = Some(plaintext.clone());
        challenge_for_client(&plaintext)
    }

    /// Seed a session as if the auth flow had just completed.
    pub fn seed_authenticated(&self, session: &Session<'_>) {
        provision(session);
        session
            .put_many(vec![
                (SessionKey::Token, json!(AUTH_TOKEN)),
                (SessionKey::ServerPublicKey, json!(SERVER_PUBLIC)),
                (SessionKey::Cryptogram, json!(self.issue_challenge())),
            ])
            .expect("seeding the session should succeed");
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests.borrow().iter().map(|r| r.path.clone()).collect()
    }

    pub fn opened_at(&self, path: &str) -> Opened {
        self.opened
            .borrow()
            .iter()
            .rev()
            .find(|o| o.path == path)
            .cloned()
            .unwrap_or_else(|| panic!("no protected request to {path}"))
    }

    fn ok(&self, path: &str, mut body: Map<String, Value>) -> StepResponse {
        if !self.config.no_challenge_on.contains(&path) {
            body.insert("cryptogram".to_string(), Value::String(self.issue_challenge()));
        } else {
            *self.challenge.borrow_mut() = None;
        }
        StepResponse {
            status: 200,
            body: Value::Object(body),
        }
    }

    fn reject(status: u16, reason: &str) -> StepResponse {
        StepResponse {
            status,
            body: json!({ "error": reason }),
        }
    }

    /// Verify, decrypt and check the challenge pass of a protected request.
    fn open(&self, request: &StepRequest) -> Result<Opened, StepResponse> {
        let body = request
            .body
            .as_ref()
            .and_then(Value::as_object)
            .ok_or_else(|| Self::reject(400, "missing body"))?;
        let sign = body.get("sign").and_then(Value::as_str);
        let cryptogram = body.get("cryptogram").and_then(Value::as_str);
        let (Some(sign), Some(cryptogram)) = (sign, cryptogram) else {
            return Err(Self::reject(400, "missing envelope"));
        };

        crypto::verify(cryptogram, sign, CLIENT_PUBLIC)
            .map_err(|_| Self::reject(401, "bad signature"))?;
        let plaintext = crypto::decrypt(cryptogram, SERVER_PRIVATE)
            .map_err(|_| Self::reject(400, "cannot decrypt"))?;
        let payload: Value =
            serde_json::from_slice(&plaintext).map_err(|_| Self::reject(400, "payload is not JSON"))?;

        let expected = self.challenge.borrow_mut().take();
        let presented = payload.get("challengePass").and_then(Value::as_str);
        if expected.is_none() || presented != expected.as_deref() {
            return Err(Self::reject(403, "invalid challenge"));
        }

        let mut plain = body.clone();
        plain.remove("sign");
        plain.remove("cryptogram");
        let opened = Opened {
            path: request.path.clone(),
            payload,
            plain,
        };
        self.opened.borrow_mut().push(opened.clone());
        Ok(opened)
    }

    fn route(&self, request: &StepRequest) -> StepResponse {
        let path = request.path.as_str();
        let bearer = request.bearer.as_deref();

        if path == "/auth/v3/start" {
            let body = request.body.clone().unwrap_or(Value::Null);
            if body["clientPublicKey"].as_str() != Some(CLIENT_PUBLIC) {
                return Self::reject(400, "unknown client key");
            }
            let mut fields = Map::new();
            fields.insert("token".into(), json!(START_TOKEN));
            fields.insert("serverPublicKey".into(), json!(SERVER_PUBLIC));
            return self.ok(path, fields);
        }

        let auth_step = path.starts_with("/auth/");
        let allowed = if auth_step {
            matches!(bearer, Some(START_TOKEN))
        } else {
            matches!(bearer, Some(AUTH_TOKEN))
        };
        if !allowed {
            return Self::reject(401, "bad bearer");
        }

        if request.method == Method::Get {
            return match path {
                "/cards/v3?forceCacheReload=true" => StepResponse {
                    status: 200,
                    body: card_list(),
                },
                "/payments/service/mobilemulti/markup" | "/payments/p2p/markup" => {
                    let mut fields = Map::new();
                    fields.insert("sessionGuid".into(), json!(SESSION_GUID));
                    self.ok(path, fields)
                }
                "/payments/v2/service/MobileMulti/commission" | "/payments/p2p/commission" => {
                    StepResponse {
                        status: 200,
                        body: json!({ "commission": 0 }),
                    }
                }
                _ => Self::reject(404, "not found"),
            };
        }

        let opened = match self.open(request) {
            Ok(opened) => opened,
            Err(rejection) => return rejection,
        };
        let payload = &opened.payload;
        let mut fields = Map::new();

        match path {
            "/auth/v4/nextstep" => {
                if let Some(step) = self.config.first_next_step {
                    fields.insert("nextStep".into(), json!(step));
                }
            }
            "/auth/v4/otp/confirm" => {
                if payload["otp"] != json!(OTP) {
                    return Self::reject(400, "wrong otp");
                }
                if let Some(step) = self.config.after_otp {
                    fields.insert("nextStep".into(), json!(step));
                }
            }
            "/auth/v3/enterpassword" => {
                if payload["password"] != json!(PASSWORD) {
                    return Self::reject(400, "wrong password");
                }
                fields.insert("token".into(), json!(AUTH_TOKEN));
            }
            "/payments/service/MobileMulti/confirm" | "/payments/p2p/confirm" => {
                if payload["password"] != json!(PASSWORD) {
                    return Self::reject(400, "wrong password");
                }
                if opened.plain.get("sessionGuid") != Some(&json!(SESSION_GUID)) {
                    return Self::reject(400, "unknown payment session");
                }
                fields.insert("operation".into(), json!({ "status": "processing" }));
                if path == "/payments/p2p/confirm" {
                    fields.insert("hasCardToSave".into(), json!(true));
                    if let Some(url) = self.config.redirect_url {
                        fields.insert("redirectUrl".into(), json!(url));
                    }
                }
            }
            "/payments/savedCards/saveFromLastPayment" => {
                if payload["password"] != json!(PASSWORD) {
                    return Self::reject(400, "wrong password");
                }
            }
            "/payments/v2/service/MobileMulti/setinput"
            | "/payments/p2p/setInput"
            | "/payments/service/MobileMulti/saveAsTemplate" => {}
            _ => return Self::reject(404, "not found"),
        }
        self.ok(path, fields)
    }
}

impl Transport for SimBank {
    fn send(&self, request: StepRequest) -> Result<StepResponse, HarnessError> {
        let response = self.route(&request);
        self.requests.borrow_mut().push(request);
        Ok(response)
    }
}

/// Records every URL handed to it.
#[derive(Default)]
pub struct RecordingBrowser {
    pub opened: RefCell<Vec<String>>,
}

impl mbank_e2e::flows::Browser for RecordingBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        self.opened.borrow_mut().push(url.to_string());
        Ok(())
    }
}
