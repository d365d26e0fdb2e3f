use serde_json::{json, Map, Value};

use super::{fields, Secrets, StepDriver};
use crate::error::HarnessError;
use crate::handshake::{AuthEvent, AuthState, NextStep};
use crate::session::SessionKey;

/// Runs `start → nextStep → {otp/confirm | enterPassword} → authenticated`.
///
/// Each method sends one step and advances [`AuthState`]. [`AuthFlow::run`]
/// drives the whole sequence and returns the final bearer token.
pub struct AuthFlow<'d, 'a> {
    driver: &'d StepDriver<'a>,
    secrets: &'d dyn Secrets,
    state: AuthState,
}

impl<'d, 'a> AuthFlow<'d, 'a> {
    pub fn new(driver: &'d StepDriver<'a>, secrets: &'d dyn Secrets) -> Self {
        Self {
            driver,
            secrets,
            state: AuthState::Started,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    fn advance(&mut self, event: AuthEvent) -> Result<(), HarnessError> {
        let next = self.state.advance(event)?;
        if next != self.state {
            tracing::info!(from = %self.state, to = %next, "auth state changed");
        }
        self.state = next;
        Ok(())
    }

    /// `POST /auth/v3/start`: stores the session token, the server public key
    /// and the first challenge.
    pub fn start(&mut self, phone_number: &str, device: &Value) -> Result<(), HarnessError> {
        let session = self.driver.session();
        let client_public_key: String = session.require(SessionKey::ClientPublicKey)?;
        let device = resolve_device(self.driver, device)?;

        let response = self.driver.anonymous(
            "auth/start",
            "/auth/v3/start",
            json!({
                "clientPublicKey": client_public_key,
                "phoneNumber": phone_number,
                "device": device,
            }),
        )?;

        let token = response.require("auth/start", "token")?.clone();
        let server_public_key = response.require("auth/start", "serverPublicKey")?.clone();
        let cryptogram = response.require("auth/start", "cryptogram")?.clone();
        session.put_many(vec![
            (SessionKey::Token, token),
            (SessionKey::ServerPublicKey, server_public_key),
            (SessionKey::Cryptogram, cryptogram),
        ])?;

        self.advance(AuthEvent::StartAccepted)
    }

    /// `POST /auth/v4/nextstep` with only the challenge pass.
    pub fn next_step(&mut self) -> Result<NextStep, HarnessError> {
        let response =
            self.driver
                .send_protected("auth/nextstep", "/auth/v4/nextstep", Map::new(), Map::new())?;
        let next = self.absorb_next_step(&response)?;
        self.advance(AuthEvent::NextStep(next.clone()))?;
        Ok(next)
    }

    /// `POST /auth/v4/otp/confirm`.
    pub fn confirm_otp(&mut self) -> Result<NextStep, HarnessError> {
        let otp = self.secrets.otp()?;
        let response = self.driver.send_protected(
            "auth/otp",
            "/auth/v4/otp/confirm",
            fields([("otp", Value::String(otp.to_string()))]),
            Map::new(),
        )?;
        let next = self.absorb_next_step(&response)?;
        self.advance(AuthEvent::OtpConfirmed(next.clone()))?;
        Ok(next)
    }

    /// `POST /auth/v3/enterpassword`: replaces the session token with the
    /// authenticated one.
    pub fn enter_password(&mut self) -> Result<(), HarnessError> {
        let password = self.secrets.password()?;
        let response = self.driver.send_protected(
            "auth/password",
            "/auth/v3/enterpassword",
            fields([("password", Value::String(password.to_string()))]),
            Map::new(),
        )?;
        let token = response.require("auth/password", "token")?.clone();
        self.driver
            .absorb_challenge(&response, vec![(SessionKey::Token, token)])?;
        self.advance(AuthEvent::PasswordAccepted)
    }

    /// Drive the flow from its current state to `Authenticated`.
    pub fn run(&mut self, phone_number: &str, device: &Value) -> Result<String, HarnessError> {
        loop {
            match self.state {
                AuthState::Started => self.start(phone_number, device)?,
                AuthState::RequiresNextStepDecision => {
                    self.next_step()?;
                }
                AuthState::RequiresOtp => {
                    self.confirm_otp()?;
                }
                AuthState::RequiresPassword => self.enter_password()?,
                AuthState::Authenticated => break,
            }
        }
        self.driver.session().token()
    }

    /// Store the response's challenge and `nextStep` together.
    fn absorb_next_step(
        &self,
        response: &crate::transport::StepResponse,
    ) -> Result<NextStep, HarnessError> {
        let raw = response.body.get("nextStep").cloned().unwrap_or(Value::Null);
        let next = NextStep::from_wire(raw.as_str());
        self.driver
            .absorb_challenge(response, vec![(SessionKey::NextStep, raw)])?;
        Ok(next)
    }
}

/// A string naming a provisioned device is replaced by its descriptor.
/// Anything else is sent as configured.
fn resolve_device(driver: &StepDriver<'_>, device: &Value) -> Result<Value, HarnessError> {
    let key = match device.as_str().and_then(SessionKey::from_name) {
        Some(key @ (SessionKey::IosReleaseDevice | SessionKey::IosDebugDevice)) => key,
        _ => return Ok(device.clone()),
    };
    driver.session().require(key)
}
