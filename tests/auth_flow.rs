/// Authentication flow against the simulated bank.
///
/// Every protected step is checked server-side: the signature must verify
/// under the client key and the decrypted `challengePass` must equal the
/// challenge the bank issued last. A flow that reaches `Authenticated` has
/// therefore answered every challenge in order.
mod common;

use serde_json::{json, Value};

use common::{SimBank, SimConfig, AUTH_TOKEN, OTP, PASSWORD};
use mbank_e2e::error::HarnessError;
use mbank_e2e::flows::{AuthFlow, Credentials, StepDriver};
use mbank_e2e::handshake::{AuthState, NextStep};
use mbank_e2e::session::{MemoryStore, Session, SessionKey};

fn credentials() -> Credentials {
    Credentials {
        otp: Some(OTP.to_string()),
        password: Some(PASSWORD.to_string()),
    }
}

// ── Test 1: OTP then password ──────────────────────────────────────────────

#[test]
fn test_otp_then_password_reaches_authenticated() {
    let bank = SimBank::new(SimConfig::default());
    let store = MemoryStore::new();
    let session = Session::new(&store);
    common::provision(&session);
    let driver = StepDriver::new(&bank, session);
    let secrets = credentials();

    let mut flow = AuthFlow::new(&driver, &secrets);
    let token = flow
        .run("+380501234567", &json!("iosReleaseDevice"))
        .expect("auth should succeed");

    assert_eq!(token, AUTH_TOKEN);
    assert_eq!(flow.state(), AuthState::Authenticated);
    assert_eq!(
        bank.paths(),
        vec![
            "/auth/v3/start",
            "/auth/v4/nextstep",
            "/auth/v4/otp/confirm",
            "/auth/v3/enterpassword",
        ]
    );

    // The OTP and password travel inside the envelope, next to the pass.
    let otp = bank.opened_at("/auth/v4/otp/confirm");
    assert_eq!(otp.payload["otp"], json!(OTP));
    assert!(otp.payload["challengePass"].is_string());
    assert!(otp.plain.is_empty());

    // The device name was resolved to the provisioned descriptor.
    let start = &bank.requests.borrow()[0];
    let device = &start.body.as_ref().expect("start has a body")["device"];
    assert_eq!(device["deviceId"], json!("A1B2C3D4-0000-4000-8000-000000000001"));
    assert!(start.bearer.is_none());

    // The last challenge is stored for the next protected step.
    let session = driver.session();
    assert!(session.cryptogram().is_ok());
    assert_eq!(
        session.get::<Value>(SessionKey::NextStep).expect("read"),
        Some(json!("enterPassword"))
    );
}

// ── Test 2: password only ──────────────────────────────────────────────────

#[test]
fn test_password_only_skips_otp() {
    let bank = SimBank::new(SimConfig {
        first_next_step: Some("enterPassword"),
        ..SimConfig::default()
    });
    let store = MemoryStore::new();
    let session = Session::new(&store);
    common::provision(&session);
    let driver = StepDriver::new(&bank, session);
    // No OTP configured: asking for one would fail the run.
    let secrets = Credentials {
        otp: None,
        password: Some(PASSWORD.to_string()),
    };

    let token = AuthFlow::new(&driver, &secrets)
        .run("+380501234567", &json!({ "deviceId": "inline" }))
        .expect("auth should succeed");

    assert_eq!(token, AUTH_TOKEN);
    assert!(!bank.paths().iter().any(|p| p == "/auth/v4/otp/confirm"));
}

// ── Test 3: terminal nextStep ──────────────────────────────────────────────

#[test]
fn test_absent_or_unknown_next_step_finishes_with_start_token() {
    for next in [None, Some("biometry")] {
        let bank = SimBank::new(SimConfig {
            first_next_step: next,
            ..SimConfig::default()
        });
        let store = MemoryStore::new();
        let session = Session::new(&store);
        common::provision(&session);
        let driver = StepDriver::new(&bank, session);
        let secrets = credentials();

        let mut flow = AuthFlow::new(&driver, &secrets);
        let token = flow
            .run("+380501234567", &json!("iosDebugDevice"))
            .expect("auth should succeed");

        assert_eq!(flow.state(), AuthState::Authenticated);
        assert_eq!(token, common::START_TOKEN);
        assert_eq!(bank.paths().len(), 2);
    }
}

// ── Test 4: step by step ───────────────────────────────────────────────────

#[test]
fn test_individual_steps_report_next_step() {
    let bank = SimBank::new(SimConfig::default());
    let store = MemoryStore::new();
    let session = Session::new(&store);
    common::provision(&session);
    let driver = StepDriver::new(&bank, session);
    let secrets = credentials();
    let mut flow = AuthFlow::new(&driver, &secrets);

    flow.start("+380501234567", &json!("iosReleaseDevice"))
        .expect("start should succeed");
    assert_eq!(flow.state(), AuthState::RequiresNextStepDecision);
    assert_eq!(flow.next_step().expect("nextstep"), NextStep::RequestOtp);
    assert_eq!(flow.state(), AuthState::RequiresOtp);
    assert_eq!(flow.confirm_otp().expect("otp"), NextStep::EnterPassword);
    assert_eq!(flow.state(), AuthState::RequiresPassword);
    flow.enter_password().expect("password");
    assert_eq!(flow.state(), AuthState::Authenticated);
}

// ── Test 5: rejected OTP ───────────────────────────────────────────────────

#[test]
fn test_wrong_otp_fails_the_step() {
    let bank = SimBank::new(SimConfig::default());
    let store = MemoryStore::new();
    let session = Session::new(&store);
    common::provision(&session);
    let driver = StepDriver::new(&bank, session);
    let secrets = Credentials {
        otp: Some("000000".to_string()),
        password: Some(PASSWORD.to_string()),
    };

    let mut flow = AuthFlow::new(&driver, &secrets);
    let err = flow
        .run("+380501234567", &json!("iosReleaseDevice"))
        .expect_err("wrong otp must fail");

    match err {
        HarnessError::StepFailed { step, status, .. } => {
            assert_eq!(step, "auth/otp");
            assert_eq!(status, 400);
        }
        other => panic!("expected StepFailed, got {other:?}"),
    }
    assert_eq!(flow.state(), AuthState::RequiresOtp);
}

// ── Test 6: OTP asked twice ────────────────────────────────────────────────

#[test]
fn test_repeated_request_otp_is_an_unexpected_transition() {
    let bank = SimBank::new(SimConfig {
        after_otp: Some("requestOtp"),
        ..SimConfig::default()
    });
    let store = MemoryStore::new();
    let session = Session::new(&store);
    common::provision(&session);
    let driver = StepDriver::new(&bank, session);
    let secrets = credentials();

    let err = AuthFlow::new(&driver, &secrets)
        .run("+380501234567", &json!("iosReleaseDevice"))
        .expect_err("a second OTP request is not supported");
    assert!(matches!(err, HarnessError::UnexpectedTransition { .. }));
}

// ── Test 7: challenge not renewed ──────────────────────────────────────────

#[test]
fn test_missing_challenge_stops_the_next_protected_step() {
    let bank = SimBank::new(SimConfig {
        no_challenge_on: vec!["/auth/v4/nextstep"],
        ..SimConfig::default()
    });
    let store = MemoryStore::new();
    let session = Session::new(&store);
    common::provision(&session);
    let driver = StepDriver::new(&bank, session);
    let secrets = credentials();

    let err = AuthFlow::new(&driver, &secrets)
        .run("+380501234567", &json!("iosReleaseDevice"))
        .expect_err("no challenge to answer");
    assert!(matches!(err, HarnessError::KeyNotFound(SessionKey::Cryptogram)));
    // Nothing was sent after nextstep.
    assert_eq!(bank.paths().len(), 2);
}

// ── Test 8: not provisioned ────────────────────────────────────────────────

#[test]
fn test_start_without_keys_sends_nothing() {
    let bank = SimBank::new(SimConfig::default());
    let store = MemoryStore::new();
    let driver = StepDriver::new(&bank, Session::new(&store));
    let secrets = credentials();

    let err = AuthFlow::new(&driver, &secrets)
        .run("+380501234567", &json!("iosReleaseDevice"))
        .expect_err("keys not loaded");
    assert!(matches!(err, HarnessError::KeyNotFound(SessionKey::ClientPublicKey)));
    assert!(bank.requests.borrow().is_empty());
}
