use std::path::PathBuf;

use thiserror::Error;

use crate::handshake::{AuthEvent, AuthState};
use crate::session::SessionKey;

/// Failures of the RSA envelope engine. Always fatal to the current step.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid {kind} key PEM: {reason}")]
    InvalidKey { kind: &'static str, reason: String },

    #[error("value is not valid base64")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("cryptogram is {actual} bytes, key modulus is {expected} bytes")]
    CiphertextSize { expected: usize, actual: usize },

    #[error("payload is {len} bytes, OAEP capacity for this key is {capacity} bytes")]
    PayloadTooLarge { len: usize, capacity: usize },

    #[error("OAEP decryption failed (wrong key or corrupted cryptogram)")]
    Decrypt(#[source] rsa::Error),

    #[error("OAEP encryption failed")]
    Encrypt(#[source] rsa::Error),

    #[error("PSS signing failed")]
    Sign(#[source] rsa::Error),

    #[error("signature verification failed")]
    Verify(#[source] rsa::Error),

    #[error("decrypted challenge is not valid UTF-8")]
    NonUtf8Plaintext(#[from] std::string::FromUtf8Error),

    #[error("failed to serialize payload to JSON")]
    Serialize(#[source] serde_json::Error),
}

/// Failures of the session persistence layer. Absent keys are not errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("session store I/O failed at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session store file {} is not a JSON object", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to (de)serialize session value for key '{key}'")]
    Value {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{backend} session backend failed")]
    Backend {
        backend: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("session store '{0}' is not supported by this build")]
    Unsupported(String),

    #[error("cannot determine a default location for the session store")]
    NoDefaultLocation,
}

/// Top-level error for the handshake, the step driver and the workflows.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("session key '{0}' is not set; an earlier step did not run or failed")]
    KeyNotFound(SessionKey),

    #[error("{step} returned status {status}: {body}")]
    StepFailed {
        step: &'static str,
        status: u16,
        body: String,
    },

    #[error("{step} response has no '{field}' field")]
    MissingField {
        step: &'static str,
        field: &'static str,
    },

    #[error("{step} response has an unexpected shape")]
    Decode {
        step: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected auth transition {event:?} in state {state:?}")]
    UnexpectedTransition { state: AuthState, event: AuthEvent },

    #[error("no {0} configured for this environment")]
    MissingCredential(&'static str),

    #[error("no card named '{0}' in card accounts")]
    CardNotFound(String),

    #[error("request to {path} failed")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}
