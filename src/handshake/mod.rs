//! Handshake module: the challenge pass.
//!
//! Every protected call answers the server's last challenge. The client
//! decrypts the most recent cryptogram with its private key, merges the
//! recovered plaintext into the outbound payload as `challengePass`, then
//! encrypts the payload for the server and signs the result.
//!
//! Where the inputs come from is abstracted behind [`KeySource`]: either the
//! session store ([`SessionKeys`]) or explicit values ([`GivenKeys`]).

mod state;

use serde_json::{Map, Value};
use zeroize::Zeroizing;

use crate::crypto::{self, Envelope};
use crate::error::HarnessError;
use crate::session::{Session, SessionKey};

pub use state::{AuthEvent, AuthState, NextStep};

/// Field name the server expects the recovered challenge under.
pub const CHALLENGE_PASS_FIELD: &str = "challengePass";

/// Inputs for one challenge response.
pub struct KeyMaterial {
    /// Base64 cryptogram most recently received from the server.
    pub cryptogram: String,
    pub client_private_key: Zeroizing<String>,
    pub server_public_key: String,
}

/// Supplies the cryptogram and keys a challenge response needs.
pub trait KeySource {
    fn key_material(&self) -> Result<KeyMaterial, HarnessError>;
}

/// Reads the last cryptogram and both keys from the session.
pub struct SessionKeys<'a> {
    session: &'a Session<'a>,
}

impl<'a> SessionKeys<'a> {
    pub fn new(session: &'a Session<'a>) -> Self {
        Self { session }
    }
}

impl KeySource for SessionKeys<'_> {
    fn key_material(&self) -> Result<KeyMaterial, HarnessError> {
        let cryptogram = self.session.cryptogram()?;
        let client_private_key: Zeroizing<String> =
            Zeroizing::new(self.session.require(SessionKey::ClientPrivateKey)?);
        let server_public_key: String = self.session.require(SessionKey::ServerPublicKey)?;
        Ok(KeyMaterial {
            cryptogram,
            client_private_key,
            server_public_key,
        })
    }
}

/// Explicit values, for callers that already hold the keys.
pub struct GivenKeys {
    pub cryptogram: String,
    pub client_private_key: Zeroizing<String>,
    pub server_public_key: String,
}

impl KeySource for GivenKeys {
    fn key_material(&self) -> Result<KeyMaterial, HarnessError> {
        Ok(KeyMaterial {
            cryptogram: self.cryptogram.clone(),
            client_private_key: self.client_private_key.clone(),
            server_public_key: self.server_public_key.clone(),
        })
    }
}

/// Recover the challenge pass from a cryptogram addressed to the client.
pub fn challenge_pass(cryptogram: &str, client_private_key: &str) -> Result<String, HarnessError> {
    Ok(crypto::decrypt_to_string(cryptogram, client_private_key)?)
}

/// Answer the current challenge, carrying `extra_fields` along.
///
/// The payload is `extra_fields` plus `challengePass`. A caller-supplied
/// `challengePass` is replaced by the decrypted value. Any crypto failure is
/// returned as-is; nothing is sent with a partially built envelope.
pub fn challenge_respond<K: KeySource + ?Sized>(
    keys: &K,
    extra_fields: Map<String, Value>,
) -> Result<Envelope, HarnessError> {
    let material = keys.key_material()?;
    let pass = challenge_pass(&material.cryptogram, &material.client_private_key)?;

    let mut payload = extra_fields;
    payload.insert(CHALLENGE_PASS_FIELD.to_string(), Value::String(pass));

    Ok(crypto::encrypt_and_sign(
        &payload,
        &material.server_public_key,
        &material.client_private_key,
    )?)
}
