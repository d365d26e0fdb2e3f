use rsa::pkcs8::EncodePublicKey;
use sha2::{Digest, Sha256};

use crate::crypto;
use crate::error::CryptoError;

/// First 8 bytes of SHA-256 over the SPKI DER, as hex.
///
/// Independent of the PEM flavour the key was stored in.
pub fn short_fingerprint(public_key_pem: &str) -> Result<String, CryptoError> {
    let key = crypto::parse_public_key(public_key_pem)?;
    let der = key.to_public_key_der().map_err(|e| CryptoError::InvalidKey {
        kind: "public",
        reason: e.to_string(),
    })?;
    let digest = Sha256::digest(der.as_bytes());
    Ok(digest[..8].iter().map(|b| format!("{b:02x}")).collect())
}
