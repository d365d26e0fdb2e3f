//! Crypto module: the RSA challenge envelope.
//!
//! Outbound payloads are serialized to compact JSON, encrypted with RSA-OAEP
//! under the server's public key and base64-encoded into a *cryptogram*. The
//! raw cryptogram bytes are then hashed with SHA-512 and signed with
//! RSASSA-PSS under the client's private key. Inbound cryptograms are
//! decrypted with RSA-OAEP under the client's private key.
//!
//! The parameters below are fixed by the remote server's verifier. Changing
//! any one of them invalidates every envelope server-side:
//!
//! ```text
//! OAEP: hash SHA-1, MGF1-SHA-1, empty label
//! PSS:  message digest SHA-512, MGF1-SHA-512, salt 64 bytes
//! ```

use base64::Engine;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pss, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha512};

use crate::error::CryptoError;

/// PSS salt length in bytes, equal to the SHA-512 output size.
pub const SIGNATURE_SALT_LEN: usize = 64;

/// OAEP overhead for a SHA-1 hash: two hash lengths plus two marker bytes.
const OAEP_OVERHEAD: usize = 2 * 20 + 2;

/// A signed cryptogram, ready to be merged into a request body.
///
/// Field names match the wire format (`sign`, `cryptogram`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Base64 RSASSA-PSS signature over the raw cryptogram bytes.
    pub sign: String,
    /// Base64 RSA-OAEP ciphertext.
    pub cryptogram: String,
}

fn oaep() -> Oaep {
    Oaep::new::<Sha1>()
}

fn pss() -> Pss {
    Pss::new_with_salt::<Sha512>(SIGNATURE_SALT_LEN)
}

/// Decode base64 the way the server emits it, tolerating embedded line breaks.
fn decode_base64(value: &str) -> Result<Vec<u8>, CryptoError> {
    let compact: String = value.split_whitespace().collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
}

fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Parse an RSA private key from PKCS#8 (`PRIVATE KEY`) or PKCS#1
/// (`RSA PRIVATE KEY`) PEM.
pub fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, CryptoError> {
    let pem = pem.trim();
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| CryptoError::InvalidKey {
            kind: "private",
            reason: e.to_string(),
        })
}

/// Parse an RSA public key from SPKI (`PUBLIC KEY`) or PKCS#1
/// (`RSA PUBLIC KEY`) PEM.
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey, CryptoError> {
    let pem = pem.trim();
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| CryptoError::InvalidKey {
            kind: "public",
            reason: e.to_string(),
        })
}

/// Largest plaintext, in bytes, a single OAEP block can carry under `key`.
pub fn oaep_capacity(key: &RsaPublicKey) -> usize {
    key.size().saturating_sub(OAEP_OVERHEAD)
}

/// Decrypt a base64 cryptogram with the given private key.
///
/// The decoded ciphertext must be exactly one modulus long. Wrong keys and
/// corrupted ciphertexts fail the OAEP padding check and surface as
/// [`CryptoError::Decrypt`]; no partial plaintext is ever returned.
pub fn decrypt(cryptogram: &str, private_key_pem: &str) -> Result<Vec<u8>, CryptoError> {
    let key = parse_private_key(private_key_pem)?;
    let ciphertext = decode_base64(cryptogram)?;
    if ciphertext.len() != key.size() {
        return Err(CryptoError::CiphertextSize {
            expected: key.size(),
            actual: ciphertext.len(),
        });
    }
    key.decrypt(oaep(), &ciphertext).map_err(CryptoError::Decrypt)
}

/// Decrypt a cryptogram whose plaintext must be UTF-8 text, e.g. a challenge.
pub fn decrypt_to_string(cryptogram: &str, private_key_pem: &str) -> Result<String, CryptoError> {
    let plaintext = decrypt(cryptogram, private_key_pem)?;
    Ok(String::from_utf8(plaintext)?)
}

/// OAEP-encrypt raw bytes under the given public key.
///
/// The engine does not chunk: plaintexts above [`oaep_capacity`] are rejected.
pub fn encrypt_bytes(plaintext: &[u8], public_key_pem: &str) -> Result<Vec<u8>, CryptoError> {
    let key = parse_public_key(public_key_pem)?;
    let capacity = oaep_capacity(&key);
    if plaintext.len() > capacity {
        return Err(CryptoError::PayloadTooLarge {
            len: plaintext.len(),
            capacity,
        });
    }
    key.encrypt(&mut rand::thread_rng(), oaep(), plaintext)
        .map_err(CryptoError::Encrypt)
}

/// Serialize `message` to compact JSON and OAEP-encrypt it.
///
/// `serde_json::Map` keeps keys sorted, so equal payloads always produce the
/// same plaintext bytes.
pub fn encrypt<T: Serialize + ?Sized>(
    message: &T,
    public_key_pem: &str,
) -> Result<Vec<u8>, CryptoError> {
    let json = serde_json::to_vec(message).map_err(CryptoError::Serialize)?;
    encrypt_bytes(&json, public_key_pem)
}

/// Sign a base64 cryptogram: SHA-512 over the decoded bytes, then PSS.
///
/// The signature covers the ciphertext exactly as transmitted, never the
/// plaintext payload. PSS is randomized, so two signatures over the same
/// cryptogram differ; both verify.
pub fn sign(cryptogram: &str, private_key_pem: &str) -> Result<String, CryptoError> {
    let key = parse_private_key(private_key_pem)?;
    let bytes = decode_base64(cryptogram)?;
    let digest = Sha512::digest(&bytes);
    let signature = key
        .sign_with_rng(&mut rand::thread_rng(), pss(), &digest)
        .map_err(CryptoError::Sign)?;
    Ok(encode_base64(&signature))
}

/// Verify a signature produced by [`sign`] against the signer's public key.
pub fn verify(cryptogram: &str, signature: &str, public_key_pem: &str) -> Result<(), CryptoError> {
    let key = parse_public_key(public_key_pem)?;
    let bytes = decode_base64(cryptogram)?;
    let signature = decode_base64(signature)?;
    let digest = Sha512::digest(&bytes);
    key.verify(pss(), &digest, &signature)
        .map_err(CryptoError::Verify)
}

/// Encrypt `payload` for the server and sign the resulting cryptogram.
pub fn encrypt_and_sign<T: Serialize + ?Sized>(
    payload: &T,
    server_public_key_pem: &str,
    client_private_key_pem: &str,
) -> Result<Envelope, CryptoError> {
    let ciphertext = encrypt(payload, server_public_key_pem)?;
    let cryptogram = encode_base64(&ciphertext);
    let sign = sign(&cryptogram, client_private_key_pem)?;
    Ok(Envelope { sign, cryptogram })
}
