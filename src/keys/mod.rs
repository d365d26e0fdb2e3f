/// Client key material and device descriptors.
///
/// Both live as JSON files in the storage directory and are copied into the
/// session by `keys load` before the first handshake.
pub mod fingerprint;
pub mod store;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use zeroize::Zeroizing;

use crate::error::StoreError;
use crate::session::{Session, SessionKey};

/// `keys.json`: the client's static RSA keypair, PEM encoded.
#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ClientKeys {
    pub client_public_key: String,
    pub client_private_key: Zeroizing<String>,
}

impl fmt::Debug for ClientKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientKeys")
            .field("client_public_key", &self.client_public_key)
            .field("client_private_key", &"<redacted>")
            .finish()
    }
}

/// `devices.json`: device descriptors sent with `auth/start`. Opaque to the
/// harness.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Devices {
    pub ios_release_device: Value,
    pub ios_debug_device: Value,
}

/// Copy the keypair and device descriptors into the session in one batch.
pub fn provision(session: &Session<'_>, keys: &ClientKeys, devices: &Devices) -> Result<(), StoreError> {
    session.put_many(vec![
        (SessionKey::ClientPublicKey, json!(keys.client_public_key)),
        (
            SessionKey::ClientPrivateKey,
            json!(keys.client_private_key.as_str()),
        ),
        (SessionKey::IosReleaseDevice, devices.ios_release_device.clone()),
        (SessionKey::IosDebugDevice, devices.ios_debug_device.clone()),
    ])?;
    tracing::info!("client keys and devices provisioned");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryStore;

    #[test]
    fn test_debug_redacts_private_key() {
        let keys = ClientKeys {
            client_public_key: "PUB".to_string(),
            client_private_key: Zeroizing::new("TOP-SECRET".to_string()),
        };
        let rendered = format!("{keys:?}");
        assert!(rendered.contains("PUB"));
        assert!(!rendered.contains("TOP-SECRET"));
    }

    #[test]
    fn test_provision_writes_all_entries() {
        let store = MemoryStore::new();
        let session = Session::new(&store);
        let keys = ClientKeys {
            client_public_key: "PUB".to_string(),
            client_private_key: Zeroizing::new("PRIV".to_string()),
        };
        let devices: Devices = serde_json::from_str(include_str!("../../tests/fixtures/devices.json"))
            .expect("fixture parses");

        provision(&session, &keys, &devices).expect("provision should succeed");

        let private: String = session.require(SessionKey::ClientPrivateKey).expect("private key");
        assert_eq!(private, "PRIV");
        let release: Value = session.require(SessionKey::IosReleaseDevice).expect("device");
        assert_eq!(release["platform"], "ios");
        let debug: Value = session.require(SessionKey::IosDebugDevice).expect("device");
        assert_eq!(debug["appVersion"], "5.12.0-debug");
    }
}
