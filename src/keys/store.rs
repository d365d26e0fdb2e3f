use anyhow::Context;
use std::io::Write;
use std::path::{Path, PathBuf};

use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;
use zeroize::Zeroizing;

use super::{ClientKeys, Devices};
use crate::crypto;

/// Modulus size for generated client keys.
pub const KEY_BITS: usize = 2048;

pub fn keys_path(storage: &Path) -> PathBuf {
    storage.join("keys.json")
}

pub fn devices_path(storage: &Path) -> PathBuf {
    storage.join("devices.json")
}

pub fn keys_exist(storage: &Path) -> bool {
    keys_path(storage).exists()
}

/// Generate a fresh RSA keypair: PKCS#8 private key, SPKI public key, LF line endings.
pub fn generate_keys() -> anyhow::Result<ClientKeys> {
    let private = RsaPrivateKey::new(&mut rand::thread_rng(), KEY_BITS)
        .context("Failed to generate RSA key")?;
    let client_private_key = private
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| anyhow::anyhow!("Failed to encode private key: {}", e))?;
    let client_public_key = private
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| anyhow::anyhow!("Failed to encode public key: {}", e))?;
    Ok(ClientKeys {
        client_public_key,
        client_private_key,
    })
}

/// Write `keys.json` atomically (temp file then rename) with 0600 permissions.
///
/// The temp file is created owner-only, so the private key is never readable
/// by others, not even between the write and the rename.
pub fn write_keys_atomic(keys: &ClientKeys, dest: &Path) -> anyhow::Result<()> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create {} directory", parent.display()))?;

    let tmp = parent.join(".keys.json.tmp");
    let bytes = Zeroizing::new(
        serde_json::to_vec_pretty(keys).context("Failed to serialize client keys")?,
    );

    let written = open_owner_only(&tmp).and_then(|mut file| {
        file.write_all(&bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to write {}", tmp.display()));
    }

    if let Err(e) = std::fs::rename(&tmp, dest) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to move keys into {}", dest.display()));
    }

    // The destination may have existed with a wider mode.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dest, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set 0600 permissions on {}", dest.display()))?;
    }

    Ok(())
}

#[cfg(unix)]
fn open_owner_only(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_owner_only(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::File::create(path)
}

/// Load `keys.json` from the storage directory.
///
/// Rejects a key file readable by group or others, then checks that the
/// private and public key belong together. A mismatched pair would only
/// surface later as an opaque server-side signature failure.
pub fn load_keys(storage: &Path) -> anyhow::Result<ClientKeys> {
    let path = keys_path(storage);
    if !path.exists() {
        anyhow::bail!(
            "No client keys at {}. Run `mbank-e2e keys generate` or copy keys.json there.",
            path.display()
        );
    }
    check_key_permissions(&path)?;

    let raw = Zeroizing::new(
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
    );
    let keys: ClientKeys = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let private = crypto::parse_private_key(&keys.client_private_key)
        .with_context(|| format!("Invalid clientPrivateKey in {}", path.display()))?;
    let public = crypto::parse_public_key(&keys.client_public_key)
        .with_context(|| format!("Invalid clientPublicKey in {}", path.display()))?;
    if private.to_public_key() != public {
        anyhow::bail!(
            "clientPublicKey and clientPrivateKey in {} are not a keypair",
            path.display()
        );
    }

    tracing::debug!(path = %path.display(), "client keys loaded");
    Ok(keys)
}

/// Load `devices.json` from the storage directory.
pub fn load_devices(storage: &Path) -> anyhow::Result<Devices> {
    let path = devices_path(storage);
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Check that the key file has exactly 0600 permissions (Unix only).
///
/// The error message carries the `chmod 600 <path>` fix.
#[cfg(unix)]
pub fn check_key_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read metadata for {}", path.display()))?;
    let mode = metadata.permissions().mode() & 0o777;
    if mode != 0o600 {
        tracing::warn!(path = %path.display(), mode = format!("{:04o}", mode), "key file too open");
        anyhow::bail!(
            "Key file {} has insecure permissions {:04o} (expected 0600). Fix with: chmod 600 {}",
            path.display(),
            mode,
            path.display()
        );
    }
    Ok(())
}

/// No-op permission check on non-Unix platforms.
#[cfg(not(unix))]
pub fn check_key_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYS_JSON: &str = include_str!("../../tests/fixtures/keys.json");

    fn storage_with_keys(contents: &str, mode: u32) -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = keys_path(dir.path());
        std::fs::write(&path, contents).expect("Failed to write keys.json");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
                .expect("Failed to set permissions");
        }
        #[cfg(not(unix))]
        let _ = mode;
        dir
    }

    #[test]
    fn test_load_keys_accepts_fixture() {
        let dir = storage_with_keys(KEYS_JSON, 0o600);
        let keys = load_keys(dir.path()).expect("load_keys should succeed");
        assert!(keys.client_public_key.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert!(keys.client_private_key.contains("PRIVATE KEY"));
    }

    #[cfg(unix)]
    #[test]
    fn test_load_keys_rejects_0644() {
        let dir = storage_with_keys(KEYS_JSON, 0o644);
        let err = load_keys(dir.path()).expect_err("0644 must be rejected");
        let msg = err.to_string();
        assert!(msg.contains("permissions"), "got: {}", msg);
        assert!(msg.contains("chmod 600"), "got: {}", msg);
    }

    #[test]
    fn test_load_keys_missing_file_names_path() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let err = load_keys(dir.path()).expect_err("no keys.json");
        assert!(err.to_string().contains("keys.json"));
    }

    #[test]
    fn test_load_keys_rejects_mismatched_pair() {
        let mut keys: serde_json::Value = serde_json::from_str(KEYS_JSON).expect("fixture parses");
        keys["clientPublicKey"] =
            serde_json::Value::String(include_str!("../../tests/fixtures/server_public.pem").to_string());
        let dir = storage_with_keys(&keys.to_string(), 0o600);

        let err = load_keys(dir.path()).expect_err("server public key does not match client private key");
        assert!(err.to_string().contains("not a keypair"));
    }

    #[test]
    fn test_load_devices_missing_file_is_error() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let err = load_devices(dir.path()).expect_err("no devices.json");
        assert!(err.to_string().contains("devices.json"));
    }

    #[test]
    fn test_generated_keys_round_trip_through_disk() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let keys = generate_keys().expect("generate_keys should succeed");
        write_keys_atomic(&keys, &keys_path(dir.path())).expect("write should succeed");

        let loaded = load_keys(dir.path()).expect("freshly written keys load");
        assert_eq!(loaded.client_public_key, keys.client_public_key);
        assert_eq!(*loaded.client_private_key, *keys.client_private_key);
        assert!(!dir.path().join(".keys.json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_keys_atomic_tightens_existing_file() {
        use std::os::unix::fs::PermissionsExt;
        let dir = storage_with_keys("{}", 0o644);
        let path = keys_path(dir.path());
        let keys: ClientKeys = serde_json::from_str(KEYS_JSON).expect("fixture parses");

        write_keys_atomic(&keys, &path).expect("write should succeed");

        let mode = std::fs::metadata(&path)
            .expect("Failed to read metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600, "Expected 0600 permissions after atomic write, got {:04o}", mode);
    }
}
