//! Static configuration read from the storage directory.
//!
//! `config.json` holds one entry per target environment, `data.json` the
//! fixture data the payment flows need. Both are required: a missing or
//! malformed file is an error naming the file.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

pub const DEFAULT_ENVIRONMENT: &str = "test";
pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(1000);

/// One target environment from `config.json`.
#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub host: String,
    pub phone_number: String,
    #[serde(default)]
    pub otp: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Device descriptor for `auth/start`: either an inline object or the
    /// name of a provisioned device (`iosReleaseDevice`, `iosDebugDevice`).
    pub device: Value,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("host", &self.host)
            .field("phone_number", &self.phone_number)
            .field("otp", &self.otp.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("device", &self.device)
            .finish()
    }
}

/// A payer card entered by hand rather than picked from the card list.
#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ManualCard {
    pub card_number: String,
    pub expiry_date: String,
    pub cvv: String,
}

impl fmt::Debug for ManualCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualCard")
            .field("card_number", &mask_card_number(&self.card_number))
            .field("expiry_date", &self.expiry_date)
            .field("cvv", &"<redacted>")
            .finish()
    }
}

/// `data.json`.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TestData {
    /// `cardName` of the own card used as payer (top-up) or recipient (transfer).
    pub payer_card_name: String,
    #[serde(default)]
    pub recipient_mobile_multi: Option<String>,
    #[serde(default)]
    pub recipient_card_number: Option<String>,
    #[serde(default)]
    pub manual_payer_card: Option<ManualCard>,
    #[serde(default)]
    pub step_delay_ms: Option<u64>,
}

impl TestData {
    /// Pause between payment steps; the API rate-limits rapid sequences.
    pub fn step_delay(&self) -> Duration {
        self.step_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_STEP_DELAY)
    }
}

pub fn config_path(storage: &Path) -> PathBuf {
    storage.join("config.json")
}

pub fn data_path(storage: &Path) -> PathBuf {
    storage.join("data.json")
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load the environment called `name` from `config.json`.
pub fn load_environment(storage: &Path, name: &str) -> anyhow::Result<Environment> {
    let path = config_path(storage);
    let mut environments: BTreeMap<String, Value> = read_json(&path)?;
    let Some(entry) = environments.remove(name) else {
        let known: Vec<&str> = environments.keys().map(String::as_str).collect();
        anyhow::bail!(
            "No environment '{}' in {} (available: {})",
            name,
            path.display(),
            if known.is_empty() { "none".to_string() } else { known.join(", ") }
        );
    };
    let env: Environment = serde_json::from_value(entry)
        .with_context(|| format!("Invalid environment '{}' in {}", name, path.display()))?;
    tracing::debug!(environment = name, host = %env.host, "environment loaded");
    Ok(env)
}

pub fn load_test_data(storage: &Path) -> anyhow::Result<TestData> {
    read_json(&data_path(storage))
}

/// `**** 1234` style rendering for logs and terminal output.
pub fn mask_card_number(number: &str) -> String {
    let digits: Vec<char> = number.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = digits[digits.len() - 4..].iter().collect();
    format!("**** {tail}")
}
