pub mod auth;
pub mod cards;
pub mod challenge;
pub mod keys;
pub mod session;
pub mod topup;
pub mod transfer;

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::Context as _;
use zeroize::Zeroizing;

use mbank_e2e::config::{self, Environment, TestData};
use mbank_e2e::error::HarnessError;
use mbank_e2e::flows::{Credentials, Secrets};
use mbank_e2e::session::{self as store, SessionStore};
use mbank_e2e::transport::HttpTransport;

use crate::cli::Cli;

/// Global options shared by every command.
pub struct Context {
    pub storage: PathBuf,
    pub environment: String,
    store: Option<String>,
    namespace: Option<String>,
}

impl Context {
    pub fn new(cli: &Cli) -> Self {
        Self {
            storage: cli.storage.clone(),
            environment: cli.environment.clone(),
            store: cli.store.clone(),
            namespace: cli.namespace.clone(),
        }
    }

    pub fn open_store(&self) -> anyhow::Result<Box<dyn SessionStore>> {
        store::open_store(self.store.as_deref(), self.namespace.as_deref())
            .context("Failed to open session store")
    }

    pub fn environment(&self) -> anyhow::Result<Environment> {
        config::load_environment(&self.storage, &self.environment)
    }

    pub fn test_data(&self) -> anyhow::Result<TestData> {
        config::load_test_data(&self.storage)
    }

    pub fn transport(&self, env: &Environment) -> anyhow::Result<HttpTransport> {
        HttpTransport::new(&env.host).with_context(|| format!("Failed to set up client for {}", env.host))
    }
}

/// Configured credentials, falling back to a terminal prompt for missing ones.
pub struct PromptingSecrets {
    configured: Credentials,
}

impl PromptingSecrets {
    pub fn new(env: &Environment) -> Self {
        Self {
            configured: Credentials {
                otp: env.otp.clone(),
                password: env.password.clone(),
            },
        }
    }

    fn prompt(
        what: &'static str,
        label: &str,
        configured: Result<Zeroizing<String>, HarnessError>,
    ) -> Result<Zeroizing<String>, HarnessError> {
        match configured {
            Ok(value) => Ok(value),
            Err(HarnessError::MissingCredential(_)) if std::io::stdin().is_terminal() => {
                dialoguer::Password::new()
                    .with_prompt(label)
                    .interact()
                    .map(Zeroizing::new)
                    .map_err(|e| {
                        tracing::warn!(error = %e, "{} prompt failed", what);
                        HarnessError::MissingCredential(what)
                    })
            }
            Err(e) => Err(e),
        }
    }
}

impl Secrets for PromptingSecrets {
    fn otp(&self) -> Result<Zeroizing<String>, HarnessError> {
        Self::prompt("otp", "One-time code", self.configured.otp())
    }

    fn password(&self) -> Result<Zeroizing<String>, HarnessError> {
        Self::prompt("password", "Account password", self.configured.password())
    }
}
