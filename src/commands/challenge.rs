use anyhow::Context as _;
use serde_json::{Map, Value};

use mbank_e2e::handshake::{challenge_respond, GivenKeys, KeySource, SessionKeys};
use mbank_e2e::keys::store;
use mbank_e2e::session::Session;

use super::Context;
use crate::cli::ChallengeArgs;

/// Print `{sign, cryptogram}` for the current challenge, for replaying a
/// step by hand.
pub fn run_challenge(ctx: &Context, args: &ChallengeArgs) -> anyhow::Result<()> {
    let extra = parse_fields(&args.fields)?;

    let envelope = match (&args.cryptogram, &args.server_key) {
        (Some(cryptogram), Some(server_key)) => {
            let keys = store::load_keys(&ctx.storage)?;
            let server_public_key = std::fs::read_to_string(server_key)
                .with_context(|| format!("Failed to read {}", server_key.display()))?;
            respond(
                &GivenKeys {
                    cryptogram: cryptogram.clone(),
                    client_private_key: keys.client_private_key,
                    server_public_key,
                },
                extra,
            )?
        }
        _ => {
            let backend = ctx.open_store()?;
            let session = Session::new(backend.as_ref());
            respond(&SessionKeys::new(&session), extra)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

fn respond(
    keys: &dyn KeySource,
    extra: Map<String, Value>,
) -> anyhow::Result<mbank_e2e::crypto::Envelope> {
    challenge_respond(keys, extra).context("Failed to answer the challenge")
}

/// `key=value` pairs. Values are strings unless they look like a JSON
/// object, array or quoted string. OTPs such as `011111` stay strings.
fn parse_fields(raw: &[String]) -> anyhow::Result<Map<String, Value>> {
    raw.iter()
        .map(|pair| -> anyhow::Result<(String, Value)> {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Invalid --field '{}': expected KEY=VALUE", pair))?;
            let looks_like_json = value.starts_with(['{', '[', '"']);
            let value = looks_like_json
                .then(|| serde_json::from_str(value).ok())
                .flatten()
                .unwrap_or_else(|| Value::String(value.to_string()));
            Ok((key.to_string(), value))
        })
        .collect()
}
