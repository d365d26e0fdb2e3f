/// Keys commands: generate, show and provision the client keypair.
use std::io::IsTerminal;
use std::path::Path;

use owo_colors::{OwoColorize, Stream::Stdout};

use mbank_e2e::keys::{self, fingerprint, store};
use mbank_e2e::session::Session;

use super::Context;
use crate::cli::GenerateArgs;

pub fn run_generate(ctx: &Context, args: &GenerateArgs) -> anyhow::Result<()> {
    let dest = store::keys_path(&ctx.storage);

    if store::keys_exist(&ctx.storage) && !args.yes && !confirm_overwrite(&dest)? {
        println!("Aborted.");
        return Ok(());
    }

    let keys = store::generate_keys()?;
    store::write_keys_atomic(&keys, &dest)?;

    println!(
        "{}",
        "Client keypair generated.".if_supports_color(Stdout, |t| t.green())
    );
    println!();
    println!("Fingerprint: {}", fingerprint::short_fingerprint(&keys.client_public_key)?);
    println!("Key file:    {}", dest.display());
    println!();
    println!("Next: run 'mbank-e2e keys load' to copy it into the session.");
    Ok(())
}

fn confirm_overwrite(existing: &Path) -> anyhow::Result<bool> {
    if !std::io::stdin().is_terminal() {
        eprintln!("Use --yes to confirm overwrite in non-interactive mode");
        return Ok(false);
    }

    // Fingerprint the existing key so the user knows what they are replacing.
    let identifier = std::fs::read_to_string(existing)
        .ok()
        .and_then(|raw| serde_json::from_str::<keys::ClientKeys>(&raw).ok())
        .and_then(|k| fingerprint::short_fingerprint(&k.client_public_key).ok())
        .unwrap_or_else(|| "(unreadable)".to_string());

    dialoguer::Confirm::new()
        .with_prompt(format!(
            "Key {} already exists at {}. Overwrite?",
            identifier,
            existing.display()
        ))
        .default(false)
        .interact()
        .map_err(|e| anyhow::anyhow!("Confirmation prompt failed: {}", e))
}

pub fn run_show(ctx: &Context) -> anyhow::Result<()> {
    let keys = store::load_keys(&ctx.storage)?;
    println!(
        "Fingerprint: {}",
        fingerprint::short_fingerprint(&keys.client_public_key)?
            .if_supports_color(Stdout, |t| t.cyan())
    );
    println!("Key file:    {}", store::keys_path(&ctx.storage).display());
    println!();
    print!("{}", keys.client_public_key);
    Ok(())
}

pub fn run_load(ctx: &Context) -> anyhow::Result<()> {
    let client_keys = store::load_keys(&ctx.storage)?;
    let devices = store::load_devices(&ctx.storage)?;

    let backend = ctx.open_store()?;
    let session = Session::new(backend.as_ref());
    keys::provision(&session, &client_keys, &devices)?;

    println!(
        "{} keys and devices loaded into the session.",
        "✓".if_supports_color(Stdout, |t| t.green())
    );
    Ok(())
}
