//! Session commands: list, show and clear stored entries.
use std::io::IsTerminal;

use comfy_table::{Cell, Color, Table};
use owo_colors::{OwoColorize, Stream::Stdout};
use serde_json::Value;

use mbank_e2e::session::{SessionKey, SessionStore};

use super::Context;
use crate::cli::{SessionClearArgs, SessionGetArgs};

pub fn run_list(ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let keys = store.keys()?;
    if keys.is_empty() {
        println!(
            "{}",
            "Session is empty. Run 'mbank-e2e keys load' first."
                .if_supports_color(Stdout, |t| t.yellow())
        );
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Key", "Type", "Preview"]);
    for key in keys {
        let value = store.get_value(&key)?.unwrap_or(Value::Null);
        let secret = SessionKey::from_name(&key).is_some_and(SessionKey::is_secret);
        let name_cell = match SessionKey::from_name(&key) {
            Some(_) => Cell::new(&key).fg(Color::Cyan),
            None => Cell::new(&key),
        };
        table.add_row(vec![
            name_cell,
            Cell::new(type_name(&value)),
            Cell::new(if secret { "<secret>".to_string() } else { preview(&value) }),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub fn run_get(ctx: &Context, args: &SessionGetArgs) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let Some(value) = store.get_value(&args.key)? else {
        anyhow::bail!("Session key '{}' is not set", args.key);
    };

    let secret = SessionKey::from_name(&args.key).is_some_and(SessionKey::is_secret);
    if secret && !args.reveal {
        println!("<secret> (use --reveal to print)");
        return Ok(());
    }
    match value {
        // Print PEMs and tokens raw so they can be piped.
        Value::String(s) => println!("{s}"),
        other => println!("{}", serde_json::to_string_pretty(&other)?),
    }
    Ok(())
}

pub fn run_clear(ctx: &Context, args: &SessionClearArgs) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let targets = clear_targets(store.as_ref(), &args.keys)?;

    if args.keys.is_empty() && !args.yes && !confirm_clear_all()? {
        println!("Aborted.");
        return Ok(());
    }

    let refs: Vec<&str> = targets.iter().map(String::as_str).collect();
    store.delete(&refs)?;
    println!(
        "{} Cleared {} key(s).",
        "✓".if_supports_color(Stdout, |t| t.green()),
        refs.len()
    );
    Ok(())
}

/// The keys to delete: the given ones, or with none given every entry in
/// the store (or namespace), including ones the harness does not know by name.
fn clear_targets(store: &dyn SessionStore, keys: &[String]) -> anyhow::Result<Vec<String>> {
    if keys.is_empty() {
        Ok(store.keys()?)
    } else {
        Ok(keys.to_vec())
    }
}

fn confirm_clear_all() -> anyhow::Result<bool> {
    if !std::io::stdin().is_terminal() {
        eprintln!("Use --yes to clear the whole session in non-interactive mode");
        return Ok(false);
    }
    dialoguer::Confirm::new()
        .with_prompt("Clear every session entry (keys, token, challenge)?")
        .default(false)
        .interact()
        .map_err(|e| anyhow::anyhow!("Confirmation prompt failed: {}", e))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// First line of the compact rendering, at most 48 characters.
fn preview(value: &Value) -> String {
    let rendered = match value {
        Value::String(s) => s.lines().next().unwrap_or_default().to_string(),
        other => other.to_string(),
    };
    if rendered.chars().count() > 48 {
        let head: String = rendered.chars().take(47).collect();
        format!("{head}…")
    } else {
        rendered
    }
}
