use comfy_table::{Cell, Color, Table};

use mbank_e2e::config::mask_card_number;
use mbank_e2e::flows::{Credentials, NoBrowser, Payments, StepDriver};
use mbank_e2e::session::Session;

use super::Context;

/// Fetch the card list, store it, and print one row per card.
pub fn run_cards(ctx: &Context) -> anyhow::Result<()> {
    let env = ctx.environment()?;
    let transport = ctx.transport(&env)?;
    let backend = ctx.open_store()?;
    let driver = StepDriver::new(&transport, Session::new(backend.as_ref()));
    // Listing cards needs neither a password nor a browser.
    let no_secrets = Credentials::default();
    let payments = Payments::new(&driver, &no_secrets, &NoBrowser);

    let accounts = payments.fetch_cards()?;

    let mut table = Table::new();
    table.set_header(vec!["Contract", "Card", "Number", "Id"]);
    for account in &accounts.card_accounts {
        let contract = account
            .contract_id
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();
        for card in &account.cards {
            table.add_row(vec![
                Cell::new(&contract),
                Cell::new(card.card_name.as_deref().unwrap_or("-")).fg(Color::Cyan),
                Cell::new(card.card_number.as_deref().map(mask_card_number).unwrap_or_default()),
                Cell::new(card.id_string()),
            ]);
        }
    }
    println!("{table}");
    Ok(())
}
