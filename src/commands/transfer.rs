use owo_colors::{OwoColorize, Stream::Stdout};

use mbank_e2e::config::mask_card_number;
use mbank_e2e::flows::payments::{Payer, Transfer};
use mbank_e2e::flows::{AppleScriptBrowser, Browser, NoBrowser, Payments, StepDriver};
use mbank_e2e::session::{Session, SessionKey};
use mbank_e2e::util::random_amount;

use super::{Context, PromptingSecrets};
use crate::cli::TransferArgs;

/// Card-to-card transfer.
///
/// The payer is the hand-entered card from data.json when one is configured,
/// otherwise the named own card. The recipient defaults to that own card.
pub fn run_transfer(ctx: &Context, args: &TransferArgs) -> anyhow::Result<()> {
    let env = ctx.environment()?;
    let data = ctx.test_data()?;

    let transport = ctx.transport(&env)?;
    let backend = ctx.open_store()?;
    let session = Session::new(backend.as_ref());
    let driver = StepDriver::new(&transport, session).with_pacing(data.step_delay());
    let secrets = PromptingSecrets::new(&env);
    let browser: Box<dyn Browser> = if cfg!(target_os = "macos") {
        Box::new(AppleScriptBrowser::new("Safari"))
    } else {
        Box::new(NoBrowser)
    };
    let payments = Payments::new(&driver, &secrets, browser.as_ref());

    if driver.session().get::<serde_json::Value>(SessionKey::CardAccounts)?.is_none() {
        payments.fetch_cards()?;
    }
    let own = payments.select_payer_card(&data.payer_card_name)?;
    let own_number = own
        .primary_card()
        .and_then(|c| c.card_number.clone())
        .ok_or_else(|| anyhow::anyhow!("Card '{}' has no cardNumber", data.payer_card_name))?;

    let payer = match data.manual_payer_card.clone() {
        Some(card) => Payer::Manual(card),
        None => Payer::OwnCard(own_number.clone()),
    };
    let recipient_card_number = args
        .to
        .clone()
        .or(data.recipient_card_number.clone())
        .unwrap_or(own_number);

    let outcome = payments.card_transfer(&Transfer {
        payer,
        recipient_card_number: recipient_card_number.clone(),
        amount: random_amount(),
    })?;
    println!(
        "{} Transferred {} to {}",
        "✓".if_supports_color(Stdout, |t| t.green()),
        outcome.amount.if_supports_color(Stdout, |t| t.cyan()),
        mask_card_number(&recipient_card_number)
    );
    if let Some(url) = &outcome.redirect_url {
        println!(
            "{} 3-D Secure confirmation: {}",
            "!".if_supports_color(Stdout, |t| t.yellow()),
            url
        );
    }

    if let Some(name) = &args.save_card {
        payments.save_card_from_last_payment(name)?;
        println!("{} Saved card as '{}'", "✓".if_supports_color(Stdout, |t| t.green()), name);
    }
    Ok(())
}
