use owo_colors::{OwoColorize, Stream::Stdout};

use mbank_e2e::flows::{payments::TopUp, NoBrowser, Payments, StepDriver};
use mbank_e2e::session::{Session, SessionKey};
use mbank_e2e::util::random_amount;

use super::{Context, PromptingSecrets};
use crate::cli::TopupArgs;

pub fn run_topup(ctx: &Context, args: &TopupArgs) -> anyhow::Result<()> {
    let env = ctx.environment()?;
    let data = ctx.test_data()?;
    let Some(phone_number) = args.phone.clone().or(data.recipient_mobile_multi.clone()) else {
        anyhow::bail!("No phone number: pass --phone or set recipientMobileMulti in data.json");
    };

    let transport = ctx.transport(&env)?;
    let backend = ctx.open_store()?;
    let session = Session::new(backend.as_ref());
    let driver = StepDriver::new(&transport, session).with_pacing(data.step_delay());
    let secrets = PromptingSecrets::new(&env);
    let payments = Payments::new(&driver, &secrets, &NoBrowser);

    if driver.session().get::<serde_json::Value>(SessionKey::CardAccounts)?.is_none() {
        payments.fetch_cards()?;
    }
    payments.select_payer_card(&data.payer_card_name)?;

    let outcome = payments.mobile_top_up(&TopUp {
        phone_number: phone_number.clone(),
        amount: random_amount(),
    })?;
    println!(
        "{} Topped up {} with {}",
        "✓".if_supports_color(Stdout, |t| t.green()),
        phone_number,
        outcome.amount.if_supports_color(Stdout, |t| t.cyan())
    );

    if args.save_template {
        payments.save_top_up_template(&format!("Top-up, {phone_number}"))?;
        println!("{} Saved as template", "✓".if_supports_color(Stdout, |t| t.green()));
    }
    Ok(())
}
