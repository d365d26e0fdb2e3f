use owo_colors::{OwoColorize, Stream::Stdout};

use mbank_e2e::flows::{AuthFlow, StepDriver};
use mbank_e2e::session::Session;

use super::{Context, PromptingSecrets};

/// Run the authentication flow against the selected environment.
pub fn run_auth(ctx: &Context) -> anyhow::Result<()> {
    let env = ctx.environment()?;
    let transport = ctx.transport(&env)?;
    let backend = ctx.open_store()?;
    let session = Session::new(backend.as_ref());
    let driver = StepDriver::new(&transport, session);
    let secrets = PromptingSecrets::new(&env);

    let mut flow = AuthFlow::new(&driver, &secrets);
    flow.run(&env.phone_number, &env.device)?;

    println!(
        "{} {} as {} on {}",
        "✓".if_supports_color(Stdout, |t| t.green()),
        flow.state(),
        env.phone_number,
        env.host.if_supports_color(Stdout, |t| t.cyan())
    );
    Ok(())
}
