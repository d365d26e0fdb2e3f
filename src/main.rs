mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, KeysCommand, SessionCommand};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ctx = commands::Context::new(&cli);
    match &cli.command {
        Commands::Keys(KeysCommand::Generate(args)) => commands::keys::run_generate(&ctx, args)?,
        Commands::Keys(KeysCommand::Show) => commands::keys::run_show(&ctx)?,
        Commands::Keys(KeysCommand::Load) => commands::keys::run_load(&ctx)?,
        Commands::Auth => commands::auth::run_auth(&ctx)?,
        Commands::Cards => commands::cards::run_cards(&ctx)?,
        Commands::Topup(args) => commands::topup::run_topup(&ctx, args)?,
        Commands::Transfer(args) => commands::transfer::run_transfer(&ctx, args)?,
        Commands::Challenge(args) => commands::challenge::run_challenge(&ctx, args)?,
        Commands::Session(SessionCommand::List) => commands::session::run_list(&ctx)?,
        Commands::Session(SessionCommand::Get(args)) => commands::session::run_get(&ctx, args)?,
        Commands::Session(SessionCommand::Clear(args)) => commands::session::run_clear(&ctx, args)?,
    }

    Ok(())
}
