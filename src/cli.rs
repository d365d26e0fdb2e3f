use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "mbank-e2e",
    version,
    about = "Drive a mobile-banking API end to end through its RSA challenge/response envelope"
)]
pub struct Cli {
    /// Directory holding config.json, keys.json, devices.json and data.json
    #[arg(long, global = true, env = "MBANK_STORAGE", default_value = "./storage")]
    pub storage: PathBuf,

    /// Environment name in config.json
    #[arg(long = "env", global = true, env = "MBANK_ENV", default_value = "test")]
    pub environment: String,

    /// Session store: a JSON file path or a redis:// URL (default: user cache dir)
    #[arg(long, global = true, env = "MBANK_SESSION_STORE", value_name = "PATH|URL")]
    pub store: Option<String>,

    /// Prefix every session key with `<NAMESPACE>:`
    #[arg(long, global = true, env = "MBANK_SESSION_NAMESPACE")]
    pub namespace: Option<String>,

    /// More log output (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage the client keypair
    #[command(subcommand)]
    Keys(KeysCommand),
    /// Run the authentication flow and store the session token
    Auth,
    /// Fetch the card list and store it in the session
    Cards,
    /// Top up a mobile phone from the payer card
    Topup(TopupArgs),
    /// Card-to-card transfer
    Transfer(TransferArgs),
    /// Print the envelope answering the current challenge
    Challenge(ChallengeArgs),
    /// Inspect or clear the session store
    #[command(subcommand)]
    Session(SessionCommand),
}

#[derive(Subcommand)]
pub enum KeysCommand {
    /// Generate a new 2048-bit client keypair into keys.json
    Generate(GenerateArgs),
    /// Show the client public key fingerprint
    Show,
    /// Copy keys and device descriptors into the session
    Load,
}

#[derive(Args)]
pub struct GenerateArgs {
    /// Skip overwrite confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(Args)]
pub struct TopupArgs {
    /// Phone number to top up (default: recipientMobileMulti from data.json)
    #[arg(long, value_name = "PHONE")]
    pub phone: Option<String>,

    /// Save the payment as a template afterwards
    #[arg(long)]
    pub save_template: bool,
}

#[derive(Args)]
pub struct TransferArgs {
    /// Recipient card number (default: recipientCardNumber from data.json,
    /// then the payer card itself)
    #[arg(long, value_name = "CARD")]
    pub to: Option<String>,

    /// Save the recipient card under this name afterwards
    #[arg(long, value_name = "NAME")]
    pub save_card: Option<String>,
}

#[derive(Args)]
pub struct ChallengeArgs {
    /// Extra payload field, repeatable. `{..}`, `[..]` and `".."` values are JSON.
    #[arg(long = "field", value_name = "KEY=VALUE")]
    pub fields: Vec<String>,

    /// Answer this cryptogram instead of the stored one
    #[arg(long, requires = "server_key")]
    pub cryptogram: Option<String>,

    /// Server public key PEM file to use with --cryptogram
    #[arg(long, value_name = "FILE", requires = "cryptogram")]
    pub server_key: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// List stored keys
    List,
    /// Print one stored value
    Get(SessionGetArgs),
    /// Delete the given keys, or every key the harness uses
    Clear(SessionClearArgs),
}

#[derive(Args)]
pub struct SessionGetArgs {
    #[arg(value_name = "KEY")]
    pub key: String,

    /// Print secret values (private key, token) instead of masking them
    #[arg(long)]
    pub reveal: bool,
}

#[derive(Args)]
pub struct SessionClearArgs {
    #[arg(value_name = "KEY")]
    pub keys: Vec<String>,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}
