/// mbank-e2e library crate: the envelope protocol, session store and API
/// workflows behind the `mbank-e2e` binary.
///
/// Everything is public so that `tests/` can drive the flows against a
/// simulated bank.
pub mod config;
pub mod crypto;
pub mod error;
pub mod flows;
pub mod handshake;
pub mod keys;
pub mod session;
pub mod transport;
pub mod util;
