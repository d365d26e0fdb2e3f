//! Shared utility functions.

use rand::Rng;

/// A random payment amount in `[1.00, 1.99]`, formatted with two decimals.
///
/// Small and varied, so repeated runs against a live test account do not
/// trip duplicate-payment detection.
pub fn random_amount() -> String {
    amount_from_cents(rand::thread_rng().gen_range(0..=99))
}

fn amount_from_cents(cents: u32) -> String {
    format!("1.{:02}", cents.min(99))
}
