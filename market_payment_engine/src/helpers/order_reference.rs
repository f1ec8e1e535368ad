use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};

use crate::db_types::OrderReference;

pub const ORDER_REFERENCE_PREFIX: &str = "MPG";
const RANDOM_SUFFIX_LEN: usize = 10;

/// Generates a fresh order reference of the form `MPG-<yyyymmdd>-<10 random alphanumerics>`.
pub fn generate_order_reference(now: DateTime<Utc>) -> OrderReference {
    let suffix = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(char::from)
        .collect::<String>()
        .to_ascii_uppercase();
    OrderReference(format!("{ORDER_REFERENCE_PREFIX}-{}-{suffix}", now.format("%Y%m%d")))
}
