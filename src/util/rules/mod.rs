pub mod defaults;
mod fingerprint;
mod model;

pub use fingerprint::{cache_key_for_url, compute_rule_set_fingerprint};
pub use model::*;
