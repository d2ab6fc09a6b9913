use crate::error::{SignalError, SignalResult};
use rand::Rng;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

/// Milliseconds since the Unix epoch, wall clock.
pub fn epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// Prepends `stun:` when the configured url carries no scheme; relay urls are refused.
pub fn add_ice_url_scheme(url: &str) -> SignalResult<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(SignalError::Config("ICE server url cannot be empty".into()));
    }
    if url.starts_with("turn:") || url.starts_with("turns:") {
        return Err(SignalError::Config(format!(
            "relay servers are not supported: {url}"
        )));
    }
    if url.starts_with("stun:") || url.starts_with("stuns:") {
        Ok(url.to_string())
    } else {
        Ok(format!("stun:{url}"))
    }
}
