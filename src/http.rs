use crate::config::env_parse;
use reqwest::Client;
use std::time::Duration;

pub fn build_client() -> Client {
    let timeout = env_parse::<u64>("HTTP_TIMEOUT_SECS").unwrap_or(15);
    build_client_with_timeout(Duration::from_secs(timeout))
}

/// Client for calls whose deadline is longer than the shared default, such as
/// vision inference.
pub fn build_client_with_timeout(timeout: Duration) -> Client {
    let connect = env_parse::<u64>("HTTP_CONNECT_TIMEOUT_SECS").unwrap_or(5);
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(connect))
        .build()
        .unwrap_or_else(|_| Client::new())
}
