use crate::config::Config;
use crate::recordings::api::RepositoryError;
use reqwest::{header, Client, ClientBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;

pub fn build_http_client(cfg: &Config) -> Result<Client, reqwest::Error> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("application/json"),
    );

    ClientBuilder::new()
        .user_agent(effective_user_agent(cfg))
        .default_headers(headers)
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .connect_timeout(Duration::from_secs(15))
        .pool_idle_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(cfg.api.timeout_secs.max(1)))
        .build()
}

pub(crate) fn effective_user_agent(cfg: &Config) -> String {
    if cfg.user_agent.trim().is_empty() {
        format!("sessionrec/{}", env!("CARGO_PKG_VERSION"))
    } else {
        cfg.user_agent.clone()
    }
}

/// Pull a human message out of an error body: `error`, then `detail`.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["error", "detail", "message"]
        .iter()
        .filter_map(|k| value.get(*k))
        .find_map(|v| v.as_str().map(str::trim).filter(|s| !s.is_empty()))
        .map(str::to_string)
}

/// Map a non-success response onto the repository taxonomy.
pub fn classify_status(status: StatusCode, body: &str, fallback: &str) -> RepositoryError {
    let message = extract_error_message(body).unwrap_or_else(|| fallback.to_string());
    match status.as_u16() {
        401 | 403 => RepositoryError::Unauthorized {
            status: Some(status.as_u16()),
            message,
        },
        404 => RepositoryError::NotFound(message),
        code => RepositoryError::Transport {
            status: Some(code),
            message,
        },
    }
}
