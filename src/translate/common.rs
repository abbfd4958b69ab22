use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::warn;

use crate::error::SourceError;

const USER_AGENT: &str = concat!("medtranslate/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP plumbing for the network sources
pub struct HttpBase {
    pub client: Client,
    /// Short name used in error messages
    pub name: &'static str,
}

impl HttpBase {
    pub fn new(name: &'static str) -> Self {
        // per-call timeouts come from the request's config snapshot
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                warn!("Failed to build HTTP client for {}: {}, using defaults", name, e);
                Client::new()
            });

        Self { client, name }
    }

    pub fn with_client(name: &'static str, client: Client) -> Self {
        Self { client, name }
    }

    /// Map a transport-level failure onto the typed kinds.
    pub fn request_error(&self, error: &reqwest::Error, timeout: Duration) -> SourceError {
        if error.is_timeout() {
            SourceError::timeout(format!(
                "{} did not answer within {}ms",
                self.name,
                timeout.as_millis()
            ))
        } else if error.is_decode() || error.is_body() {
            SourceError::invalid_response(format!("{} sent an unreadable body: {}", self.name, error))
        } else {
            SourceError::unreachable(format!("{} request failed: {}", self.name, error))
        }
    }

    /// Map a non-success HTTP status onto the typed kinds.
    pub fn status_error(&self, status: StatusCode, body: &str) -> SourceError {
        let snippet: String = body.chars().take(200).collect();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SourceError::unauthenticated(
                format!("{} rejected the credentials ({}): {}", self.name, status, snippet),
            ),
            StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => SourceError::unreachable(format!(
                "{} is unavailable ({}): {}",
                self.name, status, snippet
            )),
            _ => SourceError::invalid_response(format!(
                "{} API error {}: {}",
                self.name, status, snippet
            )),
        }
    }
}

/// Join a base URL and a path without doubling slashes.
pub fn join_url(endpoint: &str, path: &str) -> String {
    format!(
        "{}/{}",
        endpoint.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
