//! Shared HTTP plumbing for the REST and auth clients

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::config::SupabaseConfig;
use crate::error::{SupabaseError, SupabaseResult};

/// Log-safe digest of a response body
pub(crate) fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

pub(crate) fn build_client(config: &SupabaseConfig) -> SupabaseResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()?)
}

/// Pass successful responses through, turn anything else into `Status`
pub(crate) async fn check_status(
    operation: &'static str,
    response: reqwest::Response,
) -> SupabaseResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body_summary = summarize_response_body(&body);
    tracing::error!(status = %status, body_summary = %body_summary, "{} failed", operation);
    Err(SupabaseError::Status {
        operation,
        status: status.as_u16(),
        body_summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_hides_body() {
        let summary = summarize_response_body("{\"secret\":\"token\"}");
        assert!(summary.starts_with("len=18,digest="));
        assert!(!summary.contains("token"));
    }
}
