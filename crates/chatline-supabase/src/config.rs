//! Supabase project configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{SupabaseError, SupabaseResult};

/// Connection settings for one Supabase project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    pub url: String,
    /// Public anonymous API key
    pub anon_key: String,
    /// Schema holding the messages table
    pub schema: String,
    /// Messages table
    pub table: String,
    /// Timeout for REST and auth requests, in seconds
    pub request_timeout_secs: u64,
    /// Realtime heartbeat interval, in seconds
    pub heartbeat_interval_secs: u64,
    /// Where the confirmed session is kept between runs
    pub session_file: Option<PathBuf>,
    /// Page the login link sends the user back to
    pub redirect_to: Option<String>,
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            schema: "public".to_string(),
            table: "messages".to_string(),
            request_timeout_secs: 15,
            heartbeat_interval_secs: 30,
            session_file: None,
            redirect_to: None,
        }
    }
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> SupabaseResult<()> {
        if self.anon_key.trim().is_empty() {
            return Err(SupabaseError::Configuration(
                "anon_key must be set".to_string(),
            ));
        }
        let base = self.base_url()?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(SupabaseError::Configuration(format!(
                "url must be http or https, got {}",
                base.scheme()
            )));
        }
        if self.request_timeout_secs == 0 || self.heartbeat_interval_secs == 0 {
            return Err(SupabaseError::Configuration(
                "timeouts and intervals must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    fn base_url(&self) -> SupabaseResult<Url> {
        if self.url.trim().is_empty() {
            return Err(SupabaseError::Configuration("url must be set".to_string()));
        }
        Ok(Url::parse(self.url.trim_end_matches('/'))?)
    }

    /// PostgREST endpoint for the messages table
    pub fn rest_url(&self) -> SupabaseResult<Url> {
        Ok(self
            .base_url()?
            .join(&format!("rest/v1/{}", self.table))?)
    }

    /// GoTrue endpoint, e.g. `auth_url("otp")`
    pub fn auth_url(&self, endpoint: &str) -> SupabaseResult<Url> {
        Ok(self.base_url()?.join(&format!("auth/v1/{}", endpoint))?)
    }

    /// Realtime websocket endpoint
    pub fn realtime_url(&self) -> SupabaseResult<Url> {
        let mut url = self.base_url()?.join("realtime/v1/websocket")?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme).map_err(|_| {
            SupabaseError::Configuration(format!("cannot use {} for websockets", self.url))
        })?;
        url.query_pairs_mut()
            .append_pair("apikey", &self.anon_key)
            .append_pair("vsn", "1.0.0");
        Ok(url)
    }

    /// Phoenix channel topic for the messages table
    pub fn realtime_topic(&self) -> String {
        format!("realtime:{}:{}", self.schema, self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SupabaseConfig {
        SupabaseConfig::new("https://xyz.supabase.co/", "anon")
    }

    #[test]
    fn test_endpoint_urls() {
        let config = config();
        assert_eq!(
            config.rest_url().unwrap().as_str(),
            "https://xyz.supabase.co/rest/v1/messages"
        );
        assert_eq!(
            config.auth_url("otp").unwrap().as_str(),
            "https://xyz.supabase.co/auth/v1/otp"
        );
        assert_eq!(
            config.realtime_url().unwrap().as_str(),
            "wss://xyz.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
        assert_eq!(config.realtime_topic(), "realtime:public:messages");
    }

    #[test]
    fn test_local_project_uses_plain_websocket() {
        let config = SupabaseConfig::new("http://localhost:54321", "anon");
        assert_eq!(config.realtime_url().unwrap().scheme(), "ws");
    }

    #[test]
    fn test_validation() {
        assert!(config().validate().is_ok());
        assert!(SupabaseConfig::default().validate().is_err());
        assert!(SupabaseConfig::new("ftp://xyz", "anon").validate().is_err());
        assert!(SupabaseConfig::new("https://xyz.supabase.co", " ")
            .validate()
            .is_err());
    }
}
