//! GoTrue client for passwordless email login
//!
//! `request_login_link` asks Supabase to email a magic link and one-time code.
//! The code is exchanged with [`GoTrueClient::verify_otp`]; the resulting
//! session is kept in the [`SessionStore`] and refreshed before it expires.

use chatline_core::{AuthProvider, ChatResult, Session, TransportError};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::SupabaseConfig;
use crate::error::{transport, SupabaseError, SupabaseResult};
use crate::http::{build_client, check_status};
use crate::session_store::{AuthUser, SessionStore, StoredSession};

#[derive(Debug, Serialize)]
struct OtpRequest<'a> {
    email: &'a str,
    create_user: bool,
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    email: &'a str,
    token: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Token grant returned by `/verify` and `/token`
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_stored(self, now_secs: i64) -> StoredSession {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| now_secs + secs));
        StoredSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Debug, Clone)]
pub struct GoTrueClient {
    http_client: reqwest::Client,
    config: SupabaseConfig,
    sessions: SessionStore,
}

impl GoTrueClient {
    pub fn new(config: &SupabaseConfig, sessions: SessionStore) -> SupabaseResult<Self> {
        Ok(Self {
            http_client: build_client(config)?,
            config: config.clone(),
            sessions,
        })
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    fn otp_url(&self) -> SupabaseResult<Url> {
        let mut url = self.config.auth_url("otp")?;
        if let Some(redirect_to) = &self.config.redirect_to {
            url.query_pairs_mut().append_pair("redirect_to", redirect_to);
        }
        Ok(url)
    }

    /// Email a login link and one-time code to `email`
    pub async fn send_login_link(&self, email: &str) -> SupabaseResult<()> {
        let response = self
            .http_client
            .post(self.otp_url()?)
            .header("apikey", &self.config.anon_key)
            .json(&OtpRequest {
                email,
                create_user: true,
            })
            .send()
            .await?;
        check_status("Requesting login link", response).await?;
        tracing::info!(email = %email, "Login link sent");
        Ok(())
    }

    /// Exchange the emailed one-time code for a session
    pub async fn verify_otp(&self, email: &str, token: &str) -> SupabaseResult<Session> {
        let response = self
            .http_client
            .post(self.config.auth_url("verify")?)
            .header("apikey", &self.config.anon_key)
            .json(&VerifyRequest {
                kind: "email",
                email,
                token: token.trim(),
            })
            .send()
            .await?;
        let response = check_status("Verifying login code", response).await?;

        let grant: TokenResponse = response.json().await?;
        let stored = grant.into_stored(now_secs());
        let session = stored.to_session();
        self.sessions.set(stored).await?;
        tracing::info!(session = %session, "Login verified");
        Ok(session)
    }

    /// Trade the refresh token for a new access token
    pub async fn refresh(&self) -> SupabaseResult<StoredSession> {
        let current = self
            .sessions
            .get()
            .await
            .ok_or(SupabaseError::NotAuthenticated)?;

        let mut url = self.config.auth_url("token")?;
        url.query_pairs_mut()
            .append_pair("grant_type", "refresh_token");

        let response = self
            .http_client
            .post(url)
            .header("apikey", &self.config.anon_key)
            .json(&RefreshRequest {
                refresh_token: &current.refresh_token,
            })
            .send()
            .await?;
        let response = check_status("Refreshing session", response).await?;

        let grant: TokenResponse = response.json().await?;
        let stored = grant.into_stored(now_secs());
        self.sessions.set(stored.clone()).await?;
        tracing::debug!("Session refreshed");
        Ok(stored)
    }

    /// Ask the server who the stored access token belongs to
    pub async fn fetch_user(&self, access_token: &str) -> SupabaseResult<AuthUser> {
        let response = self
            .http_client
            .get(self.config.auth_url("user")?)
            .header("apikey", &self.config.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;
        let response = check_status("Fetching user", response).await?;
        Ok(response.json().await?)
    }

    /// The confirmed session, refreshed if close to expiry
    ///
    /// A session the server no longer accepts is discarded.
    pub async fn resolve_session(&self) -> SupabaseResult<Option<Session>> {
        let Some(mut stored) = self.sessions.get().await else {
            return Ok(None);
        };

        if stored.is_expiring(now_secs()) {
            match self.refresh().await {
                Ok(refreshed) => stored = refreshed,
                // GoTrue answers 400 for an unknown refresh token
                Err(e) if e.is_unauthorized() || e.status() == Some(400) => {
                    tracing::info!("Stored session was revoked");
                    self.sessions.clear().await?;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }

        match self.fetch_user(&stored.access_token).await {
            Ok(user) => {
                if user != stored.user {
                    stored.user = user;
                    self.sessions.set(stored.clone()).await?;
                }
                Ok(Some(stored.to_session()))
            }
            Err(e) if e.is_unauthorized() => {
                tracing::info!("Stored session is no longer valid");
                self.sessions.clear().await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Revoke the session remotely, then forget it locally
    pub async fn sign_out(&self) -> SupabaseResult<()> {
        let remote = match self.sessions.access_token().await {
            Some(access_token) => self.revoke(&access_token).await,
            None => Ok(()),
        };
        self.sessions.clear().await?;
        remote
    }

    async fn revoke(&self, access_token: &str) -> SupabaseResult<()> {
        let response = self
            .http_client
            .post(self.config.auth_url("logout")?)
            .header("apikey", &self.config.anon_key)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await?;
        check_status("Signing out", response).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AuthProvider for GoTrueClient {
    async fn request_login_link(&self, email: &str) -> ChatResult<()> {
        self.send_login_link(email).await.map_err(|e| {
            transport(e, |reason| TransportError::LoginRequestFailed {
                email: email.to_string(),
                reason,
            })
        })
    }

    async fn current_session(&self) -> ChatResult<Option<Session>> {
        self.resolve_session()
            .await
            .map_err(|e| transport(e, |reason| TransportError::SessionQueryFailed { reason }))
    }

    async fn logout(&self) -> ChatResult<()> {
        self.sign_out()
            .await
            .map_err(|e| transport(e, |reason| TransportError::LogoutFailed { reason }))
    }
}
