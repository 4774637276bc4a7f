//! Persisted auth session
//!
//! Keeps the confirmed GoTrue session in memory and, when a path is
//! configured, in a JSON file so a returning user stays signed in.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chatline_core::{AuthorId, Session};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::SupabaseResult;

/// Seconds before expiry at which a session is refreshed
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Tokens and user returned by a successful sign-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl StoredSession {
    /// Messages are attributed to the email the user signed in with
    pub fn identity(&self) -> AuthorId {
        match &self.user.email {
            Some(email) if !email.is_empty() => AuthorId::from(email.as_str()),
            _ => AuthorId::from(self.user.id.as_str()),
        }
    }

    pub fn to_session(&self) -> Session {
        Session::Authenticated {
            identity: self.identity(),
        }
    }

    pub fn is_expiring(&self, now_secs: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at - EXPIRY_MARGIN_SECS <= now_secs)
    }
}

/// Shared, optionally file-backed session slot
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    current: Arc<RwLock<Option<StoredSession>>>,
    path: Option<PathBuf>,
}

impl SessionStore {
    /// Memory-only store
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the session kept at `path`, if any
    ///
    /// A missing or unreadable file starts signed out.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<StoredSession>(&text) {
                Ok(session) => {
                    debug!(path = %path.display(), "Loaded stored session");
                    Some(session)
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring unreadable session file");
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read session file");
                None
            }
        };

        Self {
            current: Arc::new(RwLock::new(current)),
            path: Some(path),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn get(&self) -> Option<StoredSession> {
        self.current.read().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    pub async fn set(&self, session: StoredSession) -> SupabaseResult<()> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let json = serde_json::to_string_pretty(&session)?;
            tokio::fs::write(path, json).await?;
        }
        *self.current.write().await = Some(session);
        Ok(())
    }

    pub async fn clear(&self) -> SupabaseResult<()> {
        *self.current.write().await = None;
        if let Some(path) = &self.path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
