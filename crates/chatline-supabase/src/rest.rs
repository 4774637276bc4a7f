//! PostgREST client for the messages table

use chatline_core::{
    AuthorId, ChatResult, Message, MessageId, MessageRepository, TransportError,
};
use serde::Serialize;
use url::Url;

use crate::config::SupabaseConfig;
use crate::error::{transport, SupabaseResult};
use crate::http::{build_client, check_status};
use crate::session_store::SessionStore;

#[derive(Debug, Serialize)]
struct NewMessageRow<'a> {
    content: &'a str,
    user_email: &'a str,
}

/// Row access over the Supabase REST API
///
/// Requests carry the signed-in user's access token when there is one, so
/// row-level security sees the real author.
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    http_client: reqwest::Client,
    table_url: Url,
    anon_key: String,
    sessions: SessionStore,
}

impl PostgrestClient {
    pub fn new(config: &SupabaseConfig, sessions: SessionStore) -> SupabaseResult<Self> {
        Ok(Self {
            http_client: build_client(config)?,
            table_url: config.rest_url()?,
            anon_key: config.anon_key.clone(),
            sessions,
        })
    }

    /// `GET` URL reading every message oldest first
    pub fn list_url(&self) -> Url {
        let mut url = self.table_url.clone();
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("order", "created_at.asc");
        url
    }

    /// `DELETE` URL matching one message
    pub fn delete_url(&self, id: &MessageId) -> Url {
        let mut url = self.table_url.clone();
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{}", id));
        url
    }

    async fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let bearer = self
            .sessions
            .access_token()
            .await
            .unwrap_or_else(|| self.anon_key.clone());
        self.http_client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", bearer))
            .header("Accept", "application/json")
    }

    pub async fn fetch_messages(&self) -> SupabaseResult<Vec<Message>> {
        let url = self.list_url();
        tracing::debug!("Fetching messages from {}", url);

        let response = self.request(reqwest::Method::GET, url).await.send().await?;
        let response = check_status("Fetching messages", response).await?;

        let messages: Vec<Message> = response.json().await?;
        tracing::debug!("Fetched {} messages", messages.len());
        Ok(messages)
    }

    pub async fn create_message(
        &self,
        content: &str,
        author: &AuthorId,
    ) -> SupabaseResult<Option<Message>> {
        let row = NewMessageRow {
            content,
            user_email: author.as_str(),
        };

        let response = self
            .request(reqwest::Method::POST, self.table_url.clone())
            .await
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await?;
        let response = check_status("Inserting message", response).await?;

        let created: Vec<Message> = response.json().await?;
        Ok(created.into_iter().next())
    }

    pub async fn remove_message(&self, id: &MessageId) -> SupabaseResult<()> {
        let response = self
            .request(reqwest::Method::DELETE, self.delete_url(id))
            .await
            .send()
            .await?;
        check_status("Deleting message", response).await?;
        tracing::info!(id = %id, "Message deleted");
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageRepository for PostgrestClient {
    async fn list_messages(&self) -> ChatResult<Vec<Message>> {
        self.fetch_messages()
            .await
            .map_err(|e| transport(e, |reason| TransportError::BulkReadFailed { reason }))
    }

    async fn insert_message(
        &self,
        content: &str,
        author: &AuthorId,
    ) -> ChatResult<Option<Message>> {
        self.create_message(content, author)
            .await
            .map_err(|e| transport(e, |reason| TransportError::InsertFailed { reason }))
    }

    async fn delete_message(&self, id: &MessageId) -> ChatResult<()> {
        self.remove_message(id).await.map_err(|e| {
            transport(e, |reason| TransportError::DeleteFailed {
                id: id.to_string(),
                reason,
            })
        })
    }
}
