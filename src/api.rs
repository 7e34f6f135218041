//! REST interface to the chat backend
//!
//! This module defines the [`ChatApi`] seam the engine consumes and its
//! HTTP implementation over JSON. Per the retry policy, the executor wraps
//! chat list loading, message page loading, directory loading, and
//! read-receipt posting; message sending rides the realtime channel.
//!
//! Malformed or empty list responses are treated as "no data" rather than
//! an error, so a flaky backend can never crash the render tree.

use crate::config::SyncConfig;
use crate::store::{Chat, ChatKind, ChatMessage, DeliveryStatus, DirectoryUser, Presence};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// REST operations the synchronization core consumes.
///
/// Injected into the engine as a trait object so tests can substitute a
/// scripted fake.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// List the current user's chats
    async fn list_chats(&self) -> Result<Vec<Chat>>;

    /// Fetch a page of messages for a chat, newest first up to `limit`,
    /// optionally only those created before `before`
    async fn fetch_messages(
        &self,
        chat_id: &str,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChatMessage>>;

    /// Create (or fetch, if it already exists) the direct-message chat
    /// with the given peer
    async fn create_dm(&self, peer_user_id: &str) -> Result<Chat>;

    /// Post a read marker for a chat
    async fn mark_read(&self, chat_id: &str) -> Result<()>;

    /// Fetch the directory entries for a chat's participants
    async fn fetch_chat_users(&self, chat_id: &str) -> Result<Vec<DirectoryUser>>;

    /// Fetch the general user directory (fallback when the chat-scoped
    /// call fails)
    async fn fetch_directory(&self) -> Result<Vec<DirectoryUser>>;
}

/// Chat payload as the backend serves it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatDto {
    /// Chat identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Direct message or group
    pub kind: ChatKind,
    /// Preview of the most recent message
    #[serde(default)]
    pub last_message: Option<String>,
    /// Timestamp of the most recent message
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    /// Server-computed unread count for the viewer
    #[serde(default)]
    pub unread_count: u32,
    /// Participant user ids
    #[serde(default)]
    pub participants: Vec<String>,
}

impl ChatDto {
    fn into_chat(self) -> Chat {
        Chat {
            id: self.id,
            name: self.name,
            kind: self.kind,
            last_message: self.last_message,
            last_message_at: self.last_message_at,
            unread_count: self.unread_count,
            participants: self.participants,
        }
    }
}

/// Message payload as the backend serves it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDto {
    /// Server-assigned message id
    pub id: String,
    /// Echoed client id, present when this message originated locally
    #[serde(default)]
    pub client_id: Option<String>,
    /// Owning chat id
    pub chat_id: String,
    /// Sender user id
    pub sender_id: String,
    /// Sender display name
    #[serde(default)]
    pub sender_name: String,
    /// Message body
    pub body: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Delivery status, if the backend tracks one
    #[serde(default)]
    pub status: Option<DeliveryStatus>,
}

impl MessageDto {
    fn into_message(self, viewer_id: &str) -> ChatMessage {
        let is_own = self.sender_id == viewer_id;
        ChatMessage {
            id: self.id,
            client_id: self.client_id,
            chat_id: self.chat_id,
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            body: self.body,
            created_at: self.created_at,
            status: self.status.unwrap_or(DeliveryStatus::Delivered),
            is_own,
        }
    }
}

/// Directory entry as the backend serves it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDto {
    /// User identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Contact info, if exposed
    #[serde(default)]
    pub contact: Option<String>,
    /// Current presence
    #[serde(default)]
    pub presence: Presence,
    /// Role tag
    #[serde(default)]
    pub role: Option<String>,
}

impl UserDto {
    fn into_user(self) -> DirectoryUser {
        DirectoryUser {
            id: self.id,
            name: self.name,
            contact: self.contact,
            presence: self.presence,
            role: self.role,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateDmPayload<'a> {
    peer_user_id: &'a str,
}

/// Map an HTTP error status onto the error taxonomy.
///
/// Timeouts, throttling, and server errors are transient; permission and
/// validation failures are final.
fn classify_status(status: StatusCode, detail: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::Permission(format!("status {}: {}", status, detail)),
        408 => Error::Timeout(format!("status {}: {}", status, detail)),
        429 => Error::Api(format!("throttled: {}", detail)),
        400..=499 => Error::Validation(format!("status {}: {}", status, detail)),
        _ => Error::Api(format!("status {}: {}", status, detail)),
    }
}

/// HTTP implementation of [`ChatApi`]
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
    viewer_id: String,
}

impl HttpChatApi {
    /// Create a client for the backend named in `config`
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            viewer_id: config.user_id.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Execute a GET expecting a JSON list; a body that fails to decode is
    /// logged and treated as an empty list.
    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let url = self.url(path);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let response = check_status(response).await?;

        match response.json::<Vec<T>>().await {
            Ok(items) => Ok(items),
            Err(e) => {
                warn!("Malformed response from {}, treating as empty: {}", url, e);
                Ok(Vec::new())
            }
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    Err(classify_status(status, &detail))
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn list_chats(&self) -> Result<Vec<Chat>> {
        let dtos: Vec<ChatDto> = self.get_list("/api/chats").await?;
        Ok(dtos.into_iter().map(ChatDto::into_chat).collect())
    }

    async fn fetch_messages(
        &self,
        chat_id: &str,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChatMessage>> {
        let mut path = format!("/api/chats/{}/messages?limit={}", chat_id, limit);
        if let Some(before) = before {
            path.push_str(&format!("&before={}", before.to_rfc3339()));
        }

        let dtos: Vec<MessageDto> = self.get_list(&path).await?;
        Ok(dtos
            .into_iter()
            .map(|dto| dto.into_message(&self.viewer_id))
            .collect())
    }

    async fn create_dm(&self, peer_user_id: &str) -> Result<Chat> {
        let url = self.url("/api/chats/direct");
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(&CreateDmPayload { peer_user_id })
            .send()
            .await?;
        let response = check_status(response).await?;

        let dto: ChatDto = response.json().await?;
        Ok(dto.into_chat())
    }

    async fn mark_read(&self, chat_id: &str) -> Result<()> {
        let url = self.url(&format!("/api/chats/{}/read", chat_id));
        debug!("POST {}", url);

        let response = self.client.post(&url).send().await?;
        check_status(response).await?;
        Ok(())
    }

    async fn fetch_chat_users(&self, chat_id: &str) -> Result<Vec<DirectoryUser>> {
        let dtos: Vec<UserDto> = self
            .get_list(&format!("/api/chats/{}/users", chat_id))
            .await?;
        Ok(dtos.into_iter().map(UserDto::into_user).collect())
    }

    async fn fetch_directory(&self) -> Result<Vec<DirectoryUser>> {
        let dtos: Vec<UserDto> = self.get_list("/api/users").await?;
        Ok(dtos.into_iter().map(UserDto::into_user).collect())
    }
}
