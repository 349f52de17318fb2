//! Discord REST types and client.
//!
//! `ChatApi` is the outbound seam of the system: the orchestrator only ever
//! talks to the platform through it, which lets the lifecycle choreography
//! be tested against a recording double instead of HTTP. `DiscordClient`
//! is the real implementation against the v10 REST API.

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::QueueError;

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Auto-archive duration for requester and review threads: 3 days.
pub const THREAD_AUTO_ARCHIVE_MINUTES: u32 = 4320;

// =============================================================================
// Wire types (inbound subset)
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl User {
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }

    /// CDN avatar URL, when the user has a custom avatar.
    pub fn avatar_url(&self) -> Option<String> {
        self.avatar
            .as_ref()
            .map(|hash| format!("https://cdn.discordapp.com/avatars/{}/{}.png", self.id, hash))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    pub author: User,
    #[serde(default)]
    pub content: String,
    /// Present when the message was posted through a webhook identity
    /// (e.g. a Matrix bridge). Such messages cannot own threads.
    #[serde(default)]
    pub webhook_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadMetadata {
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub thread_metadata: Option<ThreadMetadata>,
}

impl Channel {
    pub fn is_archived(&self) -> bool {
        self.thread_metadata
            .as_ref()
            .map(|m| m.archived)
            .unwrap_or(false)
    }
}

// =============================================================================
// Wire types (outbound)
// =============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ActionRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_reference: Option<MessageReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_mentions: Option<AllowedMentions>,
}

impl CreateMessage {
    pub fn text(content: impl Into<String>) -> Self {
        CreateMessage {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        CreateMessage {
            embeds: vec![embed],
            ..Default::default()
        }
    }

    /// Send as an inline reply to an existing message in the same channel.
    pub fn reply_to(mut self, message_id: &str) -> Self {
        self.message_reference = Some(MessageReference {
            message_id: message_id.to_string(),
        });
        self
    }

    pub fn link_button(mut self, label: &str, url: String) -> Self {
        self.components.push(ActionRow::link_button(label, url));
        self
    }

    /// Suppress all mention side effects: names render but nobody is pinged.
    pub fn suppress_mentions(mut self) -> Self {
        self.allowed_mentions = Some(AllowedMentions { parse: vec![] });
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageReference {
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllowedMentions {
    pub parse: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionRow {
    #[serde(rename = "type")]
    pub kind: u8,
    pub components: Vec<Button>,
}

impl ActionRow {
    pub fn link_button(label: &str, url: String) -> Self {
        ActionRow {
            kind: 1,
            components: vec![Button {
                kind: 2,
                style: 5,
                label: label.to_string(),
                url,
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Button {
    #[serde(rename = "type")]
    pub kind: u8,
    pub style: u8,
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateThread {
    pub name: String,
    pub auto_archive_duration: u32,
}

/// A modal form presented in response to a command interaction.
#[derive(Debug, Clone, Serialize)]
pub struct Modal {
    pub custom_id: String,
    pub title: String,
    pub components: Vec<ModalRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModalRow {
    #[serde(rename = "type")]
    pub kind: u8,
    pub components: Vec<TextInput>,
}

impl ModalRow {
    pub fn input(input: TextInput) -> Self {
        ModalRow {
            kind: 1,
            components: vec![input],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TextInput {
    #[serde(rename = "type")]
    pub kind: u8,
    pub custom_id: String,
    pub label: String,
    /// 1 = single line, 2 = paragraph.
    pub style: u8,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
}

#[derive(Debug, Serialize)]
struct InteractionCallback<T: Serialize> {
    #[serde(rename = "type")]
    kind: u8,
    data: T,
}

#[derive(Debug, Serialize)]
struct InteractionMessage {
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    flags: Option<u64>,
}

const EPHEMERAL_FLAG: u64 = 64;

// =============================================================================
// The outbound seam
// =============================================================================

/// Outbound platform operations used by the lifecycle orchestrator.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn create_message(
        &self,
        channel_id: &str,
        message: &CreateMessage,
    ) -> Result<Message, QueueError>;

    async fn create_thread_from_message(
        &self,
        channel_id: &str,
        message_id: &str,
        thread: &CreateThread,
    ) -> Result<Channel, QueueError>;

    async fn get_channel(&self, channel_id: &str) -> Result<Channel, QueueError>;

    async fn get_message(&self, channel_id: &str, message_id: &str)
        -> Result<Message, QueueError>;

    /// Set a thread's archived flag to true (terminal for our lifecycle).
    async fn archive_thread(&self, channel_id: &str) -> Result<(), QueueError>;

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), QueueError>;

    async fn create_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), QueueError>;

    /// Respond to a command interaction by opening a modal form.
    async fn respond_modal(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        modal: &Modal,
    ) -> Result<(), QueueError>;

    /// Respond to an interaction with a message, optionally caller-only.
    async fn respond_message(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        content: &str,
        ephemeral: bool,
    ) -> Result<(), QueueError>;
}

// =============================================================================
// REST implementation
// =============================================================================

#[derive(Clone)]
pub struct DiscordClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl DiscordClient {
    pub fn new(token: String) -> Self {
        Self::with_base_url(token, DISCORD_API_BASE.to_string())
    }

    pub fn with_base_url(token: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sbqueue/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url,
            token,
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, QueueError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| QueueError::platform("url", e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| QueueError::platform("url", "base url cannot have segments"))?
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("Bot {}", self.token))
    }

    /// Check the status of a platform response, capturing the error body
    /// for the log on failure.
    async fn check(
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, QueueError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(QueueError::platform(
            operation,
            format!("status {status}: {body}"),
        ))
    }

    async fn send_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        operation: &'static str,
        method: reqwest::Method,
        segments: &[&str],
        body: &B,
    ) -> Result<R, QueueError> {
        let url = self.url(segments)?;
        let response = self
            .request(method, url)
            .json(body)
            .send()
            .await
            .map_err(|e| QueueError::platform(operation, e.to_string()))?;
        Self::check(operation, response)
            .await?
            .json::<R>()
            .await
            .map_err(|e| QueueError::platform(operation, format!("malformed response: {e}")))
    }
}

#[async_trait]
impl ChatApi for DiscordClient {
    async fn create_message(
        &self,
        channel_id: &str,
        message: &CreateMessage,
    ) -> Result<Message, QueueError> {
        self.send_json(
            "create_message",
            reqwest::Method::POST,
            &["channels", channel_id, "messages"],
            message,
        )
        .await
    }

    async fn create_thread_from_message(
        &self,
        channel_id: &str,
        message_id: &str,
        thread: &CreateThread,
    ) -> Result<Channel, QueueError> {
        self.send_json(
            "create_thread",
            reqwest::Method::POST,
            &["channels", channel_id, "messages", message_id, "threads"],
            thread,
        )
        .await
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Channel, QueueError> {
        let url = self.url(&["channels", channel_id])?;
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| QueueError::platform("get_channel", e.to_string()))?;
        Self::check("get_channel", response)
            .await?
            .json::<Channel>()
            .await
            .map_err(|e| QueueError::platform("get_channel", format!("malformed response: {e}")))
    }

    async fn get_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Message, QueueError> {
        let url = self.url(&["channels", channel_id, "messages", message_id])?;
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| QueueError::platform("get_message", e.to_string()))?;
        Self::check("get_message", response)
            .await?
            .json::<Message>()
            .await
            .map_err(|e| QueueError::platform("get_message", format!("malformed response: {e}")))
    }

    async fn archive_thread(&self, channel_id: &str) -> Result<(), QueueError> {
        let url = self.url(&["channels", channel_id])?;
        let response = self
            .request(reqwest::Method::PATCH, url)
            .json(&serde_json::json!({ "archived": true }))
            .send()
            .await
            .map_err(|e| QueueError::platform("archive_thread", e.to_string()))?;
        Self::check("archive_thread", response).await?;
        Ok(())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), QueueError> {
        let url = self.url(&["channels", channel_id, "messages", message_id])?;
        let response = self
            .request(reqwest::Method::DELETE, url)
            .send()
            .await
            .map_err(|e| QueueError::platform("delete_message", e.to_string()))?;
        Self::check("delete_message", response).await?;
        Ok(())
    }

    async fn create_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), QueueError> {
        // Url path segments percent-encode the emoji for us.
        let url = self.url(&[
            "channels",
            channel_id,
            "messages",
            message_id,
            "reactions",
            emoji,
            "@me",
        ])?;
        let response = self
            .request(reqwest::Method::PUT, url)
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(|e| QueueError::platform("create_reaction", e.to_string()))?;
        Self::check("create_reaction", response).await?;
        Ok(())
    }

    async fn respond_modal(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        modal: &Modal,
    ) -> Result<(), QueueError> {
        let body = InteractionCallback {
            kind: 9,
            data: modal,
        };
        let url = self.url(&["interactions", interaction_id, interaction_token, "callback"])?;
        let response = self
            .request(reqwest::Method::POST, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| QueueError::platform("respond_modal", e.to_string()))?;
        Self::check("respond_modal", response).await?;
        Ok(())
    }

    async fn respond_message(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        content: &str,
        ephemeral: bool,
    ) -> Result<(), QueueError> {
        let body = InteractionCallback {
            kind: 4,
            data: InteractionMessage {
                content: content.to_string(),
                flags: ephemeral.then_some(EPHEMERAL_FLAG),
            },
        };
        let url = self.url(&["interactions", interaction_id, interaction_token, "callback"])?;
        let response = self
            .request(reqwest::Method::POST, url)
            .json(&body)
            .send()
            .await
            .map_err(|e| QueueError::platform("respond_message", e.to_string()))?;
        Self::check("respond_message", response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_message_serializes_minimal_body() {
        let body = serde_json::to_value(CreateMessage::text("hello")).unwrap();
        assert_eq!(body, serde_json::json!({ "content": "hello" }));
    }

    #[test]
    fn test_reply_reference_and_suppressed_mentions() {
        let message = CreateMessage::text("done").reply_to("42").suppress_mentions();
        let body = serde_json::to_value(message).unwrap();
        assert_eq!(body["message_reference"]["message_id"], "42");
        assert_eq!(body["allowed_mentions"]["parse"], serde_json::json!([]));
    }

    #[test]
    fn test_link_button_component_shape() {
        let message =
            CreateMessage::text("x").link_button("Jump to message", "https://example.com".into());
        let body = serde_json::to_value(message).unwrap();
        let row = &body["components"][0];
        assert_eq!(row["type"], 1);
        assert_eq!(row["components"][0]["type"], 2);
        assert_eq!(row["components"][0]["style"], 5, "link style");
        assert_eq!(row["components"][0]["url"], "https://example.com");
    }

    #[test]
    fn test_avatar_url_only_with_custom_avatar() {
        let user = User {
            id: "1".into(),
            username: "u".into(),
            avatar: Some("abc".into()),
            bot: false,
        };
        assert_eq!(
            user.avatar_url().unwrap(),
            "https://cdn.discordapp.com/avatars/1/abc.png"
        );

        let bare = User {
            id: "1".into(),
            username: "u".into(),
            avatar: None,
            bot: false,
        };
        assert!(bare.avatar_url().is_none());
    }

    #[test]
    fn test_channel_archived_defaults_to_false() {
        let channel: Channel = serde_json::from_value(serde_json::json!({ "id": "5" })).unwrap();
        assert!(!channel.is_archived());

        let archived: Channel = serde_json::from_value(serde_json::json!({
            "id": "5",
            "thread_metadata": { "archived": true }
        }))
        .unwrap();
        assert!(archived.is_archived());
    }
}
