//! Discord REST transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{ChatTransport, MessageHandle, RecentMessage};
use crate::config::DiscordConfig;
use crate::error::TransportError;
use crate::{RelayError, Result};

/// Discord's per-message character limit.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Discord's page size limit for message history.
const MAX_HISTORY_PAGE: usize = 100;

/// Request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Deserialize)]
struct User {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Message {
    id: String,
    #[serde(default)]
    content: String,
    author: User,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

/// Posts to Discord channels through the REST API with a bot token.
pub struct DiscordTransport {
    client: Client,
    api_base: String,
    token: String,
    self_id: OnceCell<String>,
}

impl DiscordTransport {
    /// Create a transport from the Discord configuration.
    pub fn new(config: &DiscordConfig) -> Result<Self> {
        if config.token.is_empty() {
            return Err(RelayError::Config("Discord token is required".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| RelayError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            self_id: OnceCell::new(),
        })
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token)
    }

    /// ID of the bot user, looked up once.
    async fn self_id(&self) -> std::result::Result<&str, TransportError> {
        let id = self
            .self_id
            .get_or_try_init(|| async {
                let response = self
                    .client
                    .get(format!("{}/users/@me", self.api_base))
                    .header("Authorization", self.auth_header())
                    .send()
                    .await
                    .map_err(|e| TransportError::Request(e.to_string()))?;
                let user: User = check(response)
                    .await?
                    .json()
                    .await
                    .map_err(|e| TransportError::Request(e.to_string()))?;
                debug!(bot_id = %user.id, "Resolved Discord bot identity");
                Ok::<_, TransportError>(user.id)
            })
            .await?;
        Ok(id.as_str())
    }
}

/// Map non-success responses to transport errors.
async fn check(response: Response) -> std::result::Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .json::<RateLimitBody>()
            .await
            .map(|b| retry_after(b.retry_after))
            .unwrap_or(DEFAULT_RETRY_AFTER);
        return Err(TransportError::RateLimited { retry_after });
    }

    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Wait used when a 429 carries no usable `retry_after`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Convert Discord's `retry_after` seconds; values no `Duration` can hold
/// fall back to the default.
fn retry_after(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(DEFAULT_RETRY_AFTER)
}

/// Cut text to Discord's limit on a character boundary.
pub fn truncate_message(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_LENGTH {
        text.to_string()
    } else {
        text.chars().take(MAX_MESSAGE_LENGTH).collect()
    }
}

#[async_trait]
impl ChatTransport for DiscordTransport {
    async fn send_message(
        &self,
        destination_id: &str,
        text: &str,
    ) -> std::result::Result<MessageHandle, TransportError> {
        let response = self
            .client
            .post(format!("{}/channels/{}/messages", self.api_base, destination_id))
            .header("Authorization", self.auth_header())
            .json(&json!({ "content": truncate_message(text) }))
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let message: Message = check(response)
            .await?
            .json()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(MessageHandle {
            destination_id: destination_id.to_string(),
            message_id: message.id,
        })
    }

    async fn fetch_recent_messages(
        &self,
        destination_id: &str,
        limit: usize,
    ) -> std::result::Result<Vec<RecentMessage>, TransportError> {
        let self_id = self.self_id().await?.to_string();
        let limit = limit.clamp(1, MAX_HISTORY_PAGE);

        let response = self
            .client
            .get(format!("{}/channels/{}/messages", self.api_base, destination_id))
            .query(&[("limit", limit)])
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let messages: Vec<Message> = check(response)
            .await?
            .json()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(messages
            .into_iter()
            .map(|m| RecentMessage {
                author_is_self: m.author.id == self_id,
                text: m.content,
            })
            .collect())
    }
}
