use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::config::Limits;
use crate::documents::ChatDoc;
use crate::error::{MarketError, MarketResult};
use crate::marketplace::SharedClient;
use crate::records::{ChatMessage, MessageKind};

const SYSTEM_SENDER: &str = "system";

/// The public chat room. Keeps the newest `chat_history_cap` messages.
#[derive(Clone)]
pub struct ChatRoom {
    client: SharedClient,
    limits: Limits,
}

impl ChatRoom {
    pub(crate) fn new(client: SharedClient, limits: Limits) -> Self {
        Self { client, limits }
    }

    /// Post a user message.
    pub async fn send(&self, sender: &str, content: &str) -> MarketResult<ChatMessage> {
        self.post(sender, MessageKind::User, content).await
    }

    /// Post a system notice.
    pub async fn announce(&self, content: &str) -> MarketResult<ChatMessage> {
        self.post(SYSTEM_SENDER, MessageKind::System, content).await
    }

    async fn post(&self, sender: &str, kind: MessageKind, content: &str) -> MarketResult<ChatMessage> {
        let content = content.trim();
        if content.is_empty() {
            return Err(MarketError::EmptyMessage);
        }
        let len = content.chars().count();
        if len > self.limits.max_message_len {
            return Err(MarketError::MessageTooLong {
                len,
                max: self.limits.max_message_len,
            });
        }

        let message = ChatMessage {
            id: Uuid::now_v7(),
            sender: sender.trim().to_string(),
            kind,
            content: content.to_string(),
            time: Utc::now(),
        };
        let dropped = self
            .client
            .append_capped::<ChatDoc, _, _>(message.clone(), self.limits.chat_history_cap, |d| {
                &mut d.messages
            })
            .await?;
        info!(message_id = %message.id, sender = %message.sender, dropped = dropped.len(), "chat message posted");
        Ok(message)
    }

    /// Up to `limit` messages, most recent first.
    pub async fn recent(&self, limit: usize) -> MarketResult<Vec<ChatMessage>> {
        let doc = self.client.load::<ChatDoc>().await?;
        Ok(doc.messages.iter().take(limit).cloned().collect())
    }

    /// Remove every message.
    pub async fn clear(&self) -> MarketResult<usize> {
        let removed = self
            .client
            .update::<ChatDoc, _, MarketError, _>(|doc| {
                let n = doc.messages.len();
                doc.messages.clear();
                Ok(n)
            })
            .await?;
        info!(removed, "chat history cleared");
        Ok(removed)
    }
}

impl std::fmt::Debug for ChatRoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatRoom").field("limits", &self.limits).finish()
    }
}
