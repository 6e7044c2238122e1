//! Turn context — one inbound activity plus everything the bot does in reaction to it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::activity::Activity;
use crate::error::Result;
use crate::state::CachedBotState;

/// Outbound delivery seam. The host decides where replies go.
#[async_trait]
pub trait ActivitySender: Send + Sync {
    async fn send(&self, activity: Activity) -> Result<()>;
}

/// Collects replies in memory; the host drains them once the turn finishes.
#[derive(Default)]
pub struct BufferedSender {
    outbox: Mutex<Vec<Activity>>,
}

impl BufferedSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn drain(&self) -> Vec<Activity> {
        std::mem::take(&mut *self.outbox.lock().await)
    }
}

#[async_trait]
impl ActivitySender for BufferedSender {
    async fn send(&self, activity: Activity) -> Result<()> {
        self.outbox.lock().await.push(activity);
        Ok(())
    }
}

/// Per-turn context, passed explicitly to every collaborator call.
pub struct TurnContext {
    activity: Activity,
    sender: Arc<dyn ActivitySender>,
    /// Loaded state partitions, keyed by scope name.
    pub(crate) turn_state: HashMap<String, CachedBotState>,
}

impl TurnContext {
    pub fn new(activity: Activity, sender: Arc<dyn ActivitySender>) -> Self {
        Self {
            activity,
            sender,
            turn_state: HashMap::new(),
        }
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    pub fn conversation_id(&self) -> &str {
        &self.activity.conversation.id
    }

    pub async fn send_activity(&self, activity: Activity) -> Result<()> {
        self.sender.send(activity).await
    }

    /// Send `text` as a reply to the inbound activity.
    pub async fn send_text(&self, text: &str) -> Result<()> {
        let reply = self.activity.create_reply(text);
        self.send_activity(reply).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ChannelAccount;
    use crate::error::BotError;

    struct ClosedSender;

    #[async_trait]
    impl ActivitySender for ClosedSender {
        async fn send(&self, _activity: Activity) -> Result<()> {
            Err(BotError::Delivery("closed".to_string()))
        }
    }

    fn inbound() -> Activity {
        Activity::message(
            "test",
            "c1",
            ChannelAccount::new("user"),
            ChannelAccount::new("bot"),
            "hi",
        )
    }

    #[tokio::test]
    async fn test_send_text_buffers_reply() {
        let sender = Arc::new(BufferedSender::new());
        let ctx = TurnContext::new(inbound(), sender.clone());

        ctx.send_text("one").await.unwrap();
        ctx.send_text("two").await.unwrap();

        let sent = sender.drain().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].text.as_deref(), Some("one"));
        assert_eq!(sent[1].recipient.id, "user");
        assert!(sender.drain().await.is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failure_propagates() {
        let ctx = TurnContext::new(inbound(), Arc::new(ClosedSender));
        let err = ctx.send_text("lost").await.unwrap_err();
        assert!(matches!(err, BotError::Delivery(_)));
    }
}
