//! Activity schema — the inbound/outbound message shape, plus conversation references.
//! Field names follow the Bot Framework JSON schema (camelCase).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Activity type ──

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivityType {
    #[default]
    Message,
    ConversationUpdate,
    /// Anything else the channel sends (typing, endOfConversation, ...)
    #[serde(other)]
    Other,
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityType::Message => write!(f, "message"),
            ActivityType::ConversationUpdate => write!(f, "conversationUpdate"),
            ActivityType::Other => write!(f, "other"),
        }
    }
}

// ── Accounts ──

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChannelAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_group: Option<bool>,
}

// ── Conversation reference ──

/// Addressable handle for a conversation endpoint, kept for later delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<ChannelAccount>,
    #[serde(default)]
    pub bot: ChannelAccount,
    #[serde(default)]
    pub conversation: ConversationAccount,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
}

// ── Activity ──

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type", default)]
    pub activity_type: ActivityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default)]
    pub from: ChannelAccount,
    #[serde(default)]
    pub recipient: ChannelAccount,
    #[serde(default)]
    pub conversation: ConversationAccount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members_added: Vec<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members_removed: Vec<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Activity {
    /// A plain message activity from `from` to `recipient` in `conversation_id`.
    pub fn message(
        channel_id: &str,
        conversation_id: &str,
        from: ChannelAccount,
        recipient: ChannelAccount,
        text: &str,
    ) -> Self {
        Self {
            activity_type: ActivityType::Message,
            id: Some(uuid::Uuid::new_v4().to_string()),
            channel_id: channel_id.to_string(),
            from,
            recipient,
            conversation: ConversationAccount {
                id: conversation_id.to_string(),
                ..Default::default()
            },
            text: Some(text.to_string()),
            timestamp: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// A conversationUpdate announcing `members` joined.
    pub fn members_added(
        channel_id: &str,
        conversation_id: &str,
        recipient: ChannelAccount,
        members: Vec<ChannelAccount>,
    ) -> Self {
        Self {
            activity_type: ActivityType::ConversationUpdate,
            id: Some(uuid::Uuid::new_v4().to_string()),
            channel_id: channel_id.to_string(),
            recipient,
            conversation: ConversationAccount {
                id: conversation_id.to_string(),
                ..Default::default()
            },
            members_added: members,
            timestamp: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Build a text reply: accounts swapped, same conversation and channel.
    pub fn create_reply(&self, text: &str) -> Activity {
        Activity {
            activity_type: ActivityType::Message,
            id: Some(uuid::Uuid::new_v4().to_string()),
            channel_id: self.channel_id.clone(),
            service_url: self.service_url.clone(),
            from: self.recipient.clone(),
            recipient: self.from.clone(),
            conversation: self.conversation.clone(),
            text: Some(text.to_string()),
            reply_to_id: self.id.clone(),
            timestamp: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn conversation_reference(&self) -> ConversationReference {
        ConversationReference {
            activity_id: self.id.clone(),
            user: Some(self.from.clone()),
            bot: self.recipient.clone(),
            conversation: self.conversation.clone(),
            channel_id: self.channel_id.clone(),
            service_url: self.service_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_bot_framework_message() {
        let json = r#"{
            "type": "message",
            "id": "act-1",
            "channelId": "emulator",
            "serviceUrl": "http://localhost:50000",
            "from": {"id": "user-1", "name": "User"},
            "recipient": {"id": "bot-1", "name": "Bot"},
            "conversation": {"id": "conv-1"},
            "text": "hello"
        }"#;

        let activity: Activity = serde_json::from_str(json).unwrap();
        assert_eq!(activity.activity_type, ActivityType::Message);
        assert_eq!(activity.channel_id, "emulator");
        assert_eq!(activity.conversation.id, "conv-1");
        assert_eq!(activity.text.as_deref(), Some("hello"));
        assert!(activity.members_added.is_empty());
    }

    #[test]
    fn test_unknown_activity_type_maps_to_other() {
        let json = r#"{"type": "typing", "conversation": {"id": "c"}}"#;
        let activity: Activity = serde_json::from_str(json).unwrap();
        assert_eq!(activity.activity_type, ActivityType::Other);
    }

    #[test]
    fn test_conversation_update_members() {
        let json = r#"{
            "type": "conversationUpdate",
            "channelId": "test",
            "recipient": {"id": "bot"},
            "conversation": {"id": "c1"},
            "membersAdded": [{"id": "user"}, {"id": "bot"}]
        }"#;
        let activity: Activity = serde_json::from_str(json).unwrap();
        assert_eq!(activity.activity_type, ActivityType::ConversationUpdate);
        assert_eq!(activity.members_added.len(), 2);
    }

    #[test]
    fn test_create_reply_swaps_accounts() {
        let inbound = Activity::message(
            "test",
            "c1",
            ChannelAccount::new("user"),
            ChannelAccount::new("bot"),
            "hi",
        );
        let reply = inbound.create_reply("hello back");

        assert_eq!(reply.from.id, "bot");
        assert_eq!(reply.recipient.id, "user");
        assert_eq!(reply.conversation.id, "c1");
        assert_eq!(reply.reply_to_id, inbound.id);
        assert_ne!(reply.id, inbound.id);
        assert_eq!(reply.text.as_deref(), Some("hello back"));
    }

    #[test]
    fn test_conversation_reference_from_activity() {
        let mut inbound = Activity::message(
            "test",
            "c1",
            ChannelAccount::new("user"),
            ChannelAccount::new("bot"),
            "hi",
        );
        inbound.service_url = Some("http://svc".to_string());

        let reference = inbound.conversation_reference();
        assert_eq!(reference.conversation.id, "c1");
        assert_eq!(reference.bot.id, "bot");
        assert_eq!(reference.user.map(|u| u.id).as_deref(), Some("user"));
        assert_eq!(reference.service_url.as_deref(), Some("http://svc"));
    }

    #[test]
    fn test_reply_serializes_camel_case() {
        let inbound = Activity::message(
            "test",
            "c1",
            ChannelAccount::new("user"),
            ChannelAccount::new("bot"),
            "hi",
        );
        let value = serde_json::to_value(inbound.create_reply("ok")).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["channelId"], "test");
        assert!(value.get("replyToId").is_some());
        assert!(value.get("membersAdded").is_none());
    }
}
