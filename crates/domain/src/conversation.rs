//! 会话摘要（派生数据，不单独存储）

use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::value_objects::{Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessagePreview {
    pub content: String,
    pub created_at: Timestamp,
    pub sender_id: UserId,
}

impl From<&Message> for LastMessagePreview {
    fn from(message: &Message) -> Self {
        Self {
            content: message.content().as_str().to_owned(),
            created_at: message.created_at(),
            sender_id: message.sender_id(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPeer {
    pub id: UserId,
    pub display_name: String,
}

/// 某个用户与一位对方之间全部消息的汇总
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// 会话以对方的用户ID标识
    pub id: UserId,
    pub participants: [UserId; 2],
    pub other_user: ConversationPeer,
    pub last_message: LastMessagePreview,
    pub updated_at: Timestamp,
    pub unread_count: u64,
}
