//! 客户端与服务端之间的实时事件协议
//!
//! 每一帧都是 `{"event": "<名称>", "data": <载荷>}` 形式的 JSON。

use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::value_objects::{MessageId, Timestamp, UserId};

/// 客户端 -> 服务端
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// 打开与某人的会话，服务端回送历史记录
    JoinChat {
        #[serde(alias = "userId")]
        counterpart_id: UserId,
    },
    SendMessage { receiver_id: UserId, content: String },
    MarkAsRead { message_ids: Vec<MessageId> },
    Typing { receiver_id: UserId },
}

/// 下发给客户端的消息载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub created_at: Timestamp,
    pub is_read: bool,
    pub read_at: Option<Timestamp>,
    pub sender_is_premium: bool,
}

impl MessagePayload {
    pub fn from_message(message: &Message, sender_is_premium: bool) -> Self {
        Self {
            id: message.id(),
            sender_id: message.sender_id(),
            receiver_id: message.receiver_id(),
            content: message.content().as_str().to_owned(),
            created_at: message.created_at(),
            is_read: message.is_read(),
            read_at: message.read_at(),
            sender_is_premium,
        }
    }
}

/// 服务端 -> 客户端
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    MessageHistory(Vec<MessagePayload>),
    /// 收到的新消息
    Message(MessagePayload),
    /// 发送确认，回送给发送者本人
    MessageSent(MessagePayload),
    MessageError {
        error: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        distance: Option<f64>,
    },
    MessagesRead {
        message_ids: Vec<MessageId>,
        read_at: Timestamp,
    },
    UserTyping { user_id: UserId },
    UserOnline { user_id: UserId, timestamp: Timestamp },
    UserOffline { user_id: UserId, timestamp: Timestamp },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::MessageHistory(_) => "messageHistory",
            ServerEvent::Message(_) => "message",
            ServerEvent::MessageSent(_) => "messageSent",
            ServerEvent::MessageError { .. } => "messageError",
            ServerEvent::MessagesRead { .. } => "messagesRead",
            ServerEvent::UserTyping { .. } => "userTyping",
            ServerEvent::UserOnline { .. } => "userOnline",
            ServerEvent::UserOffline { .. } => "userOffline",
        }
    }

    /// 在线状态变化事件所涉及的用户
    pub fn presence_user(&self) -> Option<UserId> {
        match self {
            ServerEvent::UserOnline { user_id, .. } | ServerEvent::UserOffline { user_id, .. } => {
                Some(*user_id)
            }
            _ => None,
        }
    }
}
