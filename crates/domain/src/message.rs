//! 私聊消息实体定义

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{MessageContent, MessageId, Timestamp, UserId};

/// 两个用户之间的一条私聊消息
///
/// 不变量：`read_at` 有值当且仅当 `is_read` 为真，且 `read_at >= created_at`。
/// 字段保持私有，只能通过 [`Message::mark_read`] 改变已读状态。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    sender_id: UserId,
    receiver_id: UserId,
    content: MessageContent,
    created_at: Timestamp,
    read_at: Option<Timestamp>,
}

impl Message {
    /// 创建一条新的未读消息
    pub fn new(
        id: MessageId,
        sender_id: UserId,
        receiver_id: UserId,
        content: MessageContent,
        created_at: Timestamp,
    ) -> DomainResult<Self> {
        if sender_id == receiver_id {
            return Err(DomainError::SelfMessaging);
        }
        Ok(Self {
            id,
            sender_id,
            receiver_id,
            content,
            created_at,
            read_at: None,
        })
    }

    /// 从持久化数据恢复
    pub fn restore(
        id: MessageId,
        sender_id: UserId,
        receiver_id: UserId,
        content: MessageContent,
        created_at: Timestamp,
        read_at: Option<Timestamp>,
    ) -> DomainResult<Self> {
        if let Some(read_at) = read_at {
            if read_at < created_at {
                return Err(DomainError::ReadBeforeCreated);
            }
        }
        Ok(Self {
            id,
            sender_id,
            receiver_id,
            content,
            created_at,
            read_at,
        })
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn sender_id(&self) -> UserId {
        self.sender_id
    }

    pub fn receiver_id(&self) -> UserId {
        self.receiver_id
    }

    pub fn content(&self) -> &MessageContent {
        &self.content
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }

    pub fn read_at(&self) -> Option<Timestamp> {
        self.read_at
    }

    /// 标记为已读，已读消息保持首次已读时间不变。返回本次是否发生了变化。
    pub fn mark_read(&mut self, now: Timestamp) -> bool {
        if self.read_at.is_some() {
            return false;
        }
        // 时钟回拨时不能让已读时间早于创建时间
        self.read_at = Some(now.max(self.created_at));
        true
    }

    /// 消息是否属于 `a` 与 `b` 之间的会话（不区分方向）
    pub fn is_between(&self, a: UserId, b: UserId) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }

    /// 对 `user_id` 而言的会话对方
    pub fn counterpart_of(&self, user_id: UserId) -> Option<UserId> {
        if self.sender_id == user_id {
            Some(self.receiver_id)
        } else if self.receiver_id == user_id {
            Some(self.sender_id)
        } else {
            None
        }
    }
}
