use std::sync::Arc;

use config::MAX_HISTORY_PAGE;
use domain::{DomainError, Message, MessageContent, MessageId, Timestamp, UserId};

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::repository::{AccountDirectory, MessageRepository};

/// 消息存储：校验、持久化以及已读标记
pub struct MessageStore {
    messages: Arc<dyn MessageRepository>,
    accounts: Arc<dyn AccountDirectory>,
    clock: Arc<dyn Clock>,
    history_limit: u32,
}

impl MessageStore {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        accounts: Arc<dyn AccountDirectory>,
        clock: Arc<dyn Clock>,
        history_limit: u32,
    ) -> Self {
        Self {
            messages,
            accounts,
            clock,
            history_limit: history_limit.clamp(1, MAX_HISTORY_PAGE),
        }
    }

    /// 保存一条新消息，双方账户必须存在
    pub async fn save(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        content: &str,
    ) -> Result<Message, ApplicationError> {
        let content = MessageContent::new(content)?;

        for user_id in [sender_id, receiver_id] {
            if self.accounts.find_by_id(user_id).await?.is_none() {
                return Err(DomainError::AccountNotFound.into());
            }
        }

        let message = Message::new(
            MessageId::generate(),
            sender_id,
            receiver_id,
            content,
            self.clock.now(),
        )?;
        let saved = self.messages.insert(message).await?;

        tracing::debug!(
            message_id = %saved.id(),
            sender_id = %sender_id,
            receiver_id = %receiver_id,
            "消息已保存"
        );
        Ok(saved)
    }

    /// 两人之间最近的消息，按时间升序，最多返回配置的条数（上限 100）
    pub async fn history(
        &self,
        a: UserId,
        b: UserId,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, ApplicationError> {
        let limit = limit
            .unwrap_or(self.history_limit)
            .clamp(1, self.history_limit);
        Ok(self.messages.recent_between(a, b, limit).await?)
    }

    /// 把 `sender` 发给 `receiver` 的全部未读消息标记为已读。重复调用不会改变已读时间。
    pub async fn mark_read_bulk(
        &self,
        receiver_id: UserId,
        sender_id: UserId,
    ) -> Result<u64, ApplicationError> {
        let updated = self
            .messages
            .mark_read_from(receiver_id, sender_id, self.clock.now())
            .await?;
        if updated > 0 {
            tracing::debug!(
                receiver_id = %receiver_id,
                sender_id = %sender_id,
                updated,
                "批量标记已读"
            );
        }
        Ok(updated)
    }

    /// 按ID标记已读。只处理发给 `receiver` 的消息，返回本次新标记的消息和使用的时间戳。
    pub async fn mark_read_by_ids(
        &self,
        receiver_id: UserId,
        ids: &[MessageId],
    ) -> Result<(Vec<Message>, Timestamp), ApplicationError> {
        let read_at = self.clock.now();
        if ids.is_empty() {
            return Ok((Vec::new(), read_at));
        }
        let updated = self
            .messages
            .mark_read_by_ids(receiver_id, ids, read_at)
            .await?;
        Ok((updated, read_at))
    }

    pub async fn unread_count_from(
        &self,
        receiver_id: UserId,
        sender_id: UserId,
    ) -> Result<u64, ApplicationError> {
        Ok(self
            .messages
            .unread_count_from(receiver_id, sender_id)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{account, ManualClock, MemoryAccountDirectory, MemoryMessageRepository};
    use chrono::Duration;
    use uuid::Uuid;

    struct Fixture {
        store: MessageStore,
        messages: Arc<MemoryMessageRepository>,
        accounts: Arc<MemoryAccountDirectory>,
        clock: Arc<ManualClock>,
    }

    fn fixture(history_limit: u32) -> Fixture {
        let messages = Arc::new(MemoryMessageRepository::default());
        let accounts = Arc::new(MemoryAccountDirectory::default());
        let clock = Arc::new(ManualClock::default());
        let store = MessageStore::new(
            messages.clone(),
            accounts.clone(),
            clock.clone(),
            history_limit,
        );
        Fixture {
            store,
            messages,
            accounts,
            clock,
        }
    }

    #[tokio::test]
    async fn save_requires_both_accounts() {
        let fx = fixture(100);
        let alice = fx.accounts.insert(account("Alice")).await;
        let ghost = UserId::from(Uuid::new_v4());

        let err = fx.store.save(alice.id, ghost, "hello").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(fx.messages.all().await.is_empty());
    }

    #[tokio::test]
    async fn save_rejects_blank_and_self_messages() {
        let fx = fixture(100);
        let alice = fx.accounts.insert(account("Alice")).await;
        let bob = fx.accounts.insert(account("Bob")).await;

        assert!(matches!(
            fx.store.save(alice.id, bob.id, "   ").await,
            Err(ApplicationError::Domain(DomainError::InvalidArgument { .. }))
        ));
        assert!(matches!(
            fx.store.save(alice.id, alice.id, "me").await,
            Err(ApplicationError::Domain(DomainError::SelfMessaging))
        ));
    }

    #[tokio::test]
    async fn saved_message_starts_unread() {
        let fx = fixture(100);
        let alice = fx.accounts.insert(account("Alice")).await;
        let bob = fx.accounts.insert(account("Bob")).await;

        let message = fx.store.save(alice.id, bob.id, "hello").await.unwrap();
        assert!(!message.is_read());
        assert_eq!(message.read_at(), None);
        assert_eq!(message.created_at(), fx.clock.now());
    }

    #[tokio::test]
    async fn history_returns_latest_hundred_oldest_first() {
        let fx = fixture(100);
        let alice = fx.accounts.insert(account("Alice")).await;
        let bob = fx.accounts.insert(account("Bob")).await;

        let mut ids = Vec::new();
        for i in 0..150 {
            let (from, to) = if i % 2 == 0 {
                (alice.id, bob.id)
            } else {
                (bob.id, alice.id)
            };
            ids.push(fx.store.save(from, to, &format!("m{i}")).await.unwrap().id());
            fx.clock.advance(Duration::seconds(1));
        }

        let history = fx.store.history(alice.id, bob.id, Some(500)).await.unwrap();
        assert_eq!(history.len(), 100);
        assert_eq!(history.first().unwrap().id(), ids[50]);
        assert_eq!(history.last().unwrap().id(), ids[149]);
        assert!(history
            .windows(2)
            .all(|w| w[0].created_at() <= w[1].created_at()));
    }

    #[tokio::test]
    async fn history_limit_config_is_respected() {
        let fx = fixture(5);
        let alice = fx.accounts.insert(account("Alice")).await;
        let bob = fx.accounts.insert(account("Bob")).await;
        for i in 0..8 {
            fx.store.save(alice.id, bob.id, &format!("m{i}")).await.unwrap();
            fx.clock.advance(Duration::seconds(1));
        }

        let history = fx.store.history(bob.id, alice.id, None).await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history.last().unwrap().content().as_str(), "m7");
    }

    #[tokio::test]
    async fn bulk_read_is_idempotent() {
        let fx = fixture(100);
        let alice = fx.accounts.insert(account("Alice")).await;
        let bob = fx.accounts.insert(account("Bob")).await;
        fx.store.save(alice.id, bob.id, "one").await.unwrap();
        fx.store.save(alice.id, bob.id, "two").await.unwrap();
        fx.store.save(bob.id, alice.id, "mine").await.unwrap();

        fx.clock.advance(Duration::minutes(1));
        let first_read = fx.clock.now();
        assert_eq!(fx.store.mark_read_bulk(bob.id, alice.id).await.unwrap(), 2);

        fx.clock.advance(Duration::minutes(1));
        assert_eq!(fx.store.mark_read_bulk(bob.id, alice.id).await.unwrap(), 0);

        let all = fx.messages.all().await;
        for message in all.iter().filter(|m| m.sender_id() == alice.id) {
            assert_eq!(message.read_at(), Some(first_read));
        }
        // 自己发出的消息不受影响
        assert!(all
            .iter()
            .filter(|m| m.sender_id() == bob.id)
            .all(|m| !m.is_read()));
        assert_eq!(fx.store.unread_count_from(bob.id, alice.id).await.unwrap(), 0);
        assert_eq!(fx.store.unread_count_from(alice.id, bob.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mark_by_ids_ignores_messages_addressed_to_others() {
        let fx = fixture(100);
        let alice = fx.accounts.insert(account("Alice")).await;
        let bob = fx.accounts.insert(account("Bob")).await;
        let to_bob = fx.store.save(alice.id, bob.id, "for bob").await.unwrap();
        let to_alice = fx.store.save(bob.id, alice.id, "for alice").await.unwrap();

        let (updated, _) = fx
            .store
            .mark_read_by_ids(bob.id, &[to_bob.id(), to_alice.id()])
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].id(), to_bob.id());

        let (again, _) = fx
            .store
            .mark_read_by_ids(bob.id, &[to_bob.id()])
            .await
            .unwrap();
        assert!(again.is_empty());
    }
}
