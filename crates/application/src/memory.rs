//! 内存实现的仓储与协作者（用于测试和本地开发）

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Duration;
use domain::{ChatAccount, Message, MessageId, RepositoryError, Timestamp, UserId};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::clock::Clock;
use crate::notifier::{PushNotification, PushNotifier};
use crate::repository::{AccountDirectory, GeoDistanceProvider, MessageRepository};

/// 创建一个普通账户
pub fn account(display_name: &str) -> ChatAccount {
    ChatAccount {
        id: UserId::from(Uuid::new_v4()),
        display_name: Some(display_name.to_string()),
        is_premium: false,
        premium_expires_at: None,
        is_admin: false,
        is_seeded: false,
        push_token: None,
        created_at: chrono::Utc::now(),
    }
}

/// 手动推进的时钟
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at(chrono::Utc::now())
    }
}

impl ManualClock {
    pub fn at(now: Timestamp) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Default)]
pub struct MemoryMessageRepository {
    messages: RwLock<Vec<Message>>,
    fail_writes: AtomicBool,
}

impl MemoryMessageRepository {
    /// 模拟存储不可用
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn all(&self) -> Vec<Message> {
        self.messages.read().await.clone()
    }

    fn check_writable(&self) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::storage("store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for MemoryMessageRepository {
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError> {
        self.check_writable()?;
        let mut messages = self.messages.write().await;
        if messages.iter().any(|m| m.id() == message.id()) {
            return Err(RepositoryError::Conflict);
        }
        messages.push(message.clone());
        Ok(message)
    }

    async fn count_between(&self, a: UserId, b: UserId) -> Result<u64, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages.iter().filter(|m| m.is_between(a, b)).count() as u64)
    }

    async fn exists_from(&self, sender: UserId, receiver: UserId) -> Result<bool, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .any(|m| m.sender_id() == sender && m.receiver_id() == receiver))
    }

    async fn recent_between(
        &self,
        a: UserId,
        b: UserId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut between: Vec<Message> = messages
            .iter()
            .filter(|m| m.is_between(a, b))
            .cloned()
            .collect();
        between.sort_by_key(|m| m.created_at());
        let skip = between.len().saturating_sub(limit as usize);
        Ok(between.into_iter().skip(skip).collect())
    }

    async fn mark_read_from(
        &self,
        receiver: UserId,
        sender: UserId,
        read_at: Timestamp,
    ) -> Result<u64, RepositoryError> {
        self.check_writable()?;
        let mut messages = self.messages.write().await;
        let mut updated = 0;
        for message in messages
            .iter_mut()
            .filter(|m| m.receiver_id() == receiver && m.sender_id() == sender)
        {
            if message.mark_read(read_at) {
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn mark_read_by_ids(
        &self,
        receiver: UserId,
        ids: &[MessageId],
        read_at: Timestamp,
    ) -> Result<Vec<Message>, RepositoryError> {
        self.check_writable()?;
        let mut messages = self.messages.write().await;
        let mut updated = Vec::new();
        for message in messages
            .iter_mut()
            .filter(|m| m.receiver_id() == receiver && ids.contains(&m.id()))
        {
            if message.mark_read(read_at) {
                updated.push(message.clone());
            }
        }
        Ok(updated)
    }

    async fn unread_count_from(
        &self,
        receiver: UserId,
        sender: UserId,
    ) -> Result<u64, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .filter(|m| m.receiver_id() == receiver && m.sender_id() == sender && !m.is_read())
            .count() as u64)
    }

    async fn latest_per_counterpart(&self, user: UserId) -> Result<Vec<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut latest: HashMap<UserId, Message> = HashMap::new();
        for message in messages.iter() {
            let Some(counterpart) = message.counterpart_of(user) else {
                continue;
            };
            match latest.get(&counterpart) {
                Some(current) if current.created_at() > message.created_at() => {}
                _ => {
                    latest.insert(counterpart, message.clone());
                }
            }
        }
        let mut result: Vec<Message> = latest.into_values().collect();
        result.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(result)
    }
}

#[derive(Default)]
pub struct MemoryAccountDirectory {
    accounts: RwLock<HashMap<UserId, ChatAccount>>,
}

impl MemoryAccountDirectory {
    pub async fn insert(&self, account: ChatAccount) -> ChatAccount {
        self.accounts
            .write()
            .await
            .insert(account.id, account.clone());
        account
    }
}

#[async_trait]
impl AccountDirectory for MemoryAccountDirectory {
    async fn find_by_id(&self, id: UserId) -> Result<Option<ChatAccount>, RepositoryError> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn find_admin(&self) -> Result<Option<ChatAccount>, RepositoryError> {
        let accounts = self.accounts.read().await;
        let mut admins: Vec<&ChatAccount> = accounts.values().filter(|a| a.is_admin).collect();
        admins.sort_by_key(|a| a.created_at);
        Ok(admins.first().map(|a| (*a).clone()))
    }

    async fn find_human_signups_between(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<ChatAccount>, RepositoryError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .filter(|a| !a.is_seeded && !a.is_admin)
            .filter(|a| a.created_at >= from && a.created_at <= to)
            .cloned()
            .collect())
    }
}

/// 固定距离表，未设置的用户对视为缺少位置
#[derive(Default)]
pub struct StaticGeoDistanceProvider {
    distances: Mutex<HashMap<(UserId, UserId), f64>>,
}

impl StaticGeoDistanceProvider {
    pub fn set(&self, a: UserId, b: UserId, miles: f64) {
        let mut distances = self.distances.lock().unwrap_or_else(|e| e.into_inner());
        distances.insert((a, b), miles);
        distances.insert((b, a), miles);
    }
}

#[async_trait]
impl GeoDistanceProvider for StaticGeoDistanceProvider {
    async fn distance_between(&self, a: UserId, b: UserId) -> Result<Option<f64>, RepositoryError> {
        let distances = self.distances.lock().unwrap_or_else(|e| e.into_inner());
        Ok(distances.get(&(a, b)).copied())
    }
}

/// 记录所有推送，便于断言
#[derive(Default)]
pub struct RecordingPushNotifier {
    sent: Mutex<Vec<PushNotification>>,
}

impl RecordingPushNotifier {
    pub fn sent(&self) -> Vec<PushNotification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl PushNotifier for RecordingPushNotifier {
    fn dispatch(&self, notification: PushNotification) {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification);
    }
}
