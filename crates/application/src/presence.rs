use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use domain::{ServerEvent, Timestamp, UserId};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::broadcaster::PresenceBroadcaster;
use crate::clock::Clock;
use crate::error::ApplicationError;

/// 单个连接的唯一标识，用于区分同一用户先后建立的连接
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 连接句柄：连接发送队列的非所有权引用，只用于投递事件
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    /// 创建句柄以及连接写任务要消费的接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                id: ConnectionId::generate(),
                sender,
            },
            receiver,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// 投递事件；连接已关闭时返回 false
    pub fn send(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// 在线状态表trait
///
/// 进程内实现见 [`memory::MemoryPresenceRegistry`]；水平扩展时可以换成共享存储，
/// 调用方不需要改动。
#[async_trait::async_trait]
pub trait PresenceRegistry: Send + Sync {
    /// 记录用户上线，覆盖该用户之前的连接映射，并广播 `userOnline`
    async fn register(
        &self,
        user_id: UserId,
        handle: ConnectionHandle,
    ) -> Result<(), ApplicationError>;

    /// 连接断开时调用：移除该用户的映射、记录最后在线时间并广播 `userOffline`。
    /// 即使断开的是已被新连接覆盖的旧连接也照此处理。返回是否移除了映射。
    async fn unregister(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Result<bool, ApplicationError>;

    async fn is_online(&self, user_id: UserId) -> Result<bool, ApplicationError>;

    /// 最后活跃时间，下线后依然保留
    async fn last_seen(&self, user_id: UserId) -> Result<Option<Timestamp>, ApplicationError>;

    async fn connection_of(
        &self,
        user_id: UserId,
    ) -> Result<Option<ConnectionHandle>, ApplicationError>;

    async fn online_user_ids(&self) -> Result<HashSet<UserId>, ApplicationError>;
}

/// 内存实现的在线状态表
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    pub struct MemoryPresenceRegistry {
        connections: RwLock<HashMap<UserId, ConnectionHandle>>,
        last_activity: RwLock<HashMap<UserId, Timestamp>>,
        broadcaster: Arc<dyn PresenceBroadcaster>,
        clock: Arc<dyn Clock>,
    }

    impl MemoryPresenceRegistry {
        pub fn new(broadcaster: Arc<dyn PresenceBroadcaster>, clock: Arc<dyn Clock>) -> Self {
            Self {
                connections: RwLock::new(HashMap::new()),
                last_activity: RwLock::new(HashMap::new()),
                broadcaster,
                clock,
            }
        }

        async fn publish(&self, event: ServerEvent) {
            let name = event.name();
            if let Err(err) = self.broadcaster.publish(event).await {
                tracing::warn!(error = %err, event = name, "在线状态广播失败");
            }
        }
    }

    #[async_trait::async_trait]
    impl PresenceRegistry for MemoryPresenceRegistry {
        async fn register(
            &self,
            user_id: UserId,
            handle: ConnectionHandle,
        ) -> Result<(), ApplicationError> {
            let now = self.clock.now();
            let connection_id = handle.id();
            let previous = self.connections.write().await.insert(user_id, handle);
            self.last_activity.write().await.insert(user_id, now);

            if let Some(previous) = previous {
                tracing::debug!(
                    user_id = %user_id,
                    previous = %previous.id(),
                    "新连接覆盖旧连接"
                );
            }
            tracing::info!(user_id = %user_id, connection_id = %connection_id, "用户上线");

            self.publish(ServerEvent::UserOnline {
                user_id,
                timestamp: now,
            })
            .await;
            Ok(())
        }

        async fn unregister(
            &self,
            user_id: UserId,
            connection_id: ConnectionId,
        ) -> Result<bool, ApplicationError> {
            let removed = self.connections.write().await.remove(&user_id);
            let now = self.clock.now();
            self.last_activity.write().await.insert(user_id, now);

            match &removed {
                Some(current) if current.id() != connection_id => tracing::info!(
                    user_id = %user_id,
                    connection_id = %connection_id,
                    current = %current.id(),
                    "旧连接断开，当前连接映射一并移除"
                ),
                _ => tracing::info!(user_id = %user_id, connection_id = %connection_id, "用户下线"),
            }

            self.publish(ServerEvent::UserOffline {
                user_id,
                timestamp: now,
            })
            .await;
            Ok(removed.is_some())
        }

        async fn is_online(&self, user_id: UserId) -> Result<bool, ApplicationError> {
            Ok(self.connections.read().await.contains_key(&user_id))
        }

        async fn last_seen(&self, user_id: UserId) -> Result<Option<Timestamp>, ApplicationError> {
            Ok(self.last_activity.read().await.get(&user_id).copied())
        }

        async fn connection_of(
            &self,
            user_id: UserId,
        ) -> Result<Option<ConnectionHandle>, ApplicationError> {
            Ok(self.connections.read().await.get(&user_id).cloned())
        }

        async fn online_user_ids(&self) -> Result<HashSet<UserId>, ApplicationError> {
            Ok(self.connections.read().await.keys().copied().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryPresenceRegistry;
    use super::*;
    use crate::broadcaster::LocalPresenceBroadcaster;
    use crate::memory::ManualClock;
    use chrono::Duration;

    fn registry() -> (
        MemoryPresenceRegistry,
        Arc<LocalPresenceBroadcaster>,
        Arc<ManualClock>,
    ) {
        let broadcaster = Arc::new(LocalPresenceBroadcaster::new(16));
        let clock = Arc::new(ManualClock::default());
        let registry = MemoryPresenceRegistry::new(broadcaster.clone(), clock.clone());
        (registry, broadcaster, clock)
    }

    fn user() -> UserId {
        UserId::from(Uuid::new_v4())
    }

    #[tokio::test]
    async fn register_broadcasts_online_and_records_connection() {
        let (registry, broadcaster, clock) = registry();
        let mut events = broadcaster.subscribe();
        let alice = user();
        let (handle, _rx) = ConnectionHandle::channel();

        registry.register(alice, handle.clone()).await.unwrap();

        assert!(registry.is_online(alice).await.unwrap());
        assert_eq!(registry.last_seen(alice).await.unwrap(), Some(clock.now()));
        assert_eq!(
            registry.connection_of(alice).await.unwrap().map(|h| h.id()),
            Some(handle.id())
        );
        assert_eq!(
            events.recv().await.unwrap(),
            ServerEvent::UserOnline {
                user_id: alice,
                timestamp: clock.now()
            }
        );
    }

    #[tokio::test]
    async fn unregister_keeps_last_seen() {
        let (registry, broadcaster, clock) = registry();
        let alice = user();
        let (handle, _rx) = ConnectionHandle::channel();
        registry.register(alice, handle.clone()).await.unwrap();

        let mut events = broadcaster.subscribe();
        clock.advance(Duration::minutes(3));
        assert!(registry.unregister(alice, handle.id()).await.unwrap());

        assert!(!registry.is_online(alice).await.unwrap());
        assert!(registry.connection_of(alice).await.unwrap().is_none());
        assert_eq!(registry.last_seen(alice).await.unwrap(), Some(clock.now()));
        assert_eq!(
            events.recv().await.unwrap(),
            ServerEvent::UserOffline {
                user_id: alice,
                timestamp: clock.now()
            }
        );
    }

    #[tokio::test]
    async fn closing_superseded_connection_still_takes_user_offline() {
        let (registry, broadcaster, clock) = registry();
        let alice = user();
        let (old, _old_rx) = ConnectionHandle::channel();
        let (new, _new_rx) = ConnectionHandle::channel();

        registry.register(alice, old.clone()).await.unwrap();
        registry.register(alice, new.clone()).await.unwrap();
        assert_eq!(
            registry.connection_of(alice).await.unwrap().map(|h| h.id()),
            Some(new.id())
        );

        let mut events = broadcaster.subscribe();
        clock.advance(Duration::seconds(10));
        assert!(registry.unregister(alice, old.id()).await.unwrap());

        assert!(!registry.is_online(alice).await.unwrap());
        assert!(registry.connection_of(alice).await.unwrap().is_none());
        assert_eq!(registry.last_seen(alice).await.unwrap(), Some(clock.now()));
        assert_eq!(
            events.try_recv().unwrap(),
            ServerEvent::UserOffline {
                user_id: alice,
                timestamp: clock.now()
            }
        );
    }

    #[tokio::test]
    async fn unknown_user_has_no_presence() {
        let (registry, _broadcaster, _clock) = registry();
        let nobody = user();
        assert!(!registry.is_online(nobody).await.unwrap());
        assert!(registry.last_seen(nobody).await.unwrap().is_none());
        assert!(!registry
            .unregister(nobody, ConnectionId::generate())
            .await
            .unwrap());
        assert!(registry.last_seen(nobody).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn online_user_ids_lists_connected_users() {
        let (registry, _broadcaster, _clock) = registry();
        let (alice, bob) = (user(), user());
        let (a, _a_rx) = ConnectionHandle::channel();
        let (b, _b_rx) = ConnectionHandle::channel();
        registry.register(alice, a.clone()).await.unwrap();
        registry.register(bob, b).await.unwrap();
        registry.unregister(alice, a.id()).await.unwrap();

        let online = registry.online_user_ids().await.unwrap();
        assert_eq!(online, HashSet::from([bob]));
    }

    #[test]
    fn handle_reports_closed_receiver() {
        let (handle, rx) = ConnectionHandle::channel();
        drop(rx);
        assert!(handle.is_closed());
        assert!(!handle.send(ServerEvent::UserTyping {
            user_id: UserId::from(Uuid::new_v4())
        }));
    }
}
