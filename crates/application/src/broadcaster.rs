use async_trait::async_trait;
use domain::ServerEvent;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 面向所有连接的广播（在线/离线事件），与在线状态表本身解耦
#[async_trait]
pub trait PresenceBroadcaster: Send + Sync {
    async fn publish(&self, event: ServerEvent) -> Result<(), BroadcastError>;

    fn subscribe(&self) -> broadcast::Receiver<ServerEvent>;
}

// 进程内广播器实现
#[derive(Clone)]
pub struct LocalPresenceBroadcaster {
    sender: broadcast::Sender<ServerEvent>,
}

impl LocalPresenceBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }
}

impl Default for LocalPresenceBroadcaster {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl PresenceBroadcaster for LocalPresenceBroadcaster {
    async fn publish(&self, event: ServerEvent) -> Result<(), BroadcastError> {
        // 没有订阅者时 send 返回错误，这不算失败
        if self.sender.receiver_count() == 0 {
            tracing::debug!(event = event.name(), "没有订阅者，跳过广播");
            return Ok(());
        }
        self.sender
            .send(event)
            .map_err(|err| BroadcastError::failed(err.to_string()))?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }
}
