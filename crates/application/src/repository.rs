use async_trait::async_trait;
use domain::{ChatAccount, Message, MessageId, RepositoryError, Timestamp, UserId};

#[async_trait]
pub trait MessageRepository: Send + Sync {
    // 保存消息，调用方已经校验过双方账户存在
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError>;

    // 两人之间（任一方向）的消息总数
    async fn count_between(&self, a: UserId, b: UserId) -> Result<u64, RepositoryError>;

    // sender 是否给 receiver 发过消息（单方向）
    async fn exists_from(&self, sender: UserId, receiver: UserId) -> Result<bool, RepositoryError>;

    // 两人之间最近的 limit 条消息，按创建时间升序返回
    async fn recent_between(
        &self,
        a: UserId,
        b: UserId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError>;

    // 把 sender 发给 receiver 的所有未读消息标记为已读，返回受影响条数
    async fn mark_read_from(
        &self,
        receiver: UserId,
        sender: UserId,
        read_at: Timestamp,
    ) -> Result<u64, RepositoryError>;

    // 只标记发给 receiver 且尚未读的指定消息，返回本次真正被标记的消息
    async fn mark_read_by_ids(
        &self,
        receiver: UserId,
        ids: &[MessageId],
        read_at: Timestamp,
    ) -> Result<Vec<Message>, RepositoryError>;

    async fn unread_count_from(
        &self,
        receiver: UserId,
        sender: UserId,
    ) -> Result<u64, RepositoryError>;

    // 用户与每个对方之间的最新一条消息，按时间倒序
    async fn latest_per_counterpart(&self, user: UserId) -> Result<Vec<Message>, RepositoryError>;
}

/// 外部用户服务的只读视图
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<ChatAccount>, RepositoryError>;

    async fn find_admin(&self) -> Result<Option<ChatAccount>, RepositoryError>;

    // 在时间窗口内注册的真人普通用户（排除种子账户和管理员）
    async fn find_human_signups_between(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<ChatAccount>, RepositoryError>;
}

/// 地理距离计算，任一方没有位置时返回 `None`
#[async_trait]
pub trait GeoDistanceProvider: Send + Sync {
    async fn distance_between(&self, a: UserId, b: UserId) -> Result<Option<f64>, RepositoryError>;
}
