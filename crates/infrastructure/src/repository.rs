use application::{AccountDirectory, MessageRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    ChatAccount, Message, MessageContent, MessageId, RepositoryError, Timestamp, UserId,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        other => RepositoryError::storage_with_source("database operation failed", other),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, content, is_read, read_at, created_at";

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    content: String,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;
        // 历史数据里可能只有 is_read 没有 read_at
        let read_at = match (value.is_read, value.read_at) {
            (true, Some(read_at)) => Some(read_at.max(value.created_at)),
            (true, None) => Some(value.created_at),
            (false, _) => None,
        };
        Message::restore(
            MessageId::from(value.id),
            UserId::from(value.sender_id),
            UserId::from(value.receiver_id),
            content,
            value.created_at,
            read_at,
        )
        .map_err(|err| invalid_data(err.to_string()))
    }
}

/// 批量转换查询结果：无法还原的行记录日志后跳过，不影响整页数据
fn collect_messages(records: Vec<MessageRecord>) -> Vec<Message> {
    records
        .into_iter()
        .filter_map(|record| {
            let id = record.id;
            match Message::try_from(record) {
                Ok(message) => Some(message),
                Err(err) => {
                    tracing::warn!(message_id = %id, error = %err, "跳过无法解析的消息记录");
                    None
                }
            }
        })
        .collect()
}

#[derive(Debug, FromRow)]
struct AccountRecord {
    id: Uuid,
    display_name: Option<String>,
    is_premium: bool,
    premium_expires_at: Option<DateTime<Utc>>,
    is_admin: bool,
    is_seeded: bool,
    push_token: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<AccountRecord> for ChatAccount {
    fn from(value: AccountRecord) -> Self {
        ChatAccount {
            id: UserId::from(value.id),
            display_name: value.display_name,
            is_premium: value.is_premium,
            premium_expires_at: value.premium_expires_at,
            is_admin: value.is_admin,
            is_seeded: value.is_seeded,
            push_token: value.push_token,
            created_at: value.created_at,
        }
    }
}

const ACCOUNT_SELECT: &str = r#"
    SELECT u.id, p.display_name, u.is_premium, u.premium_expires_at, u.is_admin,
           u.is_seeded, u.push_token, u.created_at
    FROM users u
    LEFT JOIN profiles p ON p.user_id = u.id
"#;

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn insert(&self, message: Message) -> Result<Message, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            INSERT INTO messages (id, sender_id, receiver_id, content, is_read, read_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::from(message.id()))
        .bind(Uuid::from(message.sender_id()))
        .bind(Uuid::from(message.receiver_id()))
        .bind(message.content().as_str())
        .bind(message.is_read())
        .bind(message.read_at())
        .bind(message.created_at())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn count_between(&self, a: UserId, b: UserId) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE (sender_id = $1 AND receiver_id = $2)
               OR (sender_id = $2 AND receiver_id = $1)
            "#,
        )
        .bind(Uuid::from(a))
        .bind(Uuid::from(b))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(count.max(0) as u64)
    }

    async fn exists_from(&self, sender: UserId, receiver: UserId) -> Result<bool, RepositoryError> {
        sqlx::query_scalar(
            r#"SELECT EXISTS(SELECT 1 FROM messages WHERE sender_id = $1 AND receiver_id = $2)"#,
        )
        .bind(Uuid::from(sender))
        .bind(Uuid::from(receiver))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)
    }

    async fn recent_between(
        &self,
        a: UserId,
        b: UserId,
        limit: u32,
    ) -> Result<Vec<Message>, RepositoryError> {
        // 先倒序取最近的 limit 条，再按时间正序返回
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM (
                SELECT {MESSAGE_COLUMNS} FROM messages
                WHERE (sender_id = $1 AND receiver_id = $2)
                   OR (sender_id = $2 AND receiver_id = $1)
                ORDER BY created_at DESC, id DESC
                LIMIT $3
            ) recent
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(Uuid::from(a))
        .bind(Uuid::from(b))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(collect_messages(records))
    }

    async fn mark_read_from(
        &self,
        receiver: UserId,
        sender: UserId,
        read_at: Timestamp,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE, read_at = GREATEST($3, created_at)
            WHERE receiver_id = $1 AND sender_id = $2 AND NOT is_read
            "#,
        )
        .bind(Uuid::from(receiver))
        .bind(Uuid::from(sender))
        .bind(read_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected())
    }

    async fn mark_read_by_ids(
        &self,
        receiver: UserId,
        ids: &[MessageId],
        read_at: Timestamp,
    ) -> Result<Vec<Message>, RepositoryError> {
        let ids: Vec<Uuid> = ids.iter().copied().map(Uuid::from).collect();
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            UPDATE messages
            SET is_read = TRUE, read_at = GREATEST($3, created_at)
            WHERE receiver_id = $1 AND id = ANY($2) AND NOT is_read
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::from(receiver))
        .bind(&ids)
        .bind(read_at)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(collect_messages(records))
    }

    async fn unread_count_from(
        &self,
        receiver: UserId,
        sender: UserId,
    ) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM messages WHERE receiver_id = $1 AND sender_id = $2 AND NOT is_read"#,
        )
        .bind(Uuid::from(receiver))
        .bind(Uuid::from(sender))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(count.max(0) as u64)
    }

    async fn latest_per_counterpart(&self, user: UserId) -> Result<Vec<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM (
                SELECT DISTINCT ON (CASE WHEN sender_id = $1 THEN receiver_id ELSE sender_id END)
                       {MESSAGE_COLUMNS}
                FROM messages
                WHERE sender_id = $1 OR receiver_id = $1
                ORDER BY CASE WHEN sender_id = $1 THEN receiver_id ELSE sender_id END,
                         created_at DESC
            ) latest
            ORDER BY created_at DESC
            "#
        ))
        .bind(Uuid::from(user))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(collect_messages(records))
    }
}

#[derive(Clone)]
pub struct PgAccountDirectory {
    pool: PgPool,
}

impl PgAccountDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    async fn find_by_id(&self, id: UserId) -> Result<Option<ChatAccount>, RepositoryError> {
        let record = sqlx::query_as::<_, AccountRecord>(&format!("{ACCOUNT_SELECT} WHERE u.id = $1"))
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(record.map(ChatAccount::from))
    }

    async fn find_admin(&self) -> Result<Option<ChatAccount>, RepositoryError> {
        let record = sqlx::query_as::<_, AccountRecord>(&format!(
            "{ACCOUNT_SELECT} WHERE u.is_admin ORDER BY u.created_at ASC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(ChatAccount::from))
    }

    async fn find_human_signups_between(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<ChatAccount>, RepositoryError> {
        let records = sqlx::query_as::<_, AccountRecord>(&format!(
            "{ACCOUNT_SELECT} WHERE u.created_at BETWEEN $1 AND $2 \
             AND NOT u.is_seeded AND NOT u.is_admin ORDER BY u.created_at ASC"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(records.into_iter().map(ChatAccount::from).collect())
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
