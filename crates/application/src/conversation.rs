use std::sync::Arc;

use domain::{ConversationPeer, ConversationSummary, LastMessagePreview, UserId};

use crate::error::ApplicationError;
use crate::repository::{AccountDirectory, MessageRepository};

/// 会话列表：按用户聚合消息，每个对方一条，按最新消息时间倒序
pub struct ConversationAggregator {
    messages: Arc<dyn MessageRepository>,
    accounts: Arc<dyn AccountDirectory>,
}

impl ConversationAggregator {
    pub fn new(messages: Arc<dyn MessageRepository>, accounts: Arc<dyn AccountDirectory>) -> Self {
        Self { messages, accounts }
    }

    pub async fn conversations_for(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ConversationSummary>, ApplicationError> {
        let latest = self.messages.latest_per_counterpart(user_id).await?;
        let mut summaries = Vec::with_capacity(latest.len());

        for message in latest {
            let Some(counterpart_id) = message.counterpart_of(user_id) else {
                continue;
            };
            let Some(counterpart) = self.accounts.find_by_id(counterpart_id).await? else {
                // 对方账户已删除
                tracing::debug!(user_id = %user_id, counterpart_id = %counterpart_id, "跳过已不存在的会话对象");
                continue;
            };
            let unread_count = self
                .messages
                .unread_count_from(user_id, counterpart_id)
                .await?;

            summaries.push(ConversationSummary {
                id: counterpart_id,
                participants: [user_id, counterpart_id],
                other_user: ConversationPeer {
                    id: counterpart_id,
                    display_name: counterpart.display_name_or_default().to_string(),
                },
                last_message: LastMessagePreview::from(&message),
                updated_at: message.created_at(),
                unread_count,
            });
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}
