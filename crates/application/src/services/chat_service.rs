use std::collections::HashMap;
use std::sync::Arc;

use config::ChatConfig;
use domain::{
    is_active_premium, ClientEvent, ConversationSummary, DomainError, MessageContent, MessageId,
    MessagePayload, ServerEvent, Timestamp, UserId,
};
use serde::Serialize;

use crate::{
    auto_reply::AutoReplySimulator,
    broadcaster::PresenceBroadcaster,
    clock::Clock,
    conversation::ConversationAggregator,
    delivery::ReplyDeliveryRouter,
    distance_gate::{DistanceGate, GateDecision},
    error::{ApplicationError, SendMessageError},
    message_store::MessageStore,
    notifier::PushNotifier,
    presence::{ConnectionHandle, ConnectionId, PresenceRegistry},
    read_receipt::ReadReceiptGate,
    repository::{AccountDirectory, GeoDistanceProvider, MessageRepository},
};

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub sender_id: UserId,   // 来自已认证的连接
    pub receiver_id: UserId,
    pub content: String,
}

/// 某个用户的在线状态快照
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub user_id: UserId,
    pub online: bool,
    pub last_seen: Option<Timestamp>,
}

pub struct ChatServiceDependencies {
    pub message_repository: Arc<dyn MessageRepository>,
    pub account_directory: Arc<dyn AccountDirectory>,
    pub geo_distance: Arc<dyn GeoDistanceProvider>,
    pub presence: Arc<dyn PresenceRegistry>,
    pub broadcaster: Arc<dyn PresenceBroadcaster>,
    pub notifier: Arc<dyn PushNotifier>,
    pub clock: Arc<dyn Clock>,
    pub config: ChatConfig,
}

/// 私聊事件协议的入口：连接、断开、进入会话、发消息、已读、输入中
pub struct ChatService {
    presence: Arc<dyn PresenceRegistry>,
    accounts: Arc<dyn AccountDirectory>,
    clock: Arc<dyn Clock>,
    store: Arc<MessageStore>,
    gate: DistanceGate,
    router: Arc<ReplyDeliveryRouter>,
    receipts: ReadReceiptGate,
    auto_reply: AutoReplySimulator,
    conversations: ConversationAggregator,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        let store = Arc::new(MessageStore::new(
            deps.message_repository.clone(),
            deps.account_directory.clone(),
            deps.clock.clone(),
            deps.config.history_limit,
        ));
        let router = Arc::new(ReplyDeliveryRouter::new(
            deps.presence.clone(),
            deps.notifier.clone(),
            deps.clock.clone(),
        ));
        let gate = DistanceGate::new(
            deps.message_repository.clone(),
            deps.account_directory.clone(),
            deps.geo_distance.clone(),
            deps.clock.clone(),
            deps.config.distance_limit_miles,
        );
        let receipts = ReadReceiptGate::new(deps.account_directory.clone(), deps.clock.clone());
        let auto_reply = AutoReplySimulator::new(
            deps.broadcaster.clone(),
            store.clone(),
            router.clone(),
            deps.clock.clone(),
            deps.config.auto_reply.clone(),
        );
        let conversations = ConversationAggregator::new(
            deps.message_repository.clone(),
            deps.account_directory.clone(),
        );

        Self {
            presence: deps.presence,
            accounts: deps.account_directory,
            clock: deps.clock,
            store,
            gate,
            router,
            receipts,
            auto_reply,
            conversations,
        }
    }

    pub fn store(&self) -> Arc<MessageStore> {
        self.store.clone()
    }

    pub async fn connect(
        &self,
        user_id: UserId,
        handle: ConnectionHandle,
    ) -> Result<(), ApplicationError> {
        self.presence.register(user_id, handle).await
    }

    /// 连接断开后的清理，失败只记录日志
    pub async fn disconnect(&self, user_id: UserId, connection_id: ConnectionId) {
        if let Err(err) = self.presence.unregister(user_id, connection_id).await {
            tracing::warn!(
                user_id = %user_id,
                connection_id = %connection_id,
                error = %err,
                "断开连接时清理在线状态失败"
            );
        }
    }

    /// 处理一条客户端事件，返回需要回送给当前连接的事件
    pub async fn handle_event(&self, user_id: UserId, event: ClientEvent) -> Vec<ServerEvent> {
        match event {
            ClientEvent::JoinChat { counterpart_id } => {
                match self.join_chat(user_id, counterpart_id).await {
                    Ok(history) => vec![ServerEvent::MessageHistory(history)],
                    Err(err) => {
                        tracing::warn!(
                            user_id = %user_id,
                            counterpart_id = %counterpart_id,
                            error = %err,
                            "加载会话失败"
                        );
                        Vec::new()
                    }
                }
            }
            ClientEvent::SendMessage {
                receiver_id,
                content,
            } => {
                let request = SendMessageRequest {
                    sender_id: user_id,
                    receiver_id,
                    content,
                };
                match self.send_message(request).await {
                    Ok(payload) => vec![ServerEvent::MessageSent(payload)],
                    Err(err) => {
                        tracing::info!(
                            user_id = %user_id,
                            receiver_id = %receiver_id,
                            code = err.code(),
                            error = %err,
                            "消息发送被拒绝"
                        );
                        vec![err.into_event()]
                    }
                }
            }
            ClientEvent::MarkAsRead { message_ids } => {
                if let Err(err) = self.mark_as_read(user_id, &message_ids).await {
                    tracing::warn!(user_id = %user_id, error = %err, "标记已读失败");
                }
                Vec::new()
            }
            ClientEvent::Typing { receiver_id } => {
                self.typing(user_id, receiver_id).await;
                Vec::new()
            }
        }
    }

    /// 打开与对方的会话：返回最近的历史消息，并把对方发来的消息标记为已读
    pub async fn join_chat(
        &self,
        user_id: UserId,
        counterpart_id: UserId,
    ) -> Result<Vec<MessagePayload>, ApplicationError> {
        let counterpart = self
            .accounts
            .find_by_id(counterpart_id)
            .await?
            .ok_or(DomainError::AccountNotFound)?;
        let me = self
            .accounts
            .find_by_id(user_id)
            .await?
            .ok_or(DomainError::AccountNotFound)?;

        let now = self.clock.now();
        let premium: HashMap<UserId, bool> = [&me, &counterpart]
            .into_iter()
            .map(|acc| (acc.id, is_active_premium(acc, now)))
            .collect();

        let history = self.store.history(user_id, counterpart_id, None).await?;
        let payloads = history
            .iter()
            .map(|message| {
                let sender_is_premium = premium
                    .get(&message.sender_id())
                    .copied()
                    .unwrap_or(false);
                MessagePayload::from_message(message, sender_is_premium)
            })
            .collect();

        // 历史记录已经取到，已读更新失败不影响返回
        if let Err(err) = self.store.mark_read_bulk(user_id, counterpart_id).await {
            tracing::warn!(
                user_id = %user_id,
                counterpart_id = %counterpart_id,
                error = %err,
                "进入会话时标记已读失败"
            );
        }
        Ok(payloads)
    }

    /// 发送消息：校验、距离限制、持久化、投递，接收者是种子账户时安排自动回复。
    /// 返回回送给发送者的载荷。
    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<MessagePayload, SendMessageError> {
        let SendMessageRequest {
            sender_id,
            receiver_id,
            content,
        } = request;

        if MessageContent::new(content.as_str()).is_err() {
            return Err(SendMessageError::InvalidMessage(
                "Message content cannot be empty".to_string(),
            ));
        }
        if sender_id == receiver_id {
            return Err(SendMessageError::InvalidMessage(
                "You cannot message yourself".to_string(),
            ));
        }

        let receiver = self
            .accounts
            .find_by_id(receiver_id)
            .await
            .map_err(ApplicationError::from)?
            .ok_or(SendMessageError::RecipientNotFound)?;

        if let GateDecision::Deny { distance, limit } =
            self.gate.may_initiate_contact(sender_id, receiver_id).await?
        {
            return Err(SendMessageError::DistanceRestricted { distance, limit });
        }

        let sender = self
            .accounts
            .find_by_id(sender_id)
            .await
            .map_err(ApplicationError::from)?
            .ok_or_else(|| SendMessageError::Persistence(DomainError::AccountNotFound.into()))?;

        let message = self
            .store
            .save(sender_id, receiver_id, &content)
            .await
            .map_err(|err| match err {
                ApplicationError::Domain(DomainError::AccountNotFound) => {
                    SendMessageError::RecipientNotFound
                }
                other => SendMessageError::Persistence(other),
            })?;

        let payload = self.router.deliver_message(&message, &sender).await;

        if receiver.is_seeded {
            self.auto_reply.schedule(receiver, sender_id, &content);
        }
        Ok(payload)
    }

    /// 标记已读。已读状态总是写入；回执只发给有权限的发送者，且每人只收到自己的消息ID。
    /// 返回本次新标记的消息数。
    pub async fn mark_as_read(
        &self,
        user_id: UserId,
        message_ids: &[MessageId],
    ) -> Result<usize, ApplicationError> {
        let (updated, read_at) = self.store.mark_read_by_ids(user_id, message_ids).await?;
        if updated.is_empty() {
            return Ok(0);
        }

        let mut by_sender: HashMap<UserId, Vec<MessageId>> = HashMap::new();
        for message in &updated {
            by_sender
                .entry(message.sender_id())
                .or_default()
                .push(message.id());
        }

        for (sender_id, ids) in by_sender {
            match self.receipts.may_notify_sender_of_read(sender_id).await {
                Ok(true) => {
                    self.router
                        .deliver_to(
                            sender_id,
                            ServerEvent::MessagesRead {
                                message_ids: ids,
                                read_at,
                            },
                        )
                        .await;
                }
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(sender_id = %sender_id, error = %err, "已读回执权限检查失败");
                }
            }
        }
        Ok(updated.len())
    }

    /// 对方在线时转发“正在输入”，否则什么都不做
    pub async fn typing(&self, user_id: UserId, receiver_id: UserId) {
        self.router
            .deliver_to(receiver_id, ServerEvent::UserTyping { user_id })
            .await;
    }

    pub async fn conversations_for(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ConversationSummary>, ApplicationError> {
        self.conversations.conversations_for(user_id).await
    }

    pub async fn presence_of(&self, user_id: UserId) -> Result<PresenceSnapshot, ApplicationError> {
        Ok(PresenceSnapshot {
            user_id,
            online: self.presence.is_online(user_id).await?,
            last_seen: self.presence.last_seen(user_id).await?,
        })
    }
}
