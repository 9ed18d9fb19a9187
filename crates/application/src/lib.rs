//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务：距离限制、消息存储、投递与推送、
//! 已读回执、自动回复和欢迎消息，以及对外部适配器（仓储、在线状态、推送）的抽象。

pub mod auto_reply;
pub mod broadcaster;
pub mod clock;
pub mod conversation;
pub mod delivery;
pub mod distance_gate;
pub mod error;
pub mod memory;
pub mod message_store;
pub mod notifier;
pub mod presence;
pub mod read_receipt;
pub mod repository;
pub mod services;
pub mod welcome;

pub use auto_reply::{AutoReplySimulator, ScheduledReply};
pub use broadcaster::{BroadcastError, LocalPresenceBroadcaster, PresenceBroadcaster};
pub use clock::{Clock, SystemClock};
pub use conversation::ConversationAggregator;
pub use delivery::{DeliveryOutcome, ReplyDeliveryRouter};
pub use distance_gate::{AllowReason, DistanceGate, GateDecision};
pub use error::{ApplicationError, SendMessageError};
pub use message_store::MessageStore;
pub use notifier::{DisabledPushNotifier, PushNotification, PushNotifier};
pub use presence::{memory::MemoryPresenceRegistry, ConnectionHandle, ConnectionId, PresenceRegistry};
pub use read_receipt::ReadReceiptGate;
pub use repository::{AccountDirectory, GeoDistanceProvider, MessageRepository};
pub use services::{ChatService, ChatServiceDependencies, PresenceSnapshot, SendMessageRequest};
pub use welcome::WelcomeMessageJob;
