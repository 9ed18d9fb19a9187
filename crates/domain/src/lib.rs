//! 附近聊天核心领域模型
//!
//! 包含私聊消息、账户权益、会话摘要等核心实体，以及客户端与服务端之间的事件协议。

pub mod account;
pub mod conversation;
pub mod errors;
pub mod events;
pub mod message;
pub mod value_objects;

// 重新导出常用类型
pub use account::*;
pub use conversation::*;
pub use errors::*;
pub use events::*;
pub use message::*;
pub use value_objects::*;
