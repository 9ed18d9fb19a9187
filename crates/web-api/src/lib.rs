//! Web API 层。
//!
//! 提供 Axum 路由：实时聊天的 WebSocket 入口以及会话、在线状态查询接口，
//! 将请求委托给应用层的 `ChatService`。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::{Claims, JwtService};
pub use config::JwtConfig;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
