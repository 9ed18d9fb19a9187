//! 基础设施层实现。
//!
//! 提供 PostgreSQL 仓储、地理距离计算和 Expo 推送等适配器，实现应用层定义的接口。

pub mod builder;
pub mod geo;
pub mod migrations;
pub mod push;
pub mod repository;

pub use builder::{Infrastructure, InfrastructureConfig, InfrastructureError};
pub use geo::{haversine_miles, PgGeoDistanceProvider};
pub use migrations::MIGRATOR;
pub use push::{is_expo_push_token, ExpoPushNotifier};
pub use repository::{create_pg_pool, PgAccountDirectory, PgMessageRepository};
