//! 聊天核心所需的账户视图
//!
//! 账户本身由外部的用户服务维护，这里只保留判断权益和自动回复所需的字段。

use serde::{Deserialize, Serialize};

use crate::value_objects::{Timestamp, UserId};

/// 显示名缺失时使用的名称
pub const ANONYMOUS_DISPLAY_NAME: &str = "Anonymous";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAccount {
    pub id: UserId,
    pub display_name: Option<String>,
    pub is_premium: bool,
    pub premium_expires_at: Option<Timestamp>,
    pub is_admin: bool,
    /// 种子账户：由系统代为自动回复的非真人账户
    pub is_seeded: bool,
    pub push_token: Option<String>,
    pub created_at: Timestamp,
}

impl ChatAccount {
    pub fn display_name_or_default(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(ANONYMOUS_DISPLAY_NAME)
    }
}

/// 会员是否处于有效期内。
///
/// 距离限制、消息载荷中的 `senderIsPremium` 以及已读回执三处共用这一判断。
pub fn is_active_premium(account: &ChatAccount, now: Timestamp) -> bool {
    account.is_premium
        && account
            .premium_expires_at
            .map(|expires_at| expires_at > now)
            .unwrap_or(false)
}

/// 有效会员或管理员
pub fn has_privileged_access(account: &ChatAccount, now: Timestamp) -> bool {
    account.is_admin || is_active_premium(account, now)
}
