use std::sync::Arc;

use domain::{has_privileged_access, DomainError, UserId};

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::repository::{AccountDirectory, GeoDistanceProvider, MessageRepository};

/// 首次联系的判定结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    Allow(AllowReason),
    /// `distance` 已四舍五入到一位小数，用于展示
    Deny { distance: f64, limit: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReason {
    EstablishedConversation,
    PrivilegedSender,
    DistanceUnknown,
    WithinRange,
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow(_))
    }
}

pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// 距离限制：非会员只能主动联系一定距离以内的用户
///
/// 已有会话永远放行；会员和管理员无条件放行；缺少位置数据时放行。
pub struct DistanceGate {
    messages: Arc<dyn MessageRepository>,
    accounts: Arc<dyn AccountDirectory>,
    geo: Arc<dyn GeoDistanceProvider>,
    clock: Arc<dyn Clock>,
    limit_miles: f64,
}

impl DistanceGate {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        accounts: Arc<dyn AccountDirectory>,
        geo: Arc<dyn GeoDistanceProvider>,
        clock: Arc<dyn Clock>,
        limit_miles: f64,
    ) -> Self {
        Self {
            messages,
            accounts,
            geo,
            clock,
            limit_miles,
        }
    }

    pub async fn may_initiate_contact(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
    ) -> Result<GateDecision, ApplicationError> {
        // 计数与之后的写入不是原子的：双方同时发出第一条消息时都会看到 0 条
        let existing = self.messages.count_between(sender_id, receiver_id).await?;
        if existing > 0 {
            return Ok(GateDecision::Allow(AllowReason::EstablishedConversation));
        }

        let sender = self
            .accounts
            .find_by_id(sender_id)
            .await?
            .ok_or(DomainError::AccountNotFound)?;
        if has_privileged_access(&sender, self.clock.now()) {
            return Ok(GateDecision::Allow(AllowReason::PrivilegedSender));
        }

        let distance = match self.geo.distance_between(sender_id, receiver_id).await {
            Ok(distance) => distance,
            Err(err) => {
                tracing::warn!(
                    sender_id = %sender_id,
                    receiver_id = %receiver_id,
                    error = %err,
                    "距离查询失败，按未知距离处理"
                );
                None
            }
        };

        let decision = match distance {
            None => GateDecision::Allow(AllowReason::DistanceUnknown),
            Some(distance) if distance <= self.limit_miles => {
                GateDecision::Allow(AllowReason::WithinRange)
            }
            Some(distance) => GateDecision::Deny {
                distance: round_to_tenth(distance),
                limit: self.limit_miles,
            },
        };

        if !decision.is_allowed() {
            tracing::info!(
                sender_id = %sender_id,
                receiver_id = %receiver_id,
                decision = ?decision,
                "首次联系被距离限制拒绝"
            );
        }
        Ok(decision)
    }
}
