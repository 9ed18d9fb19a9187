use std::sync::Arc;

use domain::{has_privileged_access, UserId};

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::repository::AccountDirectory;

/// 已读回执权限：只有有效会员（或管理员）发送者能看到对方已读。
///
/// 已读标记本身总是会写入，这里只决定是否通知发送者。
pub struct ReadReceiptGate {
    accounts: Arc<dyn AccountDirectory>,
    clock: Arc<dyn Clock>,
}

impl ReadReceiptGate {
    pub fn new(accounts: Arc<dyn AccountDirectory>, clock: Arc<dyn Clock>) -> Self {
        Self { accounts, clock }
    }

    pub async fn may_notify_sender_of_read(
        &self,
        sender_id: UserId,
    ) -> Result<bool, ApplicationError> {
        let Some(sender) = self.accounts.find_by_id(sender_id).await? else {
            return Ok(false);
        };
        Ok(has_privileged_access(&sender, self.clock.now()))
    }
}
