use domain::{DomainError, RepositoryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl ApplicationError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ApplicationError::Domain(DomainError::AccountNotFound)
                | ApplicationError::Repository(RepositoryError::NotFound)
        )
    }
}

/// 发送消息失败的原因，每一种都会转换成发给发送者的 `messageError` 事件
#[derive(Debug, Error)]
pub enum SendMessageError {
    #[error("distance restriction: {distance} miles away")]
    DistanceRestricted { distance: f64, limit: f64 },
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("recipient not found")]
    RecipientNotFound,
    #[error("failed to send message: {0}")]
    Persistence(#[source] ApplicationError),
}

impl SendMessageError {
    pub fn code(&self) -> &'static str {
        match self {
            SendMessageError::DistanceRestricted { .. } => "DISTANCE_RESTRICTED",
            SendMessageError::InvalidMessage(_) => "INVALID_MESSAGE",
            SendMessageError::RecipientNotFound => "RECIPIENT_NOT_FOUND",
            SendMessageError::Persistence(_) => "SEND_FAILED",
        }
    }

    pub fn into_event(self) -> domain::ServerEvent {
        let (message, distance) = match &self {
            SendMessageError::DistanceRestricted { distance, limit } => (
                format!(
                    "This user is {distance} miles away. Upgrade to premium to message users more than {limit} miles away."
                ),
                Some(*distance),
            ),
            SendMessageError::InvalidMessage(reason) => (reason.clone(), None),
            SendMessageError::RecipientNotFound => ("Recipient does not exist".to_string(), None),
            SendMessageError::Persistence(_) => {
                ("Message could not be sent, please try again".to_string(), None)
            }
        };
        domain::ServerEvent::MessageError {
            error: self.code().to_string(),
            message,
            distance,
        }
    }
}

impl From<ApplicationError> for SendMessageError {
    fn from(err: ApplicationError) -> Self {
        if err.is_not_found() {
            SendMessageError::RecipientNotFound
        } else {
            SendMessageError::Persistence(err)
        }
    }
}
