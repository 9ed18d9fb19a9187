use std::sync::Arc;

use application::{ChatService, PresenceBroadcaster};

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub broadcaster: Arc<dyn PresenceBroadcaster>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(
        chat_service: Arc<ChatService>,
        broadcaster: Arc<dyn PresenceBroadcaster>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            chat_service,
            broadcaster,
            jwt_service,
        }
    }
}
