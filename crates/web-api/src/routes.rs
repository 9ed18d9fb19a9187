use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use application::PresenceSnapshot;
use domain::{ConversationSummary, UserId};

use crate::{error::ApiError, state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/chat/conversations", get(list_conversations))
        .route("/chat/presence/{user_id}", get(get_presence))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let user_id = state.jwt_service.extract_user_from_headers(&headers)?;
    let conversations = state.chat_service.conversations_for(user_id).await?;
    Ok(Json(conversations))
}

async fn get_presence(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<Uuid>,
) -> Result<Json<PresenceSnapshot>, ApiError> {
    state.jwt_service.extract_user_from_headers(&headers)?;
    let snapshot = state.chat_service.presence_of(UserId::from(user_id)).await?;
    Ok(Json(snapshot))
}

/// 握手前完成认证，token 无效时直接返回 401，不升级连接
async fn websocket_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user_id = state
        .jwt_service
        .extract_user(&headers, query.token.as_deref())
        .inspect_err(|_| tracing::info!("WebSocket 握手认证失败"))?;

    Ok(ws.on_upgrade(move |socket| async move {
        WebSocketConnection::new(state, user_id).run(socket).await;
    }))
}
