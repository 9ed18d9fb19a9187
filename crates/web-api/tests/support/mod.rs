use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    memory::{
        account, MemoryAccountDirectory, MemoryMessageRepository, RecordingPushNotifier,
        StaticGeoDistanceProvider,
    },
    ChatService, ChatServiceDependencies, LocalPresenceBroadcaster, MemoryPresenceRegistry,
    SystemClock,
};
use config::ChatConfig;
use domain::ChatAccount;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use web_api::{router, AppState, JwtConfig, JwtService};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 基于内存适配器、监听随机端口的测试服务
pub struct TestApp {
    pub addr: SocketAddr,
    pub jwt: Arc<JwtService>,
    pub accounts: Arc<MemoryAccountDirectory>,
    pub messages: Arc<MemoryMessageRepository>,
    pub geo: Arc<StaticGeoDistanceProvider>,
    pub notifier: Arc<RecordingPushNotifier>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let accounts = Arc::new(MemoryAccountDirectory::default());
        let messages = Arc::new(MemoryMessageRepository::default());
        let geo = Arc::new(StaticGeoDistanceProvider::default());
        let notifier = Arc::new(RecordingPushNotifier::default());
        let broadcaster = Arc::new(LocalPresenceBroadcaster::new(64));
        let clock = Arc::new(SystemClock);
        let presence = Arc::new(MemoryPresenceRegistry::new(
            broadcaster.clone(),
            clock.clone(),
        ));

        let chat_service = ChatService::new(ChatServiceDependencies {
            message_repository: messages.clone(),
            account_directory: accounts.clone(),
            geo_distance: geo.clone(),
            presence,
            broadcaster: broadcaster.clone(),
            notifier: notifier.clone(),
            clock,
            config: ChatConfig::default(),
        });

        let jwt = Arc::new(JwtService::new(JwtConfig {
            secret: "test-secret-key-with-at-least-32-chars".to_string(),
            expiration_hours: 24,
        }));

        let state = AppState::new(Arc::new(chat_service), broadcaster, jwt.clone());
        let app = router(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            jwt,
            accounts,
            messages,
            geo,
            notifier,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn user(&self, name: &str) -> (ChatAccount, String) {
        let account = self.accounts.insert(account(name)).await;
        let token = self.jwt.generate_token(account.id).expect("token");
        (account, token)
    }

    pub async fn connect(&self, token: &str) -> WsClient {
        let url = format!("ws://{}/ws?token={}", self.addr, token);
        let (ws, _) = connect_async(url).await.expect("websocket connect");
        ws
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn send_event(ws: &mut WsClient, event: Value) {
    ws.send(Message::Text(event.to_string().into()))
        .await
        .expect("send frame");
}

/// 读取帧直到出现指定事件，超时则失败
pub async fn expect_event(ws: &mut WsClient, name: &str) -> Value {
    let wait = async {
        while let Some(frame) = ws.next().await {
            let frame = frame.expect("frame");
            let Message::Text(text) = frame else {
                continue;
            };
            let value: Value = serde_json::from_str(text.as_str()).expect("json frame");
            if value["event"] == name {
                return value["data"].clone();
            }
        }
        panic!("socket closed before {name}");
    };
    tokio::time::timeout(Duration::from_secs(3), wait)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {name}"))
}

/// 确认短时间内没有收到指定事件
pub async fn expect_no_event(ws: &mut WsClient, name: &str) {
    let result = tokio::time::timeout(Duration::from_millis(300), expect_event(ws, name)).await;
    assert!(result.is_err(), "unexpected {name} event");
}
