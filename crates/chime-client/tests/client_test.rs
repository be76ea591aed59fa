use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{Html, IntoResponse};
use axum::{Router, routing::get};
use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use uuid::Uuid;

use chime_client::{ChatClient, ClientConfig, ClientError};
use chime_db::{Database, Store};
use chime_gateway::connection;
use chime_gateway::window::FixedClock;
use chime_gateway::{AdmissionDelay, Engine, GatewayConfig, MediaStore};
use chime_types::events::ServerEvent;
use chime_types::models::{MessageKind, MessageStatus};

const CLIP: &[u8] = b"not really an mp4 but long enough to need several chunks";

struct Server {
    addr: SocketAddr,
    db: Arc<Database>,
    media_dir: TempDir,
}

impl Server {
    async fn start() -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let media_dir = tempfile::tempdir().unwrap();
        let media = MediaStore::new(media_dir.path().to_path_buf()).await.unwrap();
        let config = GatewayConfig {
            admission_delay: AdmissionDelay::NONE,
            ..GatewayConfig::default()
        };
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap(),
        ));
        let engine = Engine::with_clock(db.clone() as Arc<dyn Store>, media, config, clock);

        let app = Router::new()
            .route("/ws/{client_id}", get(ws_upgrade))
            .with_state(engine)
            .route("/files/clip.mp4", get(clip))
            .route("/page", get(page));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            db,
            media_dir,
        }
    }

    fn config(&self, chunk_size: usize) -> ClientConfig {
        ClientConfig {
            ws_endpoint: format!("ws://{}/ws", self.addr),
            chunk_size,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn stored(&self, chat_id: Uuid) -> Vec<chime_types::models::Message> {
        self.db.list_messages(chat_id, 100, 0).unwrap()
    }

    fn sink_bytes(&self, content: &str) -> Vec<u8> {
        std::fs::read(self.media_dir.path().join(content)).unwrap()
    }
}

async fn ws_upgrade(
    State(engine): State<Engine>,
    Path(client_id): Path<i64>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, engine, client_id))
}

async fn clip() -> impl IntoResponse {
    (
        [
            (CONTENT_TYPE, "video/mp4"),
            (CONTENT_DISPOSITION, "attachment; filename=clip.mp4"),
        ],
        CLIP.to_vec(),
    )
}

async fn page() -> Html<&'static str> {
    Html("<html><body>not a file</body></html>")
}

#[tokio::test]
async fn bootstrap_then_text_is_accepted() {
    let server = Server::start().await;
    let mut client = ChatClient::connect(&server.config(1024), 5).await.unwrap();
    let (chat_id, timezone) = client.bootstrap("Europe/Paris").await.unwrap();
    assert_eq!(timezone, "Europe/Paris");

    client.send_text("hello").await.unwrap();
    assert!(matches!(
        client.next_event().await.unwrap(),
        ServerEvent::Accepted {
            kind: MessageKind::Text,
            ..
        }
    ));

    let stored = server.stored(chat_id);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content, "hello");
    assert_eq!(stored[0].status, MessageStatus::Accepted);
}

#[tokio::test]
async fn local_file_is_streamed_in_chunks() {
    let server = Server::start().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memo.ogg");
    let payload: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, &payload).unwrap();

    let mut client = ChatClient::connect(&server.config(1024), 6).await.unwrap();
    let (chat_id, _) = client.bootstrap("UTC").await.unwrap();

    let sent = client.send_voice(path.to_str().unwrap()).await.unwrap();
    assert_eq!(sent, 2500);
    assert!(matches!(
        client.next_event().await.unwrap(),
        ServerEvent::Accepted {
            kind: MessageKind::Voice,
            ..
        }
    ));

    let stored = server.stored(chat_id);
    assert!(stored[0].content.ends_with("-memo.ogg"));
    assert_eq!(server.sink_bytes(&stored[0].content), payload);
}

#[tokio::test]
async fn remote_file_is_streamed() {
    let server = Server::start().await;
    let mut client = ChatClient::connect(&server.config(16), 7).await.unwrap();
    let (chat_id, _) = client.bootstrap("UTC").await.unwrap();

    let sent = client.send_video(&server.url("/files/clip.mp4")).await.unwrap();
    assert_eq!(sent, CLIP.len() as u64);
    assert!(matches!(
        client.next_event().await.unwrap(),
        ServerEvent::Accepted {
            kind: MessageKind::Video,
            ..
        }
    ));

    let stored = server.stored(chat_id);
    assert!(stored[0].content.ends_with("-clip.mp4"));
    assert_eq!(server.sink_bytes(&stored[0].content), CLIP);
}

#[tokio::test]
async fn html_page_is_not_sent() {
    let server = Server::start().await;
    let mut client = ChatClient::connect(&server.config(1024), 8).await.unwrap();
    let (chat_id, _) = client.bootstrap("UTC").await.unwrap();

    assert!(matches!(
        client.send_video(&server.url("/page")).await,
        Err(ClientError::NotDownloadable(_))
    ));
    assert!(matches!(
        client.send_voice("no/such/memo.ogg").await,
        Err(ClientError::InvalidSource(_))
    ));

    // Nothing reached the server, so the connection is still clean
    client.send_text("after").await.unwrap();
    assert!(matches!(
        client.next_event().await.unwrap(),
        ServerEvent::Accepted {
            kind: MessageKind::Text,
            ..
        }
    ));
    assert_eq!(server.stored(chat_id).len(), 1);
}

#[tokio::test]
async fn invalid_timezone_is_rejected() {
    let server = Server::start().await;
    let mut client = ChatClient::connect(&server.config(1024), 9).await.unwrap();
    match client.bootstrap("Mars/Olympus_Mons").await {
        Err(ClientError::Rejected(reason)) => assert!(reason.contains("Mars/Olympus_Mons")),
        other => panic!("expected rejection, got {:?}", other.map(|(id, _)| id)),
    }
}
