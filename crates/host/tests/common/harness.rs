//! In-process host on ephemeral ports plus a raw sync channel client

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use stackboard_host::config::{BackendKind, Config};
use stackboard_host::server::open_backend;
use stackboard_host::RunningHost;
use stackboard_protocol::{decode_server, ClientMessage, Codec, ServerEvent};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{client::IntoClientRequest, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const EVENT_TIMEOUT: Duration = Duration::from_secs(3);

pub struct TestHarness {
    pub host: RunningHost,
}

impl TestHarness {
    /// Memory-backed host on free ports
    pub async fn start() -> Self {
        let mut config = Config::default();
        config.server.http_port = 0;
        config.server.ws_port = 0;
        config.storage.backend = BackendKind::Memory;
        let backend = open_backend(&config.storage).unwrap();
        let host = RunningHost::start(&config, backend).await.unwrap();
        Self { host }
    }

    pub fn api(&self, path: &str) -> String {
        format!("{}/api{path}", self.host.http_url())
    }

    /// Connect without an Origin header and consume the client-count greeting
    pub async fn connect(&self) -> WsClient {
        let (stream, _) = connect_async(self.host.ws_url()).await.unwrap();
        let mut client = WsClient { stream };
        assert!(matches!(client.next_event().await, ServerEvent::ClientCount(_)));
        client
    }

    /// Two connected clients with all client-count announcements drained
    pub async fn connect_pair(&self) -> (WsClient, WsClient) {
        let mut a = self.connect().await;
        let b = self.connect().await;
        assert!(matches!(a.next_event().await, ServerEvent::ClientCount(_)));
        (a, b)
    }

    pub async fn connect_with_origin(
        &self,
        origin: &str,
    ) -> Result<WsClient, tokio_tungstenite::tungstenite::Error> {
        let mut request = self.host.ws_url().into_client_request()?;
        request
            .headers_mut()
            .insert("Origin", origin.parse().unwrap());
        let (stream, _) = connect_async(request).await?;
        Ok(WsClient { stream })
    }
}

pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn send(&mut self, msg: &ClientMessage) {
        self.send_with(Codec::Json, msg).await;
    }

    pub async fn send_with(&mut self, codec: Codec, msg: &ClientMessage) {
        self.stream.send(codec.encode(msg).unwrap()).await.unwrap();
    }

    pub async fn send_raw(&mut self, frame: Message) {
        self.stream.send(frame).await.unwrap();
    }

    /// Next data frame, skipping heartbeats; `None` once the server closes
    pub async fn next_frame(&mut self) -> Option<Message> {
        loop {
            let next = tokio::time::timeout(EVENT_TIMEOUT, self.stream.next())
                .await
                .expect("timed out waiting for a frame");
            match next {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_)) | Err(_)) | None => return None,
                Some(Ok(frame)) => return Some(frame),
            }
        }
    }

    pub async fn next_event(&mut self) -> ServerEvent {
        let frame = self.next_frame().await.expect("connection closed");
        decode_server(&frame).unwrap().unwrap().1
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
