//! WebSocket 전송.
//!
//! `tokio-tungstenite` 기반. 송신부와 수신부를 분리해 각각 잠금으로 보호하므로
//! 수신 태스크가 대기하는 동안에도 다른 태스크가 전송할 수 있다.

use async_trait::async_trait;
use edgelink_core::error::CoreError;
use edgelink_core::ports::transport::Transport;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 전송 유형 이름
pub const WS_TRANSPORT_NAME: &str = "WsTransport";

/// WebSocket 전송
pub struct WsTransport {
    url: String,
    write: Mutex<SplitSink<WsStream, Message>>,
    read: Mutex<SplitStream<WsStream>>,
}

impl WsTransport {
    /// WebSocket 연결 수립
    ///
    /// `http(s)://` 주소는 `ws(s)://`로 바꿔 연결한다.
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let url = url
            .replacen("http://", "ws://", 1)
            .replacen("https://", "wss://", 1);
        info!("WebSocket 연결: {url}");

        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| CoreError::Network(format!("WebSocket 연결 실패: {e}")))?;

        let (write, read) = ws_stream.split();
        Ok(Self {
            url,
            write: Mutex::new(write),
            read: Mutex::new(read),
        })
    }

    /// 연결 주소
    pub fn url(&self) -> &str {
        &self.url
    }

}

#[async_trait]
impl Transport for WsTransport {
    fn name(&self) -> &str {
        WS_TRANSPORT_NAME
    }

    async fn send(&self, message: &str) -> Result<(), CoreError> {
        let mut write = self.write.lock().await;
        write
            .send(Message::text(message.to_string()))
            .await
            .map_err(|e| CoreError::Network(format!("WebSocket 전송 실패: {e}")))
    }

    async fn receive(&self) -> Result<Option<String>, CoreError> {
        let mut read = self.read.lock().await;
        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(String::from_utf8_lossy(&data).into_owned()))
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!("WebSocket 연결 종료");
                    return Ok(None);
                }
                // Ping/Pong은 tungstenite가 처리
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket 수신 에러: {e}");
                    return Err(CoreError::Network(format!("WebSocket 수신 실패: {e}")));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), CoreError> {
        info!("WebSocket 연결 종료: {}", self.url);
        let mut write = self.write.lock().await;
        write
            .send(Message::Close(None))
            .await
            .map_err(|e| CoreError::Network(format!("WebSocket 종료 실패: {e}")))
    }
}
