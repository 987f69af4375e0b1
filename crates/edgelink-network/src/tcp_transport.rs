//! TCP 라인 전송.
//!
//! 개행으로 구분된 텍스트 메시지를 주고받는다. 라인 싱크(plaintext 수집기)와
//! 개행 구분 JSON을 쓰는 DCC 모두에 사용한다.

use async_trait::async_trait;
use edgelink_core::error::CoreError;
use edgelink_core::ports::transport::Transport;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// 전송 유형 이름
pub const TCP_TRANSPORT_NAME: &str = "TcpLineTransport";

/// TCP 라인 전송
pub struct TcpLineTransport {
    addr: String,
    write: Mutex<OwnedWriteHalf>,
    lines: Mutex<Lines<BufReader<OwnedReadHalf>>>,
}

impl TcpLineTransport {
    /// `host:port`로 연결 (`tcp://` 접두사 허용)
    pub async fn connect(addr: &str) -> Result<Self, CoreError> {
        let addr = addr.trim_start_matches("tcp://").trim_end_matches('/');
        info!("TCP 연결: {addr}");

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| CoreError::Network(format!("TCP 연결 실패: {addr}: {e}")))?;
        let (read, write) = stream.into_split();

        Ok(Self {
            addr: addr.to_string(),
            write: Mutex::new(write),
            lines: Mutex::new(BufReader::new(read).lines()),
        })
    }

    /// 연결 주소
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Transport for TcpLineTransport {
    fn name(&self) -> &str {
        TCP_TRANSPORT_NAME
    }

    async fn send(&self, message: &str) -> Result<(), CoreError> {
        let mut write = self.write.lock().await;
        write
            .write_all(message.as_bytes())
            .await
            .map_err(|e| CoreError::Network(format!("TCP 전송 실패: {e}")))?;
        if !message.ends_with('\n') {
            write
                .write_all(b"\n")
                .await
                .map_err(|e| CoreError::Network(format!("TCP 전송 실패: {e}")))?;
        }
        write
            .flush()
            .await
            .map_err(|e| CoreError::Network(format!("TCP 전송 실패: {e}")))
    }

    async fn receive(&self) -> Result<Option<String>, CoreError> {
        let mut lines = self.lines.lock().await;
        let line = lines
            .next_line()
            .await
            .map_err(|e| CoreError::Network(format!("TCP 수신 실패: {e}")))?;
        if line.is_none() {
            debug!("TCP 연결 종료: {}", self.addr);
        }
        Ok(line)
    }

    async fn close(&self) -> Result<(), CoreError> {
        info!("TCP 연결 종료: {}", self.addr);
        let mut write = self.write.lock().await;
        write
            .shutdown()
            .await
            .map_err(|e| CoreError::Network(format!("TCP 종료 실패: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn send_appends_newline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = String::new();
            stream.read_to_string(&mut buf).await.unwrap();
            buf
        });

        let transport = TcpLineTransport::connect(&format!("tcp://{addr}"))
            .await
            .unwrap();
        transport.send("cpu 1 100").await.unwrap();
        transport.send("cpu 2 101\n").await.unwrap();
        drop(transport);

        assert_eq!(server.await.unwrap(), "cpu 1 100\ncpu 2 101\n");
    }

    #[tokio::test]
    async fn close_ends_stream_while_transport_alive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = String::new();
            stream.read_to_string(&mut buf).await.unwrap();
            buf
        });

        let transport = TcpLineTransport::connect(&addr.to_string()).await.unwrap();
        transport.send("last").await.unwrap();
        transport.close().await.unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_secs(2), server)
            .await
            .expect("close 후 서버가 EOF를 받아야 함")
            .unwrap();
        assert_eq!(received, "last\n");
        drop(transport);
    }

    #[tokio::test]
    async fn receive_reads_lines_until_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"first\nsecond\n").await.unwrap();
        });

        let transport = TcpLineTransport::connect(&addr.to_string()).await.unwrap();
        assert_eq!(transport.receive().await.unwrap().as_deref(), Some("first"));
        assert_eq!(transport.receive().await.unwrap().as_deref(), Some("second"));
        assert_eq!(transport.receive().await.unwrap(), None);
    }
}
