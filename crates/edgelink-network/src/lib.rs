//! # edgelink-network
//!
//! DCC와의 네트워크 어댑터.
//! 연결 상태 감시, 오프라인 버퍼를 거치는 전송 디스패처, WebSocket/TCP 라인 전송,
//! 트랜잭션으로 요청과 응답을 짝짓는 프로토콜 클라이언트, 라인 싱크를 제공한다.
//!
//! ## 사용 예시
//!
//! ```rust,ignore
//! use edgelink_network::dispatcher::Dispatcher;
//! use edgelink_network::protocol::{ProtocolClient, ProtocolSettings};
//! use edgelink_network::ws_transport::WsTransport;
//!
//! let transport = Arc::new(WsTransport::connect("ws://localhost:8765/dcc").await?);
//! let dispatcher = Dispatcher::new(transport).with_resilience(monitor, buffer);
//! let client = Arc::new(ProtocolClient::new(dispatcher, store, settings));
//! client.connect(shutdown_rx);
//! ```

pub mod connectivity;
pub mod dispatcher;
pub mod line_sink;
pub mod protocol;
pub mod tcp_transport;
pub mod ws_transport;

#[cfg(test)]
mod test_support;
