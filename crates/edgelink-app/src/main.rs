//! # edgelink-app
//!
//! edgelink 에이전트 바이너리 진입점.
//! 설정 로드, 어댑터 와이어링(DI), 메트릭 스케줄러 실행, 라이프사이클 관리.

mod lifecycle;
mod scheduler;

use anyhow::{Context, Result};
use clap::Parser;
use edgelink_core::config::{AgentConfig, BufferKind, TransportKind};
use edgelink_core::config_manager::ConfigManager;
use edgelink_core::models::metric::{Metric, MetricHandle};
use edgelink_core::models::resource::PropertyMap;
use edgelink_core::ports::buffer::OfflineBuffer;
use edgelink_core::ports::connectivity::Connectivity;
use edgelink_core::ports::transport::Transport;
use edgelink_network::connectivity::{ConnectivityMonitor, TcpProbe};
use edgelink_network::dispatcher::Dispatcher;
use edgelink_network::line_sink::{self, LineSink};
use edgelink_network::protocol::client::{self as protocol_client, ProtocolClient};
use edgelink_network::protocol::ProtocolSettings;
use edgelink_network::tcp_transport::TcpLineTransport;
use edgelink_network::ws_transport::WsTransport;
use edgelink_storage::{JsonResourceStore, MemoryBuffer, SqliteBuffer};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::lifecycle::LifecycleManager;
use crate::scheduler::MetricScheduler;

/// 내장 가동 시간 메트릭 이름
const UPTIME_METRIC: &str = "agent.uptime";

/// 가동 시간 샘플링 간격 (초)
const UPTIME_INTERVAL_SECS: u64 = 10;

/// 가동 시간 집계 크기
const UPTIME_AGGREGATION: usize = 6;

/// edgelink 엣지 게이트웨이 텔레메트리 에이전트
#[derive(Parser, Debug)]
#[command(name = "edgelink")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 설정 파일 경로 (기본: 플랫폼 설정 디렉토리의 config.json)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// DCC 서버 주소 (설정 파일 값보다 우선)
    #[arg(long, short = 's')]
    server: Option<String>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

/// 텔레메트리 싱크 (전송 방식에 따라 결정)
enum Sink {
    Protocol(Arc<ProtocolClient>),
    Line(Arc<LineSink>),
}

impl Sink {
    fn name(&self) -> &'static str {
        match self {
            Sink::Protocol(_) => protocol_client::SINK_NAME,
            Sink::Line(_) => line_sink::SINK_NAME,
        }
    }
}

fn sink_name_for(transport: TransportKind) -> &'static str {
    match transport {
        TransportKind::WebSocket => protocol_client::SINK_NAME,
        TransportKind::TcpLine => line_sink::SINK_NAME,
    }
}

/// 데이터 경로 결정 (설정값 또는 플랫폼 데이터 디렉토리)
fn resolve_data_path(configured: Option<&PathBuf>, default_name: &str) -> Result<PathBuf> {
    match configured {
        Some(path) => Ok(path.clone()),
        None => Ok(ConfigManager::data_dir()?.join(default_name)),
    }
}

/// 설정에 맞는 오프라인 버퍼 생성 (`none`이면 None)
fn build_buffer(
    config: &AgentConfig,
    sink_name: &str,
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn Connectivity>,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<Option<Arc<dyn OfflineBuffer>>> {
    let buffer: Arc<dyn OfflineBuffer> = match config.buffer.kind {
        BufferKind::None => {
            info!("오프라인 버퍼 없음 — 항상 즉시 전송");
            return Ok(None);
        }
        BufferKind::Memory => Arc::new(
            MemoryBuffer::new(&config.buffer, transport, connectivity)?.with_shutdown(shutdown_rx),
        ),
        BufferKind::Durable => {
            let db_path = resolve_data_path(config.buffer.db_path.as_ref(), "buffer.db")?;
            Arc::new(
                SqliteBuffer::open(&db_path, sink_name, &config.buffer, transport, connectivity)?
                    .with_shutdown(shutdown_rx),
            )
        }
    };
    Ok(Some(buffer))
}

/// 설정에 맞는 전송 연결
async fn connect_transport(config: &AgentConfig) -> Result<Arc<dyn Transport>> {
    let url = &config.server.url;
    let transport: Arc<dyn Transport> = match config.server.transport {
        TransportKind::WebSocket => Arc::new(
            WsTransport::connect(url)
                .await
                .with_context(|| format!("DCC 연결 실패: {url}"))?,
        ),
        TransportKind::TcpLine => Arc::new(
            TcpLineTransport::connect(url)
                .await
                .with_context(|| format!("수집기 연결 실패: {url}"))?,
        ),
    };
    Ok(transport)
}

/// 가동 시간 메트릭 (초)
fn uptime_metric(started: Instant) -> Result<Metric> {
    Ok(Metric::new(
        UPTIME_METRIC,
        "s",
        UPTIME_INTERVAL_SECS,
        UPTIME_AGGREGATION,
        move || started.elapsed().as_secs_f64(),
    )?)
}

/// 에이전트 자신을 등록하고 내장 메트릭 핸들 생성
async fn register_builtin_metrics(sink: &Sink, started: Instant) -> Result<Vec<MetricHandle>> {
    let metric = uptime_metric(started)?;

    let handle = match sink {
        Sink::Protocol(client) => {
            let agent_name = std::env::var("HOSTNAME").unwrap_or_else(|_| "edgelink".to_string());
            let mut properties = PropertyMap::new();
            properties.insert("version".to_string(), json!(env!("CARGO_PKG_VERSION")));

            let agent = client
                .register_resource("gateway", &agent_name, None, properties)
                .await
                .context("게이트웨이 등록 실패")?;
            client
                .register_metric(metric, Some(&agent), PropertyMap::new())
                .await
                .context("가동 시간 메트릭 등록 실패")?
        }
        Sink::Line(sink) => sink.register(metric, None),
    };

    Ok(vec![handle])
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_filter = format!(
        "edgelink={lvl},edgelink_app={lvl},edgelink_core={lvl},edgelink_network={lvl},edgelink_storage={lvl}",
        lvl = args.log_level
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .init();

    let started = Instant::now();
    info!("edgelink v{} 시작", env!("CARGO_PKG_VERSION"));

    // 설정 로드 (CLI 인자가 우선)
    let config_manager = match args.config {
        Some(path) => ConfigManager::with_path(path)?,
        None => ConfigManager::new()?,
    };
    let mut config = config_manager.get();
    if let Some(server) = args.server {
        config.server.url = server;
    }
    config.validate()?;
    info!("설정 파일: {}", config_manager.config_path().display());

    let lifecycle = LifecycleManager::new();

    // 연결 감시
    let monitor = Arc::new(ConnectivityMonitor::from_config(&config.connectivity));
    let probe_task = monitor.spawn(
        Arc::new(TcpProbe::new(
            &config.connectivity.target_host,
            config.connectivity.target_port,
            config.probe_timeout(),
        )),
        config.probe_interval(),
        lifecycle.subscribe(),
    );

    // 전송 + 디스패처
    let transport = connect_transport(&config).await?;
    let sink_name = sink_name_for(config.server.transport);
    let connectivity: Arc<dyn Connectivity> = monitor.clone();
    let mut dispatcher = Dispatcher::new(Arc::clone(&transport));
    if let Some(buffer) = build_buffer(
        &config,
        sink_name,
        Arc::clone(&transport),
        Arc::clone(&connectivity),
        lifecycle.subscribe(),
    )? {
        match buffer.len().await {
            Ok(pending) if pending > 0 => {
                info!("이전 실행에서 남은 버퍼 {pending}건 — 드레인 시작");
                Arc::clone(&buffer).start_drain();
            }
            Ok(_) => {}
            Err(e) => warn!("버퍼 크기 확인 실패: {e}"),
        }
        dispatcher = dispatcher.with_resilience(connectivity, buffer);
    }

    // 싱크
    let sink = match config.server.transport {
        TransportKind::WebSocket => {
            let resource_dir =
                resolve_data_path(config.storage.resource_dir.as_ref(), "resources")?;
            let store = Arc::new(JsonResourceStore::new(resource_dir).await?);
            let client = Arc::new(ProtocolClient::new(
                dispatcher,
                store,
                ProtocolSettings::from_config(&config),
            ));
            client.connect(lifecycle.subscribe());
            Sink::Protocol(client)
        }
        TransportKind::TcpLine => Sink::Line(Arc::new(LineSink::new(dispatcher))),
    };
    info!("싱크: {} (전송 {})", sink.name(), transport.name());

    // 스케줄러
    let mut scheduler = MetricScheduler::new(config.tick_interval());
    for handle in register_builtin_metrics(&sink, started).await? {
        scheduler.add(handle);
    }
    let scheduler_task = tokio::spawn(scheduler.run(lifecycle.subscribe()));

    info!("에이전트 실행 중 — 종료하려면 Ctrl+C");
    lifecycle.wait_for_signal().await;

    // 정리
    if let Err(e) = scheduler_task.await {
        warn!("스케줄러 태스크 종료 실패: {e}");
    }
    if let Err(e) = probe_task.await {
        warn!("연결 감시 태스크 종료 실패: {e}");
    }
    if let Sink::Protocol(client) = &sink {
        client.shutdown();
    }
    if let Err(e) = transport.close().await {
        warn!("전송 종료 실패: {e}");
    }

    info!("edgelink 종료 (가동 {}초)", started.elapsed().as_secs());
    Ok(())
}
