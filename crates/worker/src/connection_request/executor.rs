use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use taskmgmt_core::{
    ConnectionRequest, MessageBus, MessageKind, TaskMgmtError, TaskMgmtResult,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};

use super::coordinator::{ConnectionRequestCoordinator, ConnectionRequestStatus};

/// 向设备发送连接请求
#[async_trait]
pub trait ConnectionRequestSender: Send + Sync {
    async fn send(&self, request: &ConnectionRequest) -> TaskMgmtResult<()>;
}

/// 通过HTTP GET发送连接请求，配置了凭据时附带认证信息
#[derive(Debug, Clone)]
pub struct HttpConnectionRequestSender {
    client: reqwest::Client,
}

impl HttpConnectionRequestSender {
    pub fn new(timeout: Duration) -> TaskMgmtResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TaskMgmtError::Configuration(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ConnectionRequestSender for HttpConnectionRequestSender {
    async fn send(&self, request: &ConnectionRequest) -> TaskMgmtResult<()> {
        let mut builder = self.client.get(&request.url);
        if let Some(username) = &request.username {
            builder = builder.basic_auth(username, request.password.as_ref());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TaskMgmtError::TaskExecution(format!("request timed out: {e}"))
            } else {
                TaskMgmtError::TaskExecution(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TaskMgmtError::TaskExecution(format!("HTTP {status}")))
        }
    }
}

fn failure_reason(error: TaskMgmtError) -> String {
    match error {
        TaskMgmtError::TaskExecution(reason) => reason,
        other => other.to_string(),
    }
}

/// 连接请求执行Worker
///
/// 消费连接请求地址，对每个请求依次记录 `in-progress`、执行请求、
/// 记录 `succeeded` 或 `failed: <原因>`。每次状态写入都带有过期时间。
pub struct ConnectionRequestWorker {
    bus: Arc<dyn MessageBus>,
    coordinator: ConnectionRequestCoordinator,
    sender: Arc<dyn ConnectionRequestSender>,
    status_ttl_ms: u64,
    batch_size: usize,
}

impl ConnectionRequestWorker {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        coordinator: ConnectionRequestCoordinator,
        sender: Arc<dyn ConnectionRequestSender>,
        status_ttl_ms: u64,
    ) -> Self {
        Self {
            bus,
            coordinator,
            sender,
            status_ttl_ms,
            batch_size: 16,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn spawn(
        self: Arc<Self>,
        poll_interval: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        info!(
            "Connection request worker consuming '{}'",
            self.coordinator.address()
        );
        let mut poll_interval = interval(poll_interval.max(Duration::from_millis(1)));

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = poll_interval.tick() => {
                        if let Err(e) = self.process_once().await {
                            error!("Connection request polling failed: {}", e);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Connection request worker shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// 处理一批连接请求，返回处理的请求数
    pub async fn process_once(&self) -> TaskMgmtResult<usize> {
        let messages = self
            .bus
            .consume(self.coordinator.address(), self.batch_size)
            .await?;

        let requests: Vec<ConnectionRequest> = messages
            .into_iter()
            .filter_map(|message| match message.kind {
                MessageKind::ConnectionRequest(request) => Some(request),
                other => {
                    warn!("Unsupported message on connection request address: {:?}", other);
                    None
                }
            })
            .collect();

        let count = requests.len();
        join_all(requests.iter().map(|request| self.execute(request))).await;
        Ok(count)
    }

    async fn execute(&self, request: &ConnectionRequest) {
        let device_id = request.device_id.as_str();
        self.record(device_id, &ConnectionRequestStatus::InProgress).await;

        let status = match self.sender.send(request).await {
            Ok(()) => {
                info!(device_id, "Connection request succeeded");
                metrics::counter!("taskmgmt_connreq_completed_total", "result" => "succeeded")
                    .increment(1);
                ConnectionRequestStatus::Succeeded
            }
            Err(e) => {
                warn!(device_id, "Connection request failed: {}", e);
                metrics::counter!("taskmgmt_connreq_completed_total", "result" => "failed")
                    .increment(1);
                ConnectionRequestStatus::Failed(failure_reason(e))
            }
        };

        self.record(device_id, &status).await;
    }

    async fn record(&self, device_id: &str, status: &ConnectionRequestStatus) {
        if let Err(e) = self
            .coordinator
            .record_state(device_id, status, self.status_ttl_ms)
            .await
        {
            error!(device_id, "Failed to record connection request state: {}", e);
        }
    }
}
