use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use taskmgmt_core::{
    config::{KvBackend, RedisConfig},
    AppConfig, MessageBus, TaskTypeRegistry,
};
use taskmgmt_infrastructure::{
    DistributedLock, DurableQueue, InMemoryKvTransport, KvClient, KvMessageBus, KvTransport,
    RedisKvTransport,
};
use taskmgmt_worker::{
    builtin_catalog, ActiveWorkflowWorker, ConnectionRequestCoordinator, ConnectionRequestWorker,
    HttpConnectionRequestSender, TaskDispatcher, WorkerLifecycle,
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 仅运行工作流Worker池
    WorkflowWorker,
    /// 仅运行连接请求执行Worker
    ConnectionRequestWorker,
    /// 运行所有组件
    All,
}

impl AppMode {
    fn runs_workflow_worker(self) -> bool {
        matches!(self, AppMode::WorkflowWorker | AppMode::All)
    }

    fn runs_connection_request_worker(self) -> bool {
        matches!(self, AppMode::ConnectionRequestWorker | AppMode::All)
    }
}

struct WorkflowComponents {
    worker: Arc<ActiveWorkflowWorker>,
    lifecycle: Arc<WorkerLifecycle>,
}

/// 主应用程序
///
/// 构造时完成全部装配：存储连接、任务类型注册表解析、Worker创建。
/// 任何一步失败都会使进程启动失败。
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    kv: KvClient,
    coordinator: ConnectionRequestCoordinator,
    workflow: Option<WorkflowComponents>,
    connection_request_worker: Option<Arc<ConnectionRequestWorker>>,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        let transport = create_kv_transport(&config.redis).await?;
        Self::with_transport(config, mode, transport)
    }

    /// 使用已建立的KV传输层创建应用实例
    pub fn with_transport(
        config: AppConfig,
        mode: AppMode,
        transport: Arc<dyn KvTransport>,
    ) -> Result<Self> {
        let kv = KvClient::new(transport);
        let bus: Arc<dyn MessageBus> = Arc::new(KvMessageBus::new(kv.clone()));
        let lock = DistributedLock::new(kv.clone(), config.lock.clone());
        let coordinator = ConnectionRequestCoordinator::new(
            Arc::clone(&bus),
            kv.clone(),
            &config.connection_request,
        );

        let workflow = if mode.runs_workflow_worker() && config.worker.enabled {
            let registry = builtin_catalog(coordinator.clone(), lock)
                .resolve(&config.worker.class_names)
                .context("解析Worker任务类型失败")?;
            Some(create_workflow_components(
                &config,
                registry,
                Arc::clone(&bus),
                kv.clone(),
            ))
        } else {
            None
        };

        let connection_request_worker =
            if mode.runs_connection_request_worker() && config.connection_request.enabled {
                let sender = HttpConnectionRequestSender::new(Duration::from_secs(
                    config.connection_request.http_timeout_seconds,
                ))
                .context("创建连接请求发送器失败")?;
                Some(Arc::new(ConnectionRequestWorker::new(
                    Arc::clone(&bus),
                    coordinator.clone(),
                    Arc::new(sender),
                    config.connection_request.status_ttl_ms,
                )))
            } else {
                None
            };

        if workflow.is_none() && connection_request_worker.is_none() {
            return Err(anyhow::anyhow!(
                "模式 {mode:?} 下没有启用任何Worker，请检查配置"
            ));
        }

        Ok(Self {
            config,
            mode,
            kv,
            coordinator,
            workflow,
            connection_request_worker,
        })
    }

    pub fn mode(&self) -> AppMode {
        self.mode
    }

    pub fn kv(&self) -> &KvClient {
        &self.kv
    }

    pub fn coordinator(&self) -> &ConnectionRequestCoordinator {
        &self.coordinator
    }

    /// 进程等待 [`Application::run`] 返回的上限
    ///
    /// 配置校验保证它覆盖排空期和恢复余量，排空超时后的重新入队不会被截断。
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.config.worker.shutdown_timeout_ms)
    }

    pub fn workflow_worker(&self) -> Option<&Arc<ActiveWorkflowWorker>> {
        self.workflow.as_ref().map(|components| &components.worker)
    }

    /// 运行应用程序，直到收到关闭信号
    ///
    /// 关闭时先停止轮询，再停止工作流Worker并恢复未完成的工作流。
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);
        let poll_interval = Duration::from_millis(self.config.worker.poll_interval_ms);

        let mut handles = Vec::new();
        if let Some(workflow) = &self.workflow {
            info!(
                worker_id = %self.config.worker.worker_id,
                "工作流Worker已启动，任务类型: {:?}",
                workflow.worker.pool().registered_task_types()
            );
            handles.push(Arc::clone(&workflow.lifecycle).spawn(shutdown_rx.resubscribe()));
        }
        if let Some(worker) = &self.connection_request_worker {
            handles.push(Arc::clone(worker).spawn(poll_interval, shutdown_rx.resubscribe()));
        }

        let _ = shutdown_rx.recv().await;
        info!("应用程序收到关闭信号");

        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!("轮询任务异常退出: {}", e);
            }
        }

        self.stop().await
    }

    /// 停止工作流Worker，返回时所有未完成的工作流都已重新入队或报告失败
    pub async fn stop(&self) -> Result<()> {
        let Some(workflow) = &self.workflow else {
            return Ok(());
        };

        match workflow.worker.stop().await {
            Ok(recovered) => {
                info!("工作流Worker已停止，重新入队 {} 个工作流", recovered);
                Ok(())
            }
            Err(e) => {
                error!("工作流Worker停止时恢复失败: {}", e);
                Err(e).context("恢复未完成的工作流失败")
            }
        }
    }
}

fn create_workflow_components(
    config: &AppConfig,
    registry: TaskTypeRegistry,
    bus: Arc<dyn MessageBus>,
    kv: KvClient,
) -> WorkflowComponents {
    let worker_config = &config.worker;
    let recovery_queue = DurableQueue::new(kv, worker_config.recovery_queue());

    let worker = Arc::new(ActiveWorkflowWorker::new(
        worker_config.worker_id.clone(),
        registry,
        worker_config.max_outstanding_tasks,
        recovery_queue,
        Duration::from_millis(worker_config.drain_timeout_ms),
    ));
    let lifecycle = Arc::new(
        WorkerLifecycle::new(
            worker_config.worker_id.clone(),
            bus,
            worker_config.inbound_address.clone(),
            Duration::from_millis(worker_config.poll_interval_ms),
            Arc::clone(&worker) as Arc<dyn TaskDispatcher>,
        )
        .with_max_redeliveries(worker_config.max_redeliveries)
        .with_dead_letter_address(worker_config.dead_letter_address()),
    );

    WorkflowComponents { worker, lifecycle }
}

/// 按配置创建KV传输层
async fn create_kv_transport(config: &RedisConfig) -> Result<Arc<dyn KvTransport>> {
    match config.backend {
        KvBackend::Redis => {
            info!("连接Redis: {}:{}", config.host, config.port);
            let transport = RedisKvTransport::connect(config)
                .await
                .context("连接Redis失败")?;
            Ok(Arc::new(transport))
        }
        KvBackend::Memory => {
            warn!("使用进程内KV存储，数据不会持久化，也不会在进程间共享");
            Ok(Arc::new(InMemoryKvTransport::new()))
        }
    }
}
