//! 内置任务处理器

use async_trait::async_trait;
use taskmgmt_core::{
    ConnectionRequest, HandlerCatalog, TaskContext, TaskHandler, TaskMgmtError, TaskMgmtResult,
    TaskOutcome,
};
use taskmgmt_infrastructure::DistributedLock;
use tracing::{info, warn};

use crate::connection_request::ConnectionRequestCoordinator;

pub const CONNECTION_REQUEST_TASK_TYPE: &str = "connection-request";

/// 根据任务负载提交连接请求
///
/// 负载格式与 [`ConnectionRequest`] 相同：`deviceId`、`url`，以及可选的 `username`、`password`。
pub struct ConnectionRequestTask {
    coordinator: ConnectionRequestCoordinator,
}

impl ConnectionRequestTask {
    pub fn new(coordinator: ConnectionRequestCoordinator) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl TaskHandler for ConnectionRequestTask {
    fn task_type(&self) -> &str {
        CONNECTION_REQUEST_TASK_TYPE
    }

    async fn execute(&self, context: &TaskContext) -> TaskMgmtResult<TaskOutcome> {
        let request: ConnectionRequest = serde_json::from_value(context.task.payload.clone())
            .map_err(|e| TaskMgmtError::InvalidTask(format!("无效的连接请求参数: {e}")))?;
        let device_id = request.device_id.clone();

        self.coordinator.submit(request).await?;
        Ok(TaskOutcome::success(format!(
            "connection request submitted for {device_id}"
        )))
    }
}

/// 按设备互斥执行的处理器包装
///
/// 执行前以任务负载中的 `deviceId` 获取分布式锁，锁的持有者为Worker标识。
/// 未获取到锁时任务以 "lock not acquired" 失败，绝不会当作已获取继续执行。
/// 锁不会主动释放，由租约到期释放。
pub struct ExclusiveHandler<H> {
    inner: H,
    lock: DistributedLock,
}

impl<H: TaskHandler> ExclusiveHandler<H> {
    pub fn new(inner: H, lock: DistributedLock) -> Self {
        Self { inner, lock }
    }
}

#[async_trait]
impl<H: TaskHandler> TaskHandler for ExclusiveHandler<H> {
    fn task_type(&self) -> &str {
        self.inner.task_type()
    }

    async fn execute(&self, context: &TaskContext) -> TaskMgmtResult<TaskOutcome> {
        let device_id = context.task.payload_str("deviceId").ok_or_else(|| {
            TaskMgmtError::InvalidTask(format!(
                "任务 {} 的负载缺少 deviceId",
                context.task.task_type_id
            ))
        })?;

        if !self
            .lock
            .acquire_with_defaults(device_id, &context.worker_id)
            .await
        {
            warn!(device_id, worker_id = %context.worker_id, "Device lock not acquired");
            return Ok(TaskOutcome::failure("lock not acquired"));
        }

        info!(device_id, worker_id = %context.worker_id, "Device lock acquired");
        self.inner.execute(context).await
    }
}

/// 注册所有内置任务类型
pub fn builtin_catalog(
    coordinator: ConnectionRequestCoordinator,
    lock: DistributedLock,
) -> HandlerCatalog {
    let mut catalog = HandlerCatalog::new();
    catalog.register(CONNECTION_REQUEST_TASK_TYPE, move || {
        ExclusiveHandler::new(
            ConnectionRequestTask::new(coordinator.clone()),
            lock.clone(),
        )
    });
    catalog
}
