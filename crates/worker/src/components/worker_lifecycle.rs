use std::sync::Arc;
use std::time::Duration;

use taskmgmt_core::{Message, MessageBus, MessageKind, TaskDescriptor, TaskMgmtResult};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};

use super::active_workflow::ActiveWorkflowWorker;
use super::worker_pool::{DispatchOutcome, RejectReason, WorkerPool};

/// 可以接纳任务的执行端
pub trait TaskDispatcher: Send + Sync {
    fn available_capacity(&self) -> usize;

    fn dispatch(&self, task: TaskDescriptor) -> TaskMgmtResult<DispatchOutcome>;
}

impl TaskDispatcher for WorkerPool {
    fn available_capacity(&self) -> usize {
        WorkerPool::available_capacity(self)
    }

    fn dispatch(&self, task: TaskDescriptor) -> TaskMgmtResult<DispatchOutcome> {
        Ok(WorkerPool::dispatch(self, task))
    }
}

impl TaskDispatcher for ActiveWorkflowWorker {
    fn available_capacity(&self) -> usize {
        self.pool().available_capacity()
    }

    fn dispatch(&self, task: TaskDescriptor) -> TaskMgmtResult<DispatchOutcome> {
        ActiveWorkflowWorker::dispatch(self, task)
    }
}

/// 默认的重新投递上限
pub const DEFAULT_MAX_REDELIVERIES: u32 = 10;

/// Worker轮询循环
///
/// 每个轮询周期最多从入站地址取出与剩余容量相同数量的消息。
/// 未被接纳的消息交还给消息总线，由总线决定何时再次投递。
/// 重新投递次数超过上限的消息，以及本Worker不支持其任务类型的消息，
/// 转入死信地址。
pub struct WorkerLifecycle {
    worker_id: String,
    bus: Arc<dyn MessageBus>,
    inbound_address: String,
    dead_letter_address: String,
    max_redeliveries: u32,
    poll_interval: Duration,
    dispatcher: Arc<dyn TaskDispatcher>,
}

impl WorkerLifecycle {
    pub fn new(
        worker_id: impl Into<String>,
        bus: Arc<dyn MessageBus>,
        inbound_address: impl Into<String>,
        poll_interval: Duration,
        dispatcher: Arc<dyn TaskDispatcher>,
    ) -> Self {
        let inbound_address = inbound_address.into();
        Self {
            worker_id: worker_id.into(),
            bus,
            dead_letter_address: format!("{inbound_address}.dead-letter"),
            inbound_address,
            max_redeliveries: DEFAULT_MAX_REDELIVERIES,
            poll_interval,
            dispatcher,
        }
    }

    pub fn with_max_redeliveries(mut self, max_redeliveries: u32) -> Self {
        self.max_redeliveries = max_redeliveries;
        self
    }

    pub fn with_dead_letter_address(mut self, address: impl Into<String>) -> Self {
        self.dead_letter_address = address.into();
        self
    }

    pub fn dead_letter_address(&self) -> &str {
        &self.dead_letter_address
    }

    /// 启动轮询循环，收到关闭信号后退出
    pub fn spawn(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        info!(
            worker_id = %self.worker_id,
            "Polling '{}' every {:?}",
            self.inbound_address,
            self.poll_interval
        );
        let mut poll_interval = interval(self.poll_interval.max(Duration::from_millis(1)));

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = poll_interval.tick() => {
                        if let Err(e) = self.poll_once().await {
                            error!("Task polling failed: {}", e);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!(worker_id = %self.worker_id, "Task polling shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// 执行一次轮询，返回被接纳的任务数
    pub async fn poll_once(&self) -> TaskMgmtResult<usize> {
        let capacity = self.dispatcher.available_capacity();
        if capacity == 0 {
            return Ok(0);
        }

        let messages = self.bus.consume(&self.inbound_address, capacity).await?;
        let mut admitted = 0;

        for mut message in messages {
            let task = match &message.kind {
                MessageKind::Task(task) => task.clone(),
                other => {
                    warn!(
                        worker_id = %self.worker_id,
                        "Unsupported message on inbound address, discarding: {:?}",
                        other
                    );
                    continue;
                }
            };

            let task_type = task.task_type_id.clone();
            match self.dispatcher.dispatch(task) {
                Ok(DispatchOutcome::Admitted) => admitted += 1,
                Ok(DispatchOutcome::Rejected(RejectReason::UnknownTaskType)) => {
                    // 重新投递到同一个池永远不会被接纳
                    error!(
                        worker_id = %self.worker_id,
                        "Message {} has task type '{}' not served by this worker, moving it to '{}'",
                        message.id,
                        task_type,
                        self.dead_letter_address
                    );
                    self.dead_letter(&message, RejectReason::UnknownTaskType).await;
                }
                Ok(DispatchOutcome::Rejected(reason)) => {
                    message.increment_retry();
                    if message.retry_count > self.max_redeliveries {
                        error!(
                            worker_id = %self.worker_id,
                            "Message {} rejected ({:?}) after {} redeliveries, moving it to '{}'",
                            message.id,
                            reason,
                            self.max_redeliveries,
                            self.dead_letter_address
                        );
                        self.dead_letter(&message, reason).await;
                    } else {
                        // 不缓冲，交还给总线
                        warn!(
                            worker_id = %self.worker_id,
                            "Message {} not accepted ({:?}), returning it to '{}' (attempt {}/{})",
                            message.id,
                            reason,
                            self.inbound_address,
                            message.retry_count,
                            self.max_redeliveries
                        );
                        self.requeue(&message).await;
                    }
                }
                Err(e) => {
                    error!(
                        worker_id = %self.worker_id,
                        "Discarding invalid task message {}: {}",
                        message.id,
                        e
                    );
                }
            }
        }

        Ok(admitted)
    }

    async fn dead_letter(&self, message: &Message, reason: RejectReason) {
        metrics::counter!("taskmgmt_worker_dead_lettered_total", "reason" => format!("{reason:?}"))
            .increment(1);
        if let Err(e) = self.bus.publish(&self.dead_letter_address, message).await {
            error!(
                worker_id = %self.worker_id,
                "Failed to move message {} to '{}': {}",
                message.id,
                self.dead_letter_address,
                e
            );
        }
    }

    async fn requeue(&self, message: &Message) {
        if let Err(e) = self.bus.requeue(&self.inbound_address, message).await {
            error!(
                worker_id = %self.worker_id,
                "Failed to return message {} to the bus: {}",
                message.id,
                e
            );
        }
    }
}
