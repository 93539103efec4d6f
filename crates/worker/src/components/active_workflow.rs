use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::AbortHandle;
use taskmgmt_core::{
    Message, TaskDescriptor, TaskMgmtError, TaskMgmtResult, TaskRunStatus, TaskTypeRegistry,
};
use taskmgmt_infrastructure::DurableQueue;
use tracing::{debug, error, info, warn};

use super::worker_pool::{AdmissionId, DispatchOutcome, RejectReason, TaskObserver, WorkerPool};

/// 活动工作流条目
#[derive(Debug)]
struct ActiveWorkflowEntry {
    admission: AdmissionId,
    task: TaskDescriptor,
    started_at: DateTime<Utc>,
    abort: AbortHandle,
}

/// 工作流实例ID到运行时句柄的映射
///
/// 条目与Worker池的接纳同步插入，与任务完成、失败或取消同步移除。
/// 谁从表中移除了条目，谁就拥有它，这保证了关闭时每个条目只被重新入队一次。
/// 完成回调只移除自己那次接纳的条目：实例被取消后又以相同ID重新接纳时，
/// 旧执行的结束不会删掉新执行的条目。
#[derive(Debug, Default)]
struct WorkflowTable {
    entries: Mutex<HashMap<String, ActiveWorkflowEntry>>,
}

impl WorkflowTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ActiveWorkflowEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove(&self, instance_id: &str) -> Option<ActiveWorkflowEntry> {
        self.lock().remove(instance_id)
    }

    fn take_all(&self) -> Vec<(String, ActiveWorkflowEntry)> {
        self.lock().drain().collect()
    }
}

impl TaskObserver for WorkflowTable {
    fn task_admitted(
        &self,
        admission: AdmissionId,
        task: &TaskDescriptor,
        abort: AbortHandle,
    ) -> Result<(), RejectReason> {
        let Some(instance_id) = &task.workflow_instance_id else {
            return Ok(());
        };

        let mut entries = self.lock();
        if entries.contains_key(instance_id) {
            return Err(RejectReason::DuplicateInstance);
        }
        entries.insert(
            instance_id.clone(),
            ActiveWorkflowEntry {
                admission,
                task: task.clone(),
                started_at: Utc::now(),
                abort,
            },
        );
        metrics::gauge!("taskmgmt_active_workflows").set(entries.len() as f64);
        Ok(())
    }

    fn task_finished(&self, admission: AdmissionId, task: &TaskDescriptor, status: TaskRunStatus) {
        let Some(instance_id) = &task.workflow_instance_id else {
            return;
        };

        let mut entries = self.lock();
        let owned = entries
            .get(instance_id)
            .is_some_and(|entry| entry.admission == admission);
        if !owned {
            debug!(instance_id = %instance_id, "Superseded execution finished with status {}", status);
            return;
        }
        if let Some(entry) = entries.remove(instance_id) {
            debug!(
                instance_id = %instance_id,
                "Workflow finished with status {} after {}ms",
                status,
                (Utc::now() - entry.started_at).num_milliseconds()
            );
        }
        metrics::gauge!("taskmgmt_active_workflows").set(entries.len() as f64);
    }
}

/// 活动工作流Worker
///
/// 在 [`WorkerPool`] 的基础上按工作流实例ID跟踪进行中的工作流。
/// 进程关闭时，排空期结束后仍未完成的工作流会被中止，
/// 并作为任务消息重新提交到持久恢复队列，交给其他Worker继续处理。
pub struct ActiveWorkflowWorker {
    pool: WorkerPool,
    table: Arc<WorkflowTable>,
    recovery_queue: DurableQueue,
    drain_timeout: Duration,
}

impl ActiveWorkflowWorker {
    pub fn new(
        worker_id: impl Into<String>,
        registry: TaskTypeRegistry,
        max_outstanding: usize,
        recovery_queue: DurableQueue,
        drain_timeout: Duration,
    ) -> Self {
        let table = Arc::new(WorkflowTable::default());
        let pool = WorkerPool::new(worker_id, registry, max_outstanding)
            .with_observer(Arc::clone(&table) as Arc<dyn TaskObserver>);

        Self {
            pool,
            table,
            recovery_queue,
            drain_timeout,
        }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// 接纳一个工作流任务
    ///
    /// 任务必须带有工作流实例ID，否则返回 [`TaskMgmtError::InvalidTask`]。
    pub fn dispatch(&self, task: TaskDescriptor) -> TaskMgmtResult<DispatchOutcome> {
        if task.workflow_instance_id.is_none() {
            return Err(TaskMgmtError::InvalidTask(format!(
                "工作流任务缺少实例ID: {}",
                task.task_type_id
            )));
        }
        Ok(self.pool.dispatch(task))
    }

    /// 取消一个进行中的工作流，返回该实例是否存在
    pub fn cancel(&self, instance_id: &str) -> bool {
        match self.table.remove(instance_id) {
            Some(entry) => {
                entry.abort.abort();
                info!(instance_id, "Workflow cancelled");
                true
            }
            None => {
                debug!(instance_id, "Cancel requested for unknown workflow");
                false
            }
        }
    }

    pub fn contains(&self, instance_id: &str) -> bool {
        self.table.lock().contains_key(instance_id)
    }

    pub fn active_instances(&self) -> Vec<String> {
        let mut instances: Vec<String> = self.table.lock().keys().cloned().collect();
        instances.sort();
        instances
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }

    /// 停止Worker并恢复未完成的工作流
    ///
    /// 先在排空期内等待运行中的工作流完成，之后每个剩余条目被移除、中止，
    /// 并恰好一次地追加到恢复队列。返回重新入队的数量。
    /// 任何一次入队失败都会记录错误，并以 [`TaskMgmtError::RecoveryFailed`] 返回。
    pub async fn stop(&self) -> TaskMgmtResult<usize> {
        self.pool.drain(self.drain_timeout).await;

        let remaining = self.table.take_all();
        metrics::gauge!("taskmgmt_active_workflows").set(0.0);
        if remaining.is_empty() {
            info!("No active workflows at shutdown");
            return Ok(0);
        }

        let total = remaining.len();
        error!("==============================================================");
        error!(
            "{} active workflows at shutdown, resubmitting to queue '{}'",
            total,
            self.recovery_queue.name()
        );
        error!("==============================================================");

        let mut failed = 0;
        for (instance_id, entry) in remaining {
            entry.abort.abort();
            let message = Message::task(entry.task);
            match self.recovery_queue.push(&message).await {
                Ok(_) => {
                    warn!(instance_id = %instance_id, "Workflow resubmitted for recovery");
                    metrics::counter!("taskmgmt_workflows_recovered_total").increment(1);
                }
                Err(e) => {
                    failed += 1;
                    error!(
                        instance_id = %instance_id,
                        "Failed to resubmit workflow, work may be lost: {}",
                        e
                    );
                }
            }
        }

        if failed > 0 {
            return Err(TaskMgmtError::RecoveryFailed { failed, total });
        }
        Ok(total)
    }
}

impl std::fmt::Debug for ActiveWorkflowWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveWorkflowWorker")
            .field("pool", &self.pool)
            .field("active", &self.len())
            .field("recovery_queue", &self.recovery_queue.name())
            .finish()
    }
}
