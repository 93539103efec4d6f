use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::future::{abortable, AbortHandle, Aborted};
use taskmgmt_core::{TaskContext, TaskDescriptor, TaskRunStatus, TaskTypeRegistry};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// 任务未被接纳的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// 未完成任务数已达上限
    AtCapacity,
    /// Worker池正在排空或已停止
    Draining,
    /// 注册表中没有该任务类型
    UnknownTaskType,
    /// 同一个工作流实例已在本进程中运行
    DuplicateInstance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Admitted,
    Rejected(RejectReason),
}

impl DispatchOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, DispatchOutcome::Admitted)
    }
}

/// Worker池状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Idle,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Accepting,
    Draining,
    Stopped,
}

/// 一次接纳的唯一标识
///
/// 同一个任务描述符可能先后被接纳多次，完成回调用它区分是哪一次执行结束。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdmissionId(u64);

/// 任务接纳与完成的观察者
///
/// `task_admitted` 在持有Worker池内部状态时同步调用，实现中不能等待异步操作，
/// 它在任务开始执行之前调用，返回 `Err` 会撤销这次接纳。
/// `task_finished` 收到的 [`AdmissionId`] 与对应的 `task_admitted` 相同。
pub trait TaskObserver: Send + Sync {
    fn task_admitted(
        &self,
        admission: AdmissionId,
        task: &TaskDescriptor,
        abort: AbortHandle,
    ) -> Result<(), RejectReason>;

    fn task_finished(&self, admission: AdmissionId, task: &TaskDescriptor, status: TaskRunStatus);
}

/// 有界并发的Worker池
///
/// 每个运行中的任务持有一个信号量许可，未完成任务数即已发出的许可数，
/// 因此 `0 <= outstanding <= max_outstanding` 始终成立。
/// 达到上限时新任务不会被缓冲，而是直接拒绝，由消息总线决定何时重新投递。
#[derive(Clone)]
pub struct WorkerPool {
    worker_id: String,
    registry: TaskTypeRegistry,
    max_outstanding: usize,
    permits: Arc<Semaphore>,
    lifecycle: Arc<Mutex<Lifecycle>>,
    next_admission: Arc<AtomicU64>,
    observer: Option<Arc<dyn TaskObserver>>,
}

impl WorkerPool {
    pub fn new(
        worker_id: impl Into<String>,
        registry: TaskTypeRegistry,
        max_outstanding: usize,
    ) -> Self {
        let max_outstanding = max_outstanding.max(1);
        Self {
            worker_id: worker_id.into(),
            registry,
            max_outstanding,
            permits: Arc::new(Semaphore::new(max_outstanding)),
            lifecycle: Arc::new(Mutex::new(Lifecycle::Accepting)),
            next_admission: Arc::new(AtomicU64::new(0)),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TaskObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn max_outstanding(&self) -> usize {
        self.max_outstanding
    }

    pub fn outstanding(&self) -> usize {
        self.max_outstanding
            .saturating_sub(self.permits.available_permits())
    }

    pub fn available_capacity(&self) -> usize {
        if self.lifecycle() == Lifecycle::Accepting {
            self.permits.available_permits()
        } else {
            0
        }
    }

    pub fn registered_task_types(&self) -> &[String] {
        self.registry.task_types()
    }

    pub fn state(&self) -> PoolState {
        match self.lifecycle() {
            Lifecycle::Accepting if self.outstanding() == 0 => PoolState::Idle,
            Lifecycle::Accepting => PoolState::Running,
            Lifecycle::Draining => PoolState::Draining,
            Lifecycle::Stopped => PoolState::Stopped,
        }
    }

    pub fn can_accept(&self, task_type_id: &str) -> bool {
        self.available_capacity() > 0 && self.registry.contains(task_type_id)
    }

    /// 尝试接纳并执行一个任务
    ///
    /// 接纳成功时处理器立即在独立的tokio任务中运行，本方法不等待执行结果。
    pub fn dispatch(&self, task: TaskDescriptor) -> DispatchOutcome {
        let lifecycle = self.lock_lifecycle();
        if *lifecycle != Lifecycle::Accepting {
            return self.reject(&task, RejectReason::Draining);
        }

        let Some(handler) = self.registry.get(&task.task_type_id) else {
            return self.reject(&task, RejectReason::UnknownTaskType);
        };

        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            return self.reject(&task, RejectReason::AtCapacity);
        };

        let context = TaskContext::new(self.worker_id.clone(), task.clone());
        let (execution, abort_handle) =
            abortable(async move { handler.execute(&context).await });

        let admission = AdmissionId(self.next_admission.fetch_add(1, Ordering::Relaxed));
        if let Some(observer) = &self.observer {
            if let Err(reason) = observer.task_admitted(admission, &task, abort_handle) {
                drop(permit);
                return self.reject(&task, reason);
            }
        }

        debug!(
            task_type = %task.task_type_id,
            instance_id = ?task.workflow_instance_id,
            "Task admitted"
        );
        metrics::counter!("taskmgmt_worker_tasks_dispatched_total", "task_type" => task.task_type_id.clone())
            .increment(1);
        metrics::gauge!("taskmgmt_worker_outstanding_tasks").set(self.outstanding() as f64);

        let observer = self.observer.clone();
        let permits = Arc::clone(&self.permits);
        let max_outstanding = self.max_outstanding;

        tokio::spawn(async move {
            let started = Instant::now();
            let status = match execution.await {
                Ok(Ok(outcome)) if outcome.success => TaskRunStatus::Completed,
                Ok(Ok(outcome)) => {
                    warn!(
                        task_type = %task.task_type_id,
                        "Task failed: {}",
                        outcome.error_message.as_deref().unwrap_or("unknown error")
                    );
                    TaskRunStatus::Failed
                }
                Ok(Err(e)) => {
                    error!(task_type = %task.task_type_id, "Task handler error: {}", e);
                    TaskRunStatus::Failed
                }
                Err(Aborted) => TaskRunStatus::Cancelled,
            };

            info!(
                task_type = %task.task_type_id,
                instance_id = ?task.workflow_instance_id,
                "Task finished with status {} in {:?}",
                status,
                started.elapsed()
            );

            if let Some(observer) = &observer {
                observer.task_finished(admission, &task, status);
            }
            metrics::counter!("taskmgmt_worker_tasks_finished_total", "status" => status.to_string())
                .increment(1);

            drop(permit);
            let outstanding = max_outstanding.saturating_sub(permits.available_permits());
            metrics::gauge!("taskmgmt_worker_outstanding_tasks").set(outstanding as f64);
        });

        drop(lifecycle);
        DispatchOutcome::Admitted
    }

    /// 停止接纳新任务并等待运行中的任务完成
    ///
    /// 在 `timeout` 内全部完成返回 `true`。无论是否超时，池最终都进入 `Stopped`。
    pub async fn drain(&self, timeout: Duration) -> bool {
        {
            let mut lifecycle = self.lock_lifecycle();
            if *lifecycle == Lifecycle::Stopped {
                return self.outstanding() == 0;
            }
            *lifecycle = Lifecycle::Draining;
        }
        info!(
            worker_id = %self.worker_id,
            "Draining worker pool, {} tasks outstanding",
            self.outstanding()
        );

        let all_permits = u32::try_from(self.max_outstanding).unwrap_or(u32::MAX);
        let drained = matches!(
            tokio::time::timeout(timeout, self.permits.acquire_many(all_permits)).await,
            Ok(Ok(_))
        );

        if !drained {
            warn!(
                worker_id = %self.worker_id,
                "Drain timed out after {:?} with {} tasks outstanding",
                timeout,
                self.outstanding()
            );
        }

        *self.lock_lifecycle() = Lifecycle::Stopped;
        info!(worker_id = %self.worker_id, "Worker pool stopped");
        drained
    }

    fn reject(&self, task: &TaskDescriptor, reason: RejectReason) -> DispatchOutcome {
        debug!(
            task_type = %task.task_type_id,
            instance_id = ?task.workflow_instance_id,
            "Task rejected: {:?}",
            reason
        );
        metrics::counter!("taskmgmt_worker_tasks_rejected_total", "reason" => format!("{reason:?}"))
            .increment(1);
        DispatchOutcome::Rejected(reason)
    }

    fn lifecycle(&self) -> Lifecycle {
        *self.lock_lifecycle()
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("worker_id", &self.worker_id)
            .field("max_outstanding", &self.max_outstanding)
            .field("outstanding", &self.outstanding())
            .field("task_types", &self.registry.task_types())
            .finish()
    }
}
