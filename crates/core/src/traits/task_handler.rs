//! 任务处理器接口定义
//!
//! 处理器是实际执行某一类任务的组件。每个任务类型标识在进程启动时
//! 由 [`crate::HandlerCatalog`] 解析为一个处理器实例，Worker池按
//! 任务描述符中的 `task_type_id` 找到处理器并调用 [`TaskHandler::execute`]。

use async_trait::async_trait;

use crate::{
    models::{TaskDescriptor, TaskOutcome},
    Result,
};

/// 任务执行上下文
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// 执行该任务的Worker标识，也用作分布式锁的持有者ID
    pub worker_id: String,
    pub task: TaskDescriptor,
}

impl TaskContext {
    pub fn new(worker_id: impl Into<String>, task: TaskDescriptor) -> Self {
        Self {
            worker_id: worker_id.into(),
            task,
        }
    }
}

/// 任务处理器核心接口
///
/// 实现必须是 `Send + Sync`，同一个实例会被多个并发任务共享。
/// 返回 `Err` 与返回失败的 [`TaskOutcome`] 对Worker池而言等价，
/// 都会使任务以 `FAILED` 结束。
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// 处理器对应的任务类型标识
    fn task_type(&self) -> &str;

    async fn execute(&self, context: &TaskContext) -> Result<TaskOutcome>;
}
