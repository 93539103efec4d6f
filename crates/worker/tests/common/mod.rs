#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use taskmgmt_core::{
    HandlerCatalog, TaskContext, TaskHandler, TaskMgmtError, TaskMgmtResult, TaskOutcome,
    TaskTypeRegistry,
};
use tokio::sync::Notify;

/// 等待放行信号后才完成的处理器
pub struct GatedHandler {
    pub gate: Arc<Notify>,
    pub started: Arc<AtomicUsize>,
}

#[async_trait]
impl TaskHandler for GatedHandler {
    fn task_type(&self) -> &str {
        "gated"
    }

    async fn execute(&self, _context: &TaskContext) -> TaskMgmtResult<TaskOutcome> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        Ok(TaskOutcome::empty())
    }
}

/// 永远不会完成的处理器
pub struct PendingHandler;

#[async_trait]
impl TaskHandler for PendingHandler {
    fn task_type(&self) -> &str {
        "pending"
    }

    async fn execute(&self, _context: &TaskContext) -> TaskMgmtResult<TaskOutcome> {
        std::future::pending::<()>().await;
        Ok(TaskOutcome::empty())
    }
}

pub struct FailingHandler;

#[async_trait]
impl TaskHandler for FailingHandler {
    fn task_type(&self) -> &str {
        "failing"
    }

    async fn execute(&self, _context: &TaskContext) -> TaskMgmtResult<TaskOutcome> {
        Err(TaskMgmtError::TaskExecution("device unreachable".to_string()))
    }
}

pub struct TestHandlers {
    pub gate: Arc<Notify>,
    pub started: Arc<AtomicUsize>,
    pub registry: TaskTypeRegistry,
}

pub fn test_handlers() -> TestHandlers {
    let gate = Arc::new(Notify::new());
    let started = Arc::new(AtomicUsize::new(0));

    let mut catalog = HandlerCatalog::new();
    let (gate_clone, started_clone) = (Arc::clone(&gate), Arc::clone(&started));
    catalog
        .register("gated", move || GatedHandler {
            gate: Arc::clone(&gate_clone),
            started: Arc::clone(&started_clone),
        })
        .register("pending", || PendingHandler)
        .register("failing", || FailingHandler);

    let registry = catalog
        .resolve(&[
            "gated".to_string(),
            "pending".to_string(),
            "failing".to_string(),
        ])
        .unwrap();

    TestHandlers {
        gate,
        started,
        registry,
    }
}

/// 轮询直到条件成立，最多等待一秒
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
