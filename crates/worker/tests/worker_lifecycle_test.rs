mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{test_handlers, wait_until};
use taskmgmt_core::{Message, MessageBus, TaskDescriptor};
use taskmgmt_infrastructure::{DurableQueue, KvClient, KvMessageBus};
use taskmgmt_worker::{ActiveWorkflowWorker, TaskDispatcher, WorkerLifecycle, WorkerPool};
use tokio::sync::broadcast;

const INBOUND: &str = "acs.workflow";
const DEAD_LETTER: &str = "acs.workflow.dead-letter";

fn task_message(task_type: &str) -> Message {
    Message::task(TaskDescriptor::new(task_type, serde_json::json!({})))
}

#[tokio::test]
async fn test_poll_consumes_only_available_capacity() {
    let handlers = test_handlers();
    let bus = Arc::new(KvMessageBus::new(KvClient::in_memory()));
    let pool = Arc::new(WorkerPool::new("worker-1", handlers.registry.clone(), 2));
    for _ in 0..3 {
        bus.publish(INBOUND, &task_message("gated")).await.unwrap();
    }

    let lifecycle = WorkerLifecycle::new(
        "worker-1",
        Arc::clone(&bus) as Arc<dyn MessageBus>,
        INBOUND,
        Duration::from_millis(10),
        Arc::clone(&pool) as Arc<dyn TaskDispatcher>,
    );

    assert_eq!(lifecycle.poll_once().await.unwrap(), 2);
    assert_eq!(pool.outstanding(), 2);
    assert_eq!(bus.pending(INBOUND).await.unwrap(), 1);

    // 没有剩余容量时不消费
    assert_eq!(lifecycle.poll_once().await.unwrap(), 0);
    assert_eq!(bus.pending(INBOUND).await.unwrap(), 1);

    wait_until(|| handlers.started.load(Ordering::SeqCst) == 2).await;
    handlers.gate.notify_waiters();
    wait_until(|| pool.outstanding() == 0).await;

    assert_eq!(lifecycle.poll_once().await.unwrap(), 1);
    assert_eq!(bus.pending(INBOUND).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_task_type_moves_to_dead_letter() {
    let handlers = test_handlers();
    let bus = Arc::new(KvMessageBus::new(KvClient::in_memory()));
    let pool = Arc::new(WorkerPool::new("worker-1", handlers.registry.clone(), 2));
    let unknown = task_message("TypeA");
    bus.publish(INBOUND, &unknown).await.unwrap();

    let lifecycle = WorkerLifecycle::new(
        "worker-1",
        Arc::clone(&bus) as Arc<dyn MessageBus>,
        INBOUND,
        Duration::from_millis(10),
        Arc::clone(&pool) as Arc<dyn TaskDispatcher>,
    );
    assert_eq!(lifecycle.dead_letter_address(), "acs.workflow.dead-letter");

    assert_eq!(lifecycle.poll_once().await.unwrap(), 0);
    assert_eq!(bus.pending(INBOUND).await.unwrap(), 0);

    // 后续轮询不会再看到它
    assert_eq!(lifecycle.poll_once().await.unwrap(), 0);
    let dead = bus.consume(DEAD_LETTER, 10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, unknown.id);
    assert_eq!(dead[0].retry_count, 0);
}

#[tokio::test]
async fn test_rejected_message_is_redelivered_until_limit() {
    let handlers = test_handlers();
    let kv = KvClient::in_memory();
    let bus = Arc::new(KvMessageBus::new(kv.clone()));
    let worker = Arc::new(ActiveWorkflowWorker::new(
        "worker-1",
        handlers.registry.clone(),
        2,
        DurableQueue::new(kv, INBOUND),
        Duration::from_millis(50),
    ));
    let running = TaskDescriptor::workflow("pending", "wf-1", serde_json::json!({}));
    assert!(worker.dispatch(running.clone()).unwrap().is_admitted());

    let duplicate = Message::task(running);
    bus.publish(INBOUND, &duplicate).await.unwrap();

    let lifecycle = WorkerLifecycle::new(
        "worker-1",
        Arc::clone(&bus) as Arc<dyn MessageBus>,
        INBOUND,
        Duration::from_millis(10),
        Arc::clone(&worker) as Arc<dyn TaskDispatcher>,
    )
    .with_max_redeliveries(2);

    assert_eq!(lifecycle.poll_once().await.unwrap(), 0);
    let returned = bus.consume(INBOUND, 10).await.unwrap();
    assert_eq!(returned.len(), 1);
    assert_eq!(returned[0].id, duplicate.id);
    assert_eq!(returned[0].retry_count, 1);
    bus.requeue(INBOUND, &returned[0]).await.unwrap();

    assert_eq!(lifecycle.poll_once().await.unwrap(), 0);
    assert_eq!(bus.pending(INBOUND).await.unwrap(), 1);
    assert_eq!(bus.pending(DEAD_LETTER).await.unwrap(), 0);

    // 第三次被拒绝时超过上限
    assert_eq!(lifecycle.poll_once().await.unwrap(), 0);
    assert_eq!(bus.pending(INBOUND).await.unwrap(), 0);
    let dead = bus.consume(DEAD_LETTER, 10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, duplicate.id);
    assert_eq!(dead[0].retry_count, 3);
    assert_eq!(worker.active_instances(), vec!["wf-1"]);
}

#[tokio::test]
async fn test_invalid_workflow_message_is_discarded() {
    let handlers = test_handlers();
    let kv = KvClient::in_memory();
    let bus = Arc::new(KvMessageBus::new(kv.clone()));
    let worker = Arc::new(ActiveWorkflowWorker::new(
        "worker-1",
        handlers.registry.clone(),
        2,
        DurableQueue::new(kv, INBOUND),
        Duration::from_millis(50),
    ));
    bus.publish(INBOUND, &task_message("pending")).await.unwrap();
    bus.publish(
        INBOUND,
        &Message::task(TaskDescriptor::workflow(
            "pending",
            "wf-1",
            serde_json::json!({}),
        )),
    )
    .await
    .unwrap();

    let lifecycle = WorkerLifecycle::new(
        "worker-1",
        Arc::clone(&bus) as Arc<dyn MessageBus>,
        INBOUND,
        Duration::from_millis(10),
        Arc::clone(&worker) as Arc<dyn TaskDispatcher>,
    );

    assert_eq!(lifecycle.poll_once().await.unwrap(), 1);
    assert_eq!(worker.active_instances(), vec!["wf-1"]);
    assert_eq!(bus.pending(INBOUND).await.unwrap(), 0);
}

#[tokio::test]
async fn test_polling_stops_on_shutdown_signal() {
    let handlers = test_handlers();
    let bus = Arc::new(KvMessageBus::new(KvClient::in_memory()));
    let pool = Arc::new(WorkerPool::new("worker-1", handlers.registry.clone(), 1));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let lifecycle = Arc::new(WorkerLifecycle::new(
        "worker-1",
        Arc::clone(&bus) as Arc<dyn MessageBus>,
        INBOUND,
        Duration::from_millis(5),
        Arc::clone(&pool) as Arc<dyn TaskDispatcher>,
    ));
    let handle = lifecycle.spawn(shutdown_rx);

    bus.publish(INBOUND, &task_message("gated")).await.unwrap();
    wait_until(|| handlers.started.load(Ordering::SeqCst) == 1).await;

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();

    // 循环退出后发布的消息不再被消费
    bus.publish(INBOUND, &task_message("gated")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(bus.pending(INBOUND).await.unwrap(), 1);
    assert_eq!(pool.outstanding(), 1);

    handlers.gate.notify_waiters();
}
