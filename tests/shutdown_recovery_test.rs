use std::sync::Arc;
use std::time::Duration;

use taskmgmt::app::{AppMode, Application};
use taskmgmt::shutdown::ShutdownManager;
use taskmgmt_core::{AppConfig, Message, MessageBus, MessageKind, TaskDescriptor};
use taskmgmt_infrastructure::{DurableQueue, KvMessageBus, SetOptions};
use tokio::time::{timeout, Instant};

const RECOVERY_QUEUE: &str = "taskmgmt.workflow.recovery";

fn config() -> AppConfig {
    // 排空期和关闭超时使用默认值
    AppConfig::from_toml(
        r#"
[redis]
backend = "memory"

[worker]
worker_id = "worker-shutdown"
classNames = ["connection-request"]
poll_interval_ms = 10
recovery_queue = "taskmgmt.workflow.recovery"

[lock]
max_retries = 100
"#,
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_workflow_recovered_within_shutdown_timeout() {
    let config = config();
    let inbound = config.worker.inbound_address.clone();
    let drain_timeout = Duration::from_millis(config.worker.drain_timeout_ms);
    let lock_key = config.lock.lock_key("OUI-SN1");

    let app = Arc::new(
        Application::new(config, AppMode::WorkflowWorker)
            .await
            .unwrap(),
    );
    assert!(app.shutdown_timeout() > drain_timeout);

    // 设备锁被其他持有者占用，工作流停在重试获取锁上
    app.kv()
        .set(
            &lock_key,
            "worker-other",
            SetOptions::new().expiration_ms(600_000).not_exist(),
        )
        .await
        .unwrap()
        .unwrap();

    let shutdown = ShutdownManager::new();
    let handle = {
        let app = Arc::clone(&app);
        let shutdown_rx = shutdown.subscribe().await;
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    let bus = KvMessageBus::new(app.kv().clone());
    bus.publish(
        &inbound,
        &Message::task(TaskDescriptor::workflow(
            "connection-request",
            "wf-1",
            serde_json::json!({"deviceId": "OUI-SN1", "url": "http://127.0.0.1:1/"}),
        )),
    )
    .await
    .unwrap();

    let worker = Arc::clone(app.workflow_worker().unwrap());
    timeout(Duration::from_secs(5), async {
        while !worker.contains("wf-1") {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let started = Instant::now();
    shutdown.shutdown().await;
    timeout(app.shutdown_timeout(), handle)
        .await
        .expect("shutdown did not finish within the configured timeout")
        .unwrap()
        .unwrap();
    assert!(started.elapsed() >= drain_timeout);

    assert!(worker.is_empty());
    let recovered = DurableQueue::new(app.kv().clone(), RECOVERY_QUEUE)
        .peek_all()
        .await
        .unwrap();
    assert_eq!(recovered.len(), 1);
    match &recovered[0].kind {
        MessageKind::Task(task) => {
            assert_eq!(task.task_type_id, "connection-request");
            assert_eq!(task.workflow_instance_id.as_deref(), Some("wf-1"));
        }
        other => panic!("unexpected recovered message {other:?}"),
    }
    assert_eq!(bus.pending(&inbound).await.unwrap(), 0);
}
