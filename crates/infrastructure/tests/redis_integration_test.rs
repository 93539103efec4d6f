use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use taskmgmt_core::{config::LockConfig, KvError, Message, MessageBus, TaskDescriptor};
use taskmgmt_infrastructure::{
    DistributedLock, KvClient, KvMessageBus, RedisKvTransport, SetOptions,
};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::redis::Redis;

struct RedisTestSetup {
    #[allow(dead_code)]
    container: ContainerAsync<Redis>,
    client: KvClient,
}

impl RedisTestSetup {
    async fn new() -> Result<Self> {
        let container = Redis::default().with_tag("7-alpine").start().await?;
        let port = container.get_host_port_ipv4(6379).await?;
        let transport = RedisKvTransport::connect_url(
            &format!("redis://localhost:{port}"),
            5,
            Duration::from_secs(1),
            Duration::from_secs(5),
        )
        .await?;

        Ok(Self {
            container,
            client: KvClient::new(Arc::new(transport)),
        })
    }
}

#[tokio::test]
#[ignore] // 需要Docker运行Redis容器
async fn test_redis_typed_results() -> Result<()> {
    let setup = RedisTestSetup::new().await?;
    let kv = &setup.client;

    kv.ping().await?;
    assert_eq!(kv.get("missing").await?, None);
    assert_eq!(
        kv.set("key", "value", SetOptions::new().expiration_ms(60_000))
            .await?,
        Some("OK".to_string())
    );
    assert_eq!(kv.set("key", "other", SetOptions::new().not_exist()).await?, None);
    assert_eq!(kv.get("key").await?, Some("value".to_string()));

    assert_eq!(kv.rpush("queue", "a").await?, Some(1));
    assert_eq!(kv.rpush("queue", "b").await?, Some(2));
    assert_eq!(kv.lrem("queue", "a").await?, Some(1));
    assert_eq!(kv.llen("queue").await?, Some(1));

    kv.zadd("schedule", 10, "x").await?;
    kv.zadd("schedule", 20, "y").await?;
    assert_eq!(
        kv.zrange_by_score("schedule", 0, 15, 0, 10).await?,
        Some(vec!["x".to_string()])
    );

    // 对列表执行 GET 是存储层面的失败
    assert!(matches!(
        kv.get("queue").await,
        Err(KvError::Store { command: "GET", .. })
    ));

    Ok(())
}

#[tokio::test]
#[ignore] // 需要Docker运行Redis容器
async fn test_redis_lock_and_bus() -> Result<()> {
    let setup = RedisTestSetup::new().await?;
    let lock = DistributedLock::new(setup.client.clone(), LockConfig::default());

    let ttl = Duration::from_millis(1500);
    let retry = Duration::from_millis(1000);
    assert!(lock.acquire("lock:device-42", "W1", ttl, retry, 0).await);
    assert!(!lock.acquire("lock:device-42", "W2", ttl, retry, 0).await);
    assert!(lock.acquire("lock:device-42", "W2", ttl, retry, 2).await);

    let bus = KvMessageBus::new(setup.client.clone());
    let message = Message::task(TaskDescriptor::new("reboot", serde_json::json!({})));
    bus.publish("inbound", &message).await?;
    let consumed = bus.consume("inbound", 10).await?;
    assert_eq!(consumed, vec![message]);

    Ok(())
}
