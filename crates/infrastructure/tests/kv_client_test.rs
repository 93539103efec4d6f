use std::sync::Arc;

use async_trait::async_trait;
use mockall::mock;
use serde_json::Map;
use taskmgmt_core::{KvError, KvResult};
use taskmgmt_infrastructure::{KvClient, KvCommand, KvReply, KvTransport, SetOptions};

mock! {
    pub Transport {}

    #[async_trait]
    impl KvTransport for Transport {
        async fn execute(&self, command: KvCommand) -> KvResult<KvReply>;
    }
}

#[tokio::test]
async fn test_conflicting_set_conditions_never_reach_store() {
    let mut transport = MockTransport::new();
    transport.expect_execute().never();
    let client = KvClient::new(Arc::new(transport));

    let result = client
        .set("device:OUI-SN1", "v", SetOptions::new().not_exist().exist())
        .await;

    assert_eq!(result, Err(KvError::ConflictingSetConditions));
}

#[tokio::test]
async fn test_store_failure_becomes_typed_error() {
    let mut transport = MockTransport::new();
    transport
        .expect_execute()
        .times(1)
        .returning(|_| Ok(KvReply::Error("ERR value is not an integer".to_string())));
    let client = KvClient::new(Arc::new(transport));

    let result = client.llen("queue").await;

    match result {
        Err(KvError::Store { command, message }) => {
            assert_eq!(command, "LLEN");
            assert!(message.contains("not an integer"));
        }
        other => panic!("expected store error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unexpected_shape_is_a_defect() {
    let mut transport = MockTransport::new();
    transport
        .expect_execute()
        .returning(|_| Ok(KvReply::Text("3".to_string())));
    let client = KvClient::new(Arc::new(transport));

    let result = client.llen("queue").await;

    assert_eq!(
        result,
        Err(KvError::UnexpectedShape {
            expected: "integer",
            actual: "string"
        })
    );
}

#[tokio::test]
async fn test_structured_object_shape() {
    let mut object = Map::new();
    object.insert("status".to_string(), serde_json::json!("online"));
    let reply = KvReply::Object(object.clone());

    let mut transport = MockTransport::new();
    transport
        .expect_execute()
        .returning(move |_| Ok(reply.clone()));
    let client = KvClient::new(Arc::new(transport));

    let result = client
        .query::<Map<String, serde_json::Value>>(KvCommand::Get {
            key: "device:OUI-SN1".to_string(),
        })
        .await;

    assert_eq!(result, Ok(Some(object)));
}

#[tokio::test]
async fn test_set_passes_px_only_for_positive_expiration() {
    let mut transport = MockTransport::new();
    transport
        .expect_execute()
        .withf(|command| {
            matches!(
                command,
                KvCommand::Set {
                    expiration_ms: None,
                    condition: None,
                    ..
                }
            )
        })
        .times(1)
        .returning(|_| Ok(KvReply::Text("OK".to_string())));
    let client = KvClient::new(Arc::new(transport));

    let result = client
        .set("key", "value", SetOptions::new().expiration_ms(0))
        .await;

    assert_eq!(result, Ok(Some("OK".to_string())));
}

#[tokio::test]
async fn test_transport_failure_propagates() {
    let mut transport = MockTransport::new();
    transport
        .expect_execute()
        .returning(|_| Err(KvError::Connection("connection refused".to_string())));
    let client = KvClient::new(Arc::new(transport));

    assert!(matches!(
        client.get("key").await,
        Err(KvError::Connection(_))
    ));
}

#[tokio::test]
async fn test_get_set_and_missing_value() {
    let client = KvClient::in_memory();

    assert_eq!(client.get("missing").await, Ok(None));
    assert_eq!(
        client.set("key", "value", SetOptions::new()).await,
        Ok(Some("OK".to_string()))
    );
    assert_eq!(client.get("key").await, Ok(Some("value".to_string())));
    assert_eq!(client.del("key").await, Ok(Some(1)));
    assert_eq!(client.get("key").await, Ok(None));
}

#[tokio::test]
async fn test_conditional_set() {
    let client = KvClient::in_memory();

    assert_eq!(
        client.set("key", "v1", SetOptions::new().exist()).await,
        Ok(None)
    );
    assert_eq!(
        client.set("key", "v1", SetOptions::new().not_exist()).await,
        Ok(Some("OK".to_string()))
    );
    assert_eq!(
        client.set("key", "v2", SetOptions::new().not_exist()).await,
        Ok(None)
    );
    assert_eq!(
        client.set("key", "v3", SetOptions::new().exist()).await,
        Ok(Some("OK".to_string()))
    );
    assert_eq!(client.get("key").await, Ok(Some("v3".to_string())));
}

#[tokio::test(start_paused = true)]
async fn test_expiration() {
    let client = KvClient::in_memory();
    client
        .set("key", "value", SetOptions::new().expiration_ms(1000))
        .await
        .unwrap();

    tokio::time::advance(std::time::Duration::from_millis(999)).await;
    assert_eq!(client.get("key").await, Ok(Some("value".to_string())));

    tokio::time::advance(std::time::Duration::from_millis(1)).await;
    assert_eq!(client.get("key").await, Ok(None));
}

#[tokio::test]
async fn test_list_operations() {
    let client = KvClient::in_memory();

    assert_eq!(client.rpush("queue", "b").await, Ok(Some(1)));
    assert_eq!(client.rpush("queue", "c").await, Ok(Some(2)));
    assert_eq!(client.lpush("queue", "a").await, Ok(Some(3)));
    assert_eq!(client.rpush("queue", "b").await, Ok(Some(4)));
    assert_eq!(
        client.lrange("queue", 0, -1).await,
        Ok(Some(vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "b".to_string()
        ]))
    );

    assert_eq!(client.lrem("queue", "b").await, Ok(Some(1)));
    assert_eq!(
        client.lrange("queue", 0, -1).await,
        Ok(Some(vec!["a".to_string(), "c".to_string(), "b".to_string()]))
    );

    assert_eq!(client.lpop("queue").await, Ok(Some("a".to_string())));
    assert_eq!(client.llen("queue").await, Ok(Some(2)));
    assert_eq!(client.lrem("queue", "missing").await, Ok(Some(0)));
}

#[tokio::test]
async fn test_set_operations() {
    let client = KvClient::in_memory();

    assert_eq!(client.sadd("devices", "OUI-SN2").await, Ok(Some(1)));
    assert_eq!(client.sadd("devices", "OUI-SN1").await, Ok(Some(1)));
    assert_eq!(client.sadd("devices", "OUI-SN1").await, Ok(Some(0)));
    assert_eq!(
        client.smembers("devices").await,
        Ok(Some(vec!["OUI-SN1".to_string(), "OUI-SN2".to_string()]))
    );
    assert_eq!(client.smembers("empty").await, Ok(Some(Vec::new())));
}

#[tokio::test]
async fn test_sorted_set_operations() {
    let client = KvClient::in_memory();

    client.zadd("schedule", 300, "c").await.unwrap();
    client.zadd("schedule", 100, "a").await.unwrap();
    client.zadd("schedule", 200, "b").await.unwrap();
    assert_eq!(client.zadd("schedule", 400, "a").await, Ok(Some(0)));

    assert_eq!(
        client.zrange("schedule", 0, -1).await,
        Ok(Some(vec!["b".to_string(), "c".to_string(), "a".to_string()]))
    );
    assert_eq!(
        client.zrange_by_score("schedule", 0, 350, 0, 10).await,
        Ok(Some(vec!["b".to_string(), "c".to_string()]))
    );
    assert_eq!(
        client.zrange_by_score("schedule", 0, 1000, 1, 1).await,
        Ok(Some(vec!["c".to_string()]))
    );

    assert_eq!(client.zrem("schedule", "c").await, Ok(Some(1)));
    assert_eq!(client.zrem("schedule", "c").await, Ok(Some(0)));
}

#[tokio::test]
async fn test_ping() {
    let client = KvClient::in_memory();
    assert_eq!(client.ping().await, Ok(()));
}
