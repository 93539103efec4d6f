pub mod durable_queue;
pub mod kv;
pub mod lock;
pub mod message_bus;

pub use durable_queue::DurableQueue;
pub use kv::{
    FromKvReply, InMemoryKvTransport, KvClient, KvCommand, KvReply, KvTransport,
    RedisKvTransport, SetCondition, SetOptions,
};
pub use lock::DistributedLock;
pub use message_bus::KvMessageBus;
