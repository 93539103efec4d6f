pub mod message_bus;
pub mod task_handler;

pub use message_bus::MessageBus;
pub use task_handler::{TaskContext, TaskHandler};
