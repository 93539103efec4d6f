//! 连接请求
//!
//! [`ConnectionRequestCoordinator`] 记录每个设备的连接请求状态，并把请求发布给
//! [`ConnectionRequestWorker`]；后者执行请求并回写状态。

pub mod coordinator;
pub mod executor;

pub use coordinator::{ConnectionRequestCoordinator, ConnectionRequestStatus};
pub use executor::{ConnectionRequestSender, ConnectionRequestWorker, HttpConnectionRequestSender};
