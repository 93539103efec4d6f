pub mod components;
pub mod connection_request;
pub mod handlers;

pub use components::{
    ActiveWorkflowWorker, AdmissionId, DispatchOutcome, PoolState, RejectReason, TaskDispatcher,
    TaskObserver, WorkerLifecycle, WorkerPool,
};
pub use connection_request::{
    ConnectionRequestCoordinator, ConnectionRequestSender, ConnectionRequestStatus,
    ConnectionRequestWorker, HttpConnectionRequestSender,
};
pub use handlers::{builtin_catalog, ConnectionRequestTask, ExclusiveHandler};
