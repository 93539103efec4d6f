pub mod active_workflow;
pub mod worker_lifecycle;
pub mod worker_pool;

pub use active_workflow::ActiveWorkflowWorker;
pub use worker_lifecycle::{TaskDispatcher, WorkerLifecycle, DEFAULT_MAX_REDELIVERIES};
pub use worker_pool::{AdmissionId, DispatchOutcome, PoolState, RejectReason, TaskObserver, WorkerPool};
