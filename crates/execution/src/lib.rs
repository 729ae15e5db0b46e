//! Buy-job execution: the balance cache, the per-job worker, and the
//! rate-limited worker pool.

pub mod balance;
pub mod pool;
pub mod worker;

pub use balance::{required_lamports, BalanceCache};
pub use pool::ExecutionWorkerPool;
pub use worker::{AbortReason, ExecutionWorker, JobOutcome};
