//! Cross-process coordination primitives: the two-layer wallet/sniper
//! lock and the priority-ordered buy-job queue, each with a Redis and an
//! in-memory implementation sharing identical semantics.

pub mod lock;
pub mod memory;
pub mod queue;
pub mod redis_store;

pub use lock::{acquire_pair, lock_key, LockLevel, LockScope, PairLock};
pub use memory::{MemoryJobQueue, MemoryLockStore};
pub use queue::{queue_priority, BuyJob, JobQueue};
pub use redis_store::{RedisJobQueue, RedisLockStore};
