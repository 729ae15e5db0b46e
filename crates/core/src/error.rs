use thiserror::Error;

/// Error taxonomy for the sniping pipeline.
///
/// Variants map one-to-one onto the handling classes the components apply:
/// [`SnipeError::Transient`] gets a bounded retry, lock contention and
/// filter misses are never errors at all, and [`SnipeError::Invariant`]
/// aborts with no side effects because it signals a data-integrity problem
/// upstream.
#[derive(Debug, Error)]
pub enum SnipeError {
    #[error("lock store error: {0}")]
    LockStore(String),

    #[error("job queue error: {0}")]
    Queue(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("transient i/o failure: {0}")]
    Transient(String),

    #[error("insufficient funds: required {required_lamports} lamports, available {available_lamports}")]
    InsufficientFunds {
        required_lamports: u64,
        available_lamports: u64,
    },

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl SnipeError {
    /// Whether a bounded retry is worth attempting.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
