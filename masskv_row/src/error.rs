use masskv_thread::AllocError;

/// Result type alias for row operations.
pub type Result<T> = std::result::Result<T, RowError>;

/// Row layer errors.
#[derive(Debug, thiserror::Error)]
pub enum RowError {
    /// The thread context could not allocate.
    #[error(transparent)]
    Alloc(#[from] AllocError),
    /// Checkpoint input is truncated or malformed.
    #[error("corrupt checkpoint reading {what}: needed {needed} bytes, {available} available")]
    Corrupt {
        /// Field being decoded.
        what: &'static str,
        /// Bytes the field requires.
        needed: usize,
        /// Bytes left in the input.
        available: usize,
    },
    /// A caller broke an operation's precondition.
    #[error("precondition violated: {0}")]
    Precondition(String),
}
