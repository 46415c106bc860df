use thiserror::Error;

/// Failure modes the table recognizes. Precondition violations that the
/// reference implementation treats as fatal assertions (bad internal resize
/// requests, out-of-range group indices) remain `debug_assert!`s here rather
/// than error variants, since they indicate a bug in this crate rather than
/// a caller-recoverable condition.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// The aligned group array could not be obtained from the allocator.
    #[error("failed to allocate the group array")]
    Allocation,

    /// The requested logical capacity overflows the group-count arithmetic.
    #[error("requested capacity overflows the table's internal group count")]
    CapacityOverflow,
}

pub type Result<T> = std::result::Result<T, TableError>;
