//! MassKV thread context: tagged allocation with immediate and deferred (RCU)
//! reclamation channels.
#![deny(missing_docs)]

use std::ptr::NonNull;

mod config;
mod rcu;
mod stats;
mod threadinfo;

pub use config::ThreadConfig;
pub use rcu::{Guard, RcuDomain};
pub use stats::{MemSnapshot, MemStats};
pub use threadinfo::ThreadInfo;

/// Alignment of every block handed out by a [`ThreadContext`].
pub const ALLOC_ALIGN: usize = 8;

/// Allocation tag used for accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MemTag {
    /// Row values and column payloads.
    Value = 0,
    /// Index-structure nodes.
    Node = 1,
}

impl MemTag {
    /// Number of distinct tags.
    pub const COUNT: usize = 2;

    #[inline]
    pub(crate) fn slot(self) -> usize {
        self as usize
    }
}

/// Allocation failure reported by a [`ThreadContext`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    /// Zero-sized requests are not supported.
    #[error("zero-sized allocation")]
    ZeroSize,
    /// Size does not form a valid layout.
    #[error("invalid allocation layout for {size} bytes")]
    Layout {
        /// Requested size.
        size: usize,
    },
    /// The global allocator returned null.
    #[error("out of memory allocating {size} bytes")]
    OutOfMemory {
        /// Requested size.
        size: usize,
    },
    /// The configured allocation limit would be exceeded.
    #[error("allocation of {size} bytes exceeds limit {limit} ({live} bytes live)")]
    LimitExceeded {
        /// Requested size.
        size: usize,
        /// Configured limit.
        limit: usize,
        /// Live bytes at the time of the request.
        live: usize,
    },
}

/// Per-thread allocator with two reclamation channels.
///
/// Every block is returned to exactly one of [`deallocate`](Self::deallocate)
/// or [`deallocate_rcu`](Self::deallocate_rcu), with the same `size` and
/// `tag` it was allocated with.
pub trait ThreadContext {
    /// Allocate `size` bytes aligned to [`ALLOC_ALIGN`].
    fn allocate(&self, size: usize, tag: MemTag) -> Result<NonNull<u8>, AllocError>;

    /// Free a block immediately.
    ///
    /// # Safety
    /// `ptr` must come from `allocate(size, tag)` on a context sharing this
    /// allocator, must not have been freed, and must not be reachable by any
    /// other thread.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, size: usize, tag: MemTag);

    /// Free a block once every reader that could observe it has left its
    /// read section.
    ///
    /// # Safety
    /// `ptr` must come from `allocate(size, tag)`, must not have been freed,
    /// and must already be unreachable for readers that pin after this call.
    unsafe fn deallocate_rcu(&self, ptr: NonNull<u8>, size: usize, tag: MemTag);
}
