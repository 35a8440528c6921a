//! Column payloads: independently allocated, length-prefixed byte strings.
//!
//! A payload is immutable once written and may be referenced by several
//! successive row versions. Its identity is its address.

use std::mem;
use std::ptr::{self, NonNull};
use std::slice;

use masskv_thread::{MemTag, ThreadContext};

use crate::{KvIn, Result, RowError};

/// Length-prefixed byte string; the bytes follow the header in the same
/// allocation.
#[repr(C)]
#[derive(Debug)]
pub struct InlineString {
    len: u32,
}

/// Largest payload accepted (bounded by the checkpoint's `i32` length).
pub const MAX_COLUMN_LEN: usize = i32::MAX as usize;

impl InlineString {
    /// Size of the length field.
    pub const HEADER_SIZE: usize = mem::size_of::<u32>();

    /// Allocation size of a payload holding `len` bytes.
    #[inline]
    pub const fn size(len: usize) -> usize {
        Self::HEADER_SIZE + len
    }

    /// Number of content bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocation size of this payload.
    #[inline]
    pub fn alloc_size(&self) -> usize {
        Self::size(self.len())
    }

    /// Content bytes of the payload at `ptr`.
    ///
    /// # Safety
    /// `ptr` must point to a live payload that outlives `'a`.
    #[inline]
    pub unsafe fn bytes<'a>(ptr: NonNull<InlineString>) -> &'a [u8] {
        let len = (*ptr.as_ptr()).len as usize;
        slice::from_raw_parts(ptr.as_ptr().cast::<u8>().add(Self::HEADER_SIZE), len)
    }

    unsafe fn bytes_mut<'a>(ptr: NonNull<InlineString>) -> &'a mut [u8] {
        let len = (*ptr.as_ptr()).len as usize;
        slice::from_raw_parts_mut(ptr.as_ptr().cast::<u8>().add(Self::HEADER_SIZE), len)
    }

    fn allocate<T: ThreadContext + ?Sized>(len: usize, ti: &T) -> Result<NonNull<InlineString>> {
        assert!(len <= MAX_COLUMN_LEN, "column of {len} bytes exceeds {MAX_COLUMN_LEN}");
        let ptr = ti.allocate(Self::size(len), MemTag::Value)?.cast::<InlineString>();
        // SAFETY: fresh allocation of at least HEADER_SIZE bytes, 8-aligned.
        unsafe { ptr::write(ptr.as_ptr(), InlineString { len: len as u32 }) };
        Ok(ptr)
    }
}

/// Allocate a payload holding a copy of `bytes`.
pub fn make_column<T: ThreadContext + ?Sized>(bytes: &[u8], ti: &T) -> Result<NonNull<InlineString>> {
    let col = InlineString::allocate(bytes.len(), ti)?;
    // SAFETY: `col` was just allocated with room for `bytes.len()` bytes.
    unsafe { InlineString::bytes_mut(col).copy_from_slice(bytes) };
    Ok(col)
}

/// Decode a length-prefixed payload from checkpoint input.
///
/// Nothing is allocated unless the input holds the whole payload.
pub fn read_column<T: ThreadContext + ?Sized>(input: &mut KvIn, ti: &T) -> Result<NonNull<InlineString>> {
    let len = input.read_i32()?;
    if len < 0 {
        tracing::error!(len, "negative column length in checkpoint");
        return Err(RowError::Corrupt { what: "column length", needed: 0, available: input.remaining() });
    }
    let len = len as usize;
    input.ensure("column body", len)?;
    let col = InlineString::allocate(len, ti)?;
    // SAFETY: `col` was just allocated with room for `len` bytes.
    if let Err(err) = input.read_into(unsafe { InlineString::bytes_mut(col) }) {
        unsafe { deallocate_column(Some(col), ti) };
        return Err(err);
    }
    Ok(col)
}

/// Free a payload immediately. No-op on `None`.
///
/// # Safety
/// The payload must be live, unreachable by readers, and not freed again.
pub unsafe fn deallocate_column<T: ThreadContext + ?Sized>(col: Option<NonNull<InlineString>>, ti: &T) {
    if let Some(col) = col {
        let size = (*col.as_ptr()).alloc_size();
        ti.deallocate(col.cast(), size, MemTag::Value);
    }
}

/// Free a payload after the grace period. No-op on `None`.
///
/// # Safety
/// The payload must be live, unreachable for new readers, and not freed again.
pub unsafe fn deallocate_column_rcu<T: ThreadContext + ?Sized>(col: Option<NonNull<InlineString>>, ti: &T) {
    if let Some(col) = col {
        let size = (*col.as_ptr()).alloc_size();
        ti.deallocate_rcu(col.cast(), size, MemTag::Value);
    }
}
