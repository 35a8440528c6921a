use std::io::Write;
use std::mem;
use std::ptr::{self, NonNull};
use std::slice;

use masskv_thread::{MemTag, ThreadContext};
use tracing::debug;

use crate::changeset::{self, ChangeEntry, ChangeSet, ColumnIndex};
use crate::column::{self, InlineString};
use crate::timestamp::{timestamp_sub, KvTimestamp, TsParts};
use crate::{KvIn, KvOut, Result, RowError};

/// Stable row-type identifiers recorded in checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RowTypeId {
    /// [`ValueArray`].
    Array = 1,
}

type Slot = Option<NonNull<InlineString>>;

/// Versioned multi-column row.
///
/// The header is followed in the same allocation by `ncol` column slots; a
/// row occupies exactly [`shallow_size(ncol)`](Self::shallow_size_for) bytes.
/// Slots hold either a payload reference or null (an empty column).
///
/// Rows are handed around as `NonNull<ValueArray>`. Once published a row and
/// every payload it references are immutable; a reader may use it for as
/// long as the RCU guard under which it loaded the pointer is alive.
#[repr(C)]
pub struct ValueArray {
    ts: KvTimestamp,
    ncol: ColumnIndex,
    cols: [Slot; 0],
}

// SAFETY: a published row and its payloads are never written again.
unsafe impl Send for ValueArray {}
unsafe impl Sync for ValueArray {}

impl std::fmt::Debug for ValueArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueArray").field("ts", &self.ts).field("ncol", &self.ncol).finish()
    }
}

impl ValueArray {
    /// Row type identifier.
    pub const TYPE_ID: RowTypeId = RowTypeId::Array;

    /// Human-readable row type name.
    pub const fn name() -> &'static str {
        "Array"
    }

    /// Transient zero-width predecessor used by [`create`](Self::create).
    const fn empty() -> Self {
        Self { ts: 0, ncol: 0, cols: [] }
    }

    /// Version timestamp.
    #[inline]
    pub fn timestamp(&self) -> KvTimestamp {
        self.ts
    }

    /// Number of column slots.
    #[inline]
    pub fn ncol(&self) -> usize {
        self.ncol as usize
    }

    #[inline]
    fn slots(&self) -> &[Slot] {
        // SAFETY: the allocation holding `self` has `ncol` initialized slots
        // right after the header.
        unsafe { slice::from_raw_parts(ptr::addr_of!(self.cols).cast::<Slot>(), self.ncol()) }
    }

    /// # Safety
    /// `row` must be an unpublished row owned by the caller.
    #[inline]
    unsafe fn slots_mut<'a>(row: NonNull<Self>) -> &'a mut [Slot] {
        let ncol = (*row.as_ptr()).ncol();
        slice::from_raw_parts_mut(ptr::addr_of_mut!((*row.as_ptr()).cols).cast::<Slot>(), ncol)
    }

    /// Contents of column `i`; empty when `i` is out of range or the slot is
    /// null.
    #[inline]
    pub fn col(&self, i: i32) -> &[u8] {
        match self.col_ptr(i) {
            // SAFETY: payloads referenced by a live row outlive the row borrow.
            Some(p) => unsafe { InlineString::bytes(p) },
            None => &[],
        }
    }

    /// Payload reference of column `i`, for identity comparisons.
    #[inline]
    pub fn col_ptr(&self, i: i32) -> Option<NonNull<InlineString>> {
        usize::try_from(i).ok().and_then(|i| self.slots().get(i).copied().flatten())
    }

    /// All columns in index order.
    pub fn columns(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.ncol as i32).map(move |i| self.col(i))
    }

    /// Allocation size of a row with `ncol` columns.
    #[inline]
    pub const fn shallow_size_for(ncol: usize) -> usize {
        mem::size_of::<ValueArray>() + mem::size_of::<Slot>() * ncol
    }

    /// Allocation size of this row.
    #[inline]
    pub fn shallow_size(&self) -> usize {
        Self::shallow_size_for(self.ncol())
    }

    /// Allocate a row of `ncol` null slots.
    fn make_sized_row<T: ThreadContext + ?Sized>(ncol: usize, ts: KvTimestamp, ti: &T) -> Result<NonNull<Self>> {
        debug_assert!(ncol <= changeset::MAX_COLUMNS);
        let row = ti.allocate(Self::shallow_size_for(ncol), MemTag::Value)?.cast::<Self>();
        // SAFETY: fresh allocation sized for the header and `ncol` slots; an
        // all-zero slot is `None`.
        unsafe {
            ptr::write(row.as_ptr(), Self { ts, ncol: ncol as ColumnIndex, cols: [] });
            ptr::write_bytes(ptr::addr_of_mut!((*row.as_ptr()).cols).cast::<Slot>(), 0, ncol);
        }
        Ok(row)
    }

    /// Build the successor of this row with `changeset` applied at `ts`.
    ///
    /// Untouched columns share this row's payloads; changed columns get fresh
    /// payloads; new columns not named by the change-set are null. The result
    /// is unpublished: after publishing it call
    /// [`deallocate_rcu_after_update`](Self::deallocate_rcu_after_update) on
    /// this row, otherwise
    /// [`deallocate_after_failed_update`](Self::deallocate_after_failed_update)
    /// on the result.
    ///
    /// # Panics
    /// If `ts` is older than this row or the change-set is empty, unsorted,
    /// or has out-of-range indices.
    pub fn update<C, T>(&self, changeset: &C, ts: KvTimestamp, ti: &T) -> Result<NonNull<Self>>
    where
        C: ChangeSet + ?Sized,
        T: ThreadContext + ?Sized,
    {
        assert!(ts >= self.ts, "timestamp went backwards: {ts} < {}", self.ts);
        if let Err(err) = changeset::validate(changeset) {
            panic!("{err}");
        }
        let last = changeset.last_index().map_or(0, |i| i as usize);
        let ncol = self.ncol().max(last + 1);
        let row = Self::make_sized_row(ncol, ts, ti)?;
        // SAFETY: `row` is ours until returned.
        let slots = unsafe { Self::slots_mut(row) };
        slots[..self.ncol()].copy_from_slice(self.slots());
        for (made, entry) in changeset.iter().enumerate() {
            match column::make_column(entry.value(), ti) {
                Ok(col) => slots[entry.index() as usize] = Some(col),
                Err(err) => {
                    // SAFETY: only the first `made` entries hold fresh payloads.
                    unsafe {
                        for done in changeset.iter().take(made) {
                            column::deallocate_column(slots[done.index() as usize], ti);
                        }
                        ti.deallocate(row.cast(), Self::shallow_size_for(ncol), MemTag::Value);
                    }
                    return Err(err);
                }
            }
        }
        debug!(ts, ncol, changed = changeset.len(), "row updated");
        Ok(row)
    }

    /// Build a row from nothing; the change-set's largest index sets the
    /// width.
    pub fn create<C, T>(changeset: &C, ts: KvTimestamp, ti: &T) -> Result<NonNull<Self>>
    where
        C: ChangeSet + ?Sized,
        T: ThreadContext + ?Sized,
    {
        Self::empty().update(changeset, ts, ti)
    }

    /// Build a single-column row.
    pub fn create1<T: ThreadContext + ?Sized>(value: &[u8], ts: KvTimestamp, ti: &T) -> Result<NonNull<Self>> {
        let row = Self::make_sized_row(1, ts, ti)?;
        match column::make_column(value, ti) {
            Ok(col) => {
                // SAFETY: `row` is ours until returned.
                unsafe { Self::slots_mut(row)[0] = Some(col) };
                debug!(ts, ncol = 1, "row created");
                Ok(row)
            }
            Err(err) => {
                // SAFETY: never published.
                unsafe { ti.deallocate(row.cast(), Self::shallow_size_for(1), MemTag::Value) };
                Err(err)
            }
        }
    }

    /// Retire `this` after its successor (built from `changeset`) has been
    /// published. Frees the payloads the successor replaced and the row
    /// header after the grace period; shared payloads are left alone.
    ///
    /// # Safety
    /// `this` must be live, already unreachable for new readers, and the
    /// successor must have been built from it with the same change-set.
    pub unsafe fn deallocate_rcu_after_update<C, T>(this: NonNull<Self>, changeset: &C, ti: &T)
    where
        C: ChangeSet + ?Sized,
        T: ThreadContext + ?Sized,
    {
        let row = this.as_ref();
        let ncol = row.ncol;
        let mut freed = 0usize;
        for entry in changeset.iter().take_while(|e| e.index() < ncol) {
            column::deallocate_column_rcu(row.slots()[entry.index() as usize], ti);
            freed += 1;
        }
        debug!(ts = row.ts, ncol, freed, "retiring replaced row");
        ti.deallocate_rcu(this.cast(), row.shallow_size(), MemTag::Value);
    }

    /// Discard an unpublished row built by [`update`](Self::update) from
    /// `changeset`, freeing the payloads it created and its header.
    ///
    /// # Safety
    /// `this` must never have been visible to another thread.
    pub unsafe fn deallocate_after_failed_update<C, T>(this: NonNull<Self>, changeset: &C, ti: &T)
    where
        C: ChangeSet + ?Sized,
        T: ThreadContext + ?Sized,
    {
        let row = this.as_ref();
        for entry in changeset.iter() {
            column::deallocate_column(row.slots()[entry.index() as usize], ti);
        }
        debug!(ts = row.ts, ncol = row.ncol, freed = changeset.len(), "discarding aborted row");
        ti.deallocate(this.cast(), row.shallow_size(), MemTag::Value);
    }

    /// Free a row and every payload it references, immediately.
    ///
    /// # Safety
    /// No reader may hold `this`, and no other row may share its payloads.
    pub unsafe fn deallocate<T: ThreadContext + ?Sized>(this: NonNull<Self>, ti: &T) {
        let row = this.as_ref();
        for &col in row.slots() {
            column::deallocate_column(col, ti);
        }
        debug!(ts = row.ts, ncol = row.ncol, "freeing row");
        ti.deallocate(this.cast(), row.shallow_size(), MemTag::Value);
    }

    /// Free a row and every payload it references after the grace period.
    ///
    /// # Safety
    /// `this` must be unreachable for new readers, and no surviving row may
    /// share its payloads.
    pub unsafe fn deallocate_rcu<T: ThreadContext + ?Sized>(this: NonNull<Self>, ti: &T) {
        let row = this.as_ref();
        for &col in row.slots() {
            column::deallocate_column_rcu(col, ti);
        }
        debug!(ts = row.ts, ncol = row.ncol, "retiring deleted row");
        ti.deallocate_rcu(this.cast(), row.shallow_size(), MemTag::Value);
    }

    /// Append `ts | ncol | columns` to a checkpoint.
    pub fn checkpoint_write(&self, out: &mut KvOut) {
        out.write_u64(self.ts);
        out.write_i16(self.ncol);
        for col in self.columns() {
            out.write_str(col);
        }
    }

    /// Decode a row whose timestamp the checkpoint loader already read.
    ///
    /// Every slot, including empty ones, gets its own payload. On error,
    /// everything read so far is freed.
    pub fn checkpoint_read<T: ThreadContext + ?Sized>(input: &mut KvIn, ts: KvTimestamp, ti: &T) -> Result<NonNull<Self>> {
        let ncol = input.read_i16()?;
        if ncol < 0 {
            tracing::error!(ncol, "negative column count in checkpoint");
            return Err(RowError::Corrupt { what: "column count", needed: 0, available: input.remaining() });
        }
        let row = Self::make_sized_row(ncol as usize, ts, ti)?;
        for i in 0..ncol as usize {
            match column::read_column(input, ti) {
                // SAFETY: `row` is ours until returned.
                Ok(col) => unsafe { Self::slots_mut(row)[i] = Some(col) },
                Err(err) => {
                    // SAFETY: never published; unread slots are still null.
                    unsafe { Self::deallocate(row, ti) };
                    return Err(err);
                }
            }
        }
        Ok(row)
    }

    /// Decode a full `ts | ncol | columns` record.
    pub fn checkpoint_load<T: ThreadContext + ?Sized>(input: &mut KvIn, ti: &T) -> Result<NonNull<Self>> {
        let ts = input.read_u64()?;
        Self::checkpoint_read(input, ts, ti)
    }

    /// Write a one-line summary of the row stored under `key`. Column
    /// contents are not printed.
    pub fn print<W: Write + ?Sized>(
        &self,
        out: &mut W,
        prefix: &str,
        indent: usize,
        key: &[u8],
        initial_ts: KvTimestamp,
        suffix: &str,
    ) -> std::io::Result<()> {
        let adj_ts = timestamp_sub(self.ts, initial_ts);
        write!(out, "{prefix}{:indent$}", "")?;
        out.write_all(key)?;
        writeln!(out, " = ### @{}{suffix}", TsParts(adj_ts))
    }
}
