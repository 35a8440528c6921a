//! MassKV row values.
//!
//! A [`ValueArray`] is the leaf payload of the ordered store: a versioned,
//! copy-on-update vector of byte-string columns. Rows are immutable once
//! published; writers build a successor with [`ValueArray::update`] and then
//! retire the predecessor along the deferred (RCU) channel, or discard the
//! successor along the immediate channel if publication fails.
#![deny(missing_docs)]

pub mod changeset;
pub mod column;
mod error;
pub mod kvio;
pub mod timestamp;
mod value_array;

pub use changeset::{Change, ChangeEntry, ChangeItem, ChangeSet, ColumnIndex};
pub use column::InlineString;
pub use error::{Result, RowError};
pub use kvio::{KvIn, KvOut};
pub use timestamp::KvTimestamp;
pub use value_array::{RowTypeId, ValueArray};
