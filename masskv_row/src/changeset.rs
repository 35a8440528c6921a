//! Change-sets: sorted, unique-index lists of column replacements.

use crate::{Result, RowError};

/// Column index within a row. Row widths live in the `i16` domain.
pub type ColumnIndex = i16;

/// Largest number of columns a row can carry.
pub const MAX_COLUMNS: usize = i16::MAX as usize;

/// One `(index, new value)` entry of a change-set.
pub trait ChangeEntry {
    /// Column being replaced.
    fn index(&self) -> ColumnIndex;
    /// New column contents.
    fn value(&self) -> &[u8];
}

/// Ordered collection of column replacements, sorted by index ascending with
/// unique indices.
pub trait ChangeSet {
    /// Entry type.
    type Entry: ChangeEntry;
    /// Iterator over entries in index order.
    type Iter<'a>: Iterator<Item = &'a Self::Entry>
    where
        Self: 'a;

    /// Entries in index order.
    fn iter(&self) -> Self::Iter<'_>;

    /// Number of entries.
    fn len(&self) -> usize;

    /// Whether there are no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest index; `None` when empty.
    fn last_index(&self) -> Option<ColumnIndex>;
}

impl ChangeEntry for (ColumnIndex, &[u8]) {
    fn index(&self) -> ColumnIndex {
        self.0
    }
    fn value(&self) -> &[u8] {
        self.1
    }
}

impl<E: ChangeEntry> ChangeSet for [E] {
    type Entry = E;
    type Iter<'a> = std::slice::Iter<'a, E>
    where
        Self: 'a;

    fn iter(&self) -> Self::Iter<'_> {
        <[E]>::iter(self)
    }

    fn len(&self) -> usize {
        <[E]>::len(self)
    }

    fn last_index(&self) -> Option<ColumnIndex> {
        self.last().map(ChangeEntry::index)
    }
}

/// Owned change-set entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeItem {
    index: ColumnIndex,
    value: Vec<u8>,
}

impl ChangeEntry for ChangeItem {
    fn index(&self) -> ColumnIndex {
        self.index
    }
    fn value(&self) -> &[u8] {
        &self.value
    }
}

/// Owned change-set. Kept sorted; adding an index twice keeps the later value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Change {
    items: Vec<ChangeItem>,
}

impl Change {
    /// Empty change-set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Change-set replacing a single column.
    pub fn single(index: ColumnIndex, value: impl Into<Vec<u8>>) -> Self {
        Self::new().add(index, value)
    }

    /// Build from unordered pairs.
    pub fn from_pairs<I, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (ColumnIndex, V)>,
        V: Into<Vec<u8>>,
    {
        let mut items: Vec<ChangeItem> = pairs
            .into_iter()
            .map(|(index, value)| ChangeItem { index, value: value.into() })
            .collect();
        // Stable, so the last duplicate wins below.
        items.sort_by_key(|item| item.index);
        let mut out: Vec<ChangeItem> = Vec::with_capacity(items.len());
        for item in items {
            match out.last_mut() {
                Some(last) if last.index == item.index => *last = item,
                _ => out.push(item),
            }
        }
        Self { items: out }
    }

    /// Add or replace the value for `index`.
    pub fn add(mut self, index: ColumnIndex, value: impl Into<Vec<u8>>) -> Self {
        let item = ChangeItem { index, value: value.into() };
        match self.items.binary_search_by_key(&index, |i| i.index) {
            Ok(pos) => self.items[pos] = item,
            Err(pos) => self.items.insert(pos, item),
        }
        self
    }

    /// Entries as a slice.
    pub fn as_slice(&self) -> &[ChangeItem] {
        &self.items
    }
}

impl ChangeSet for Change {
    type Entry = ChangeItem;
    type Iter<'a> = std::slice::Iter<'a, ChangeItem>
    where
        Self: 'a;

    fn iter(&self) -> Self::Iter<'_> {
        self.items.iter()
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn last_index(&self) -> Option<ColumnIndex> {
        self.items.last().map(|i| i.index)
    }
}

/// Check that a change-set is non-empty, in range, and strictly ascending.
pub fn validate<C: ChangeSet + ?Sized>(changeset: &C) -> Result<()> {
    if changeset.is_empty() {
        return Err(RowError::Precondition("change-set is empty".into()));
    }
    let mut prev: Option<ColumnIndex> = None;
    for entry in changeset.iter() {
        let index = entry.index();
        if index < 0 || index as usize >= MAX_COLUMNS {
            return Err(RowError::Precondition(format!("column index {index} out of range")));
        }
        if let Some(p) = prev {
            if index <= p {
                return Err(RowError::Precondition(format!(
                    "change-set not strictly ascending: {index} after {p}"
                )));
            }
        }
        prev = Some(index);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_pairs_sorts_and_dedups() {
        let c = Change::from_pairs([(3, "c"), (0, "a"), (3, "C")]);
        let got: Vec<_> = c.iter().map(|e| (e.index(), e.value().to_vec())).collect();
        assert_eq!(got, vec![(0, b"a".to_vec()), (3, b"C".to_vec())]);
        assert_eq!(c.last_index(), Some(3));
    }

    #[test]
    fn add_keeps_order() {
        let c = Change::single(5, "x").add(1, "y").add(5, "z");
        let idx: Vec<_> = c.iter().map(|e| e.index()).collect();
        assert_eq!(idx, vec![1, 5]);
        assert_eq!(c.as_slice()[1].value(), &b"z"[..]);
        assert!(validate(&c).is_ok());
    }

    #[test]
    fn slices_are_changesets() {
        let entries: [(ColumnIndex, &[u8]); 2] = [(0, &b"a"[..]), (2, &b"b"[..])];
        assert_eq!(entries[..].last_index(), Some(2));
        assert!(validate(&entries[..]).is_ok());
    }

    #[test]
    fn validate_rejects_bad_input() {
        let empty: [(ColumnIndex, &[u8]); 0] = [];
        assert!(validate(&empty[..]).is_err());
        let unsorted: [(ColumnIndex, &[u8]); 2] = [(2, &b"a"[..]), (1, &b"b"[..])];
        assert!(validate(&unsorted[..]).is_err());
        let dup: [(ColumnIndex, &[u8]); 2] = [(1, &b"a"[..]), (1, &b"b"[..])];
        assert!(validate(&dup[..]).is_err());
        let negative: [(ColumnIndex, &[u8]); 1] = [(-1, &b"a"[..])];
        assert!(validate(&negative[..]).is_err());
        let too_wide: [(ColumnIndex, &[u8]); 1] = [(i16::MAX, &b"a"[..])];
        assert!(validate(&too_wide[..]).is_err());
    }
}
