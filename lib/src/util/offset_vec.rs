use std::fmt::{Debug, Error, Formatter};
use std::iter::{Extend, FromIterator};
use std::result::Result;
use std::slice::Iter;

/// Elements with a width (eg. when used in an `OffsetVec`)
pub trait Width {
    fn width(&self) -> usize;
}

/// A vector of elements of different logical "widths", where offsets into the vector are given in
/// terms of the sum of the widths of the previous elements (as opposed to the number of preceding
/// elements).
///
/// This is how the JVM accounts for operand stacks: `long` and `double` values occupy two words
/// while everything else occupies one. Entries are pushed and popped whole, so a two word value can
/// never be split, but depth is still measured in words.
#[derive(Clone)]
pub struct OffsetVec<T: Sized> {
    /// Entries, along with their offset
    entries: Vec<(Offset, T)>,

    /// Offset of the next element to be added
    offset_len: Offset,
}

/// Offset into an `OffsetVec`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

impl<T: Sized + Width> OffsetVec<T> {
    /// New empty offset vector
    pub fn new() -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            offset_len: Offset(0),
        }
    }

    /// Length of the `OffsetVec` (aka. number of entries)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current offset size of the `OffsetVec` (aka. offset of the next element
    /// to be added)
    pub fn offset_len(&self) -> Offset {
        self.offset_len
    }

    /// Add an entry to the back
    pub fn push(&mut self, slot: T) -> Offset {
        let offset = self.offset_len;
        self.offset_len.0 += slot.width();
        self.entries.push((offset, slot));

        offset
    }

    /// Remove an entry from the back
    pub fn pop(&mut self) -> Option<T> {
        self.entries.pop().map(|(off, elem)| {
            self.offset_len = off;
            elem
        })
    }

    /// Empty the vector
    pub fn clear(&mut self) {
        self.entries.clear();
        self.offset_len = Offset(0);
    }

    /// Get the entry `depth` entries down from the back (so `peek(0)` is the last entry)
    pub fn peek(&self, depth: usize) -> Option<&T> {
        let idx = self.entries.len().checked_sub(depth + 1)?;
        self.entries.get(idx).map(|(_, elem)| elem)
    }

    /// Mutable version of `peek`
    pub fn peek_mut(&mut self, depth: usize) -> Option<&mut T> {
        let idx = self.entries.len().checked_sub(depth + 1)?;
        self.entries.get_mut(idx).map(|(_, elem)| elem)
    }

    /// Get the entry which starts `words` words down from the current offset length
    ///
    /// This is how method receivers are found: the receiver sits just under the arguments, and the
    /// arguments are sized in words. Returns `None` if the offset falls in the middle of an entry.
    pub fn peek_words(&self, words: usize) -> Option<&T> {
        let target = self.offset_len.0.checked_sub(words)?;
        self.get_offset(Offset(target))
    }

    /// Get an entry by its offset in the vector
    ///
    /// Note: this uses binary search to find the offset
    pub fn get_offset(&self, offset: Offset) -> Option<&T> {
        self.entries
            .binary_search_by_key(&offset, |(off, _)| *off)
            .ok()
            .map(|found_idx| &self.entries[found_idx].1)
    }

    /// Remove the last `count` entries, returning them in the order they were pushed
    pub fn drain_top(&mut self, count: usize) -> Option<Vec<T>> {
        let start = self.entries.len().checked_sub(count)?;
        let drained: Vec<T> = self.entries.drain(start..).map(|(_, elem)| elem).collect();
        self.offset_len = self
            .entries
            .last()
            .map_or(Offset(0), |(off, elem)| Offset(off.0 + elem.width()));
        Some(drained)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.iter().map(|(_, elem)| elem)
    }

    /// Iterate entries along with their offsets
    pub fn iter_offsets(&self) -> Iter<'_, (Offset, T)> {
        self.entries.iter()
    }
}

impl<A: PartialEq> PartialEq for OffsetVec<A> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<A: Width> Default for OffsetVec<A> {
    fn default() -> Self {
        OffsetVec::new()
    }
}

impl<T: Width> FromIterator<T> for OffsetVec<T> {
    fn from_iter<A: IntoIterator<Item = T>>(elems: A) -> Self {
        let mut offset_vec = OffsetVec::new();
        for elem in elems {
            offset_vec.push(elem);
        }
        offset_vec
    }
}

impl<T: Width> Extend<T> for OffsetVec<T> {
    fn extend<U: IntoIterator<Item = T>>(&mut self, iter: U) {
        for elem in iter {
            self.push(elem);
        }
    }
}

impl<T: Debug> Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let mut list = f.debug_list();
        for (off, elem) in &self.entries {
            list.entry(&format_args!("#{} = {:?}", off.0, elem));
        }
        list.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    enum Word {
        Single(u8),
        Double(u8),
    }

    impl Width for Word {
        fn width(&self) -> usize {
            match self {
                Word::Single(_) => 1,
                Word::Double(_) => 2,
            }
        }
    }

    #[test]
    fn offsets_track_widths() {
        let stack: OffsetVec<Word> = vec![Word::Single(1), Word::Double(2), Word::Single(3)]
            .into_iter()
            .collect();
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.offset_len(), Offset(4));
        assert_eq!(
            stack.iter_offsets().map(|(off, _)| *off).collect::<Vec<_>>(),
            vec![Offset(0), Offset(1), Offset(3)]
        );
    }

    #[test]
    fn pop_restores_offset() {
        let mut stack: OffsetVec<Word> = vec![Word::Double(1), Word::Double(2)]
            .into_iter()
            .collect();
        assert_eq!(stack.pop(), Some(Word::Double(2)));
        assert_eq!(stack.offset_len(), Offset(2));
        assert_eq!(stack.pop(), Some(Word::Double(1)));
        assert_eq!(stack.offset_len(), Offset(0));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn peek_from_the_top() {
        let mut stack: OffsetVec<Word> = vec![Word::Single(1), Word::Double(2), Word::Single(3)]
            .into_iter()
            .collect();
        assert_eq!(stack.peek(0), Some(&Word::Single(3)));
        assert_eq!(stack.peek(2), Some(&Word::Single(1)));
        assert_eq!(stack.peek(3), None);

        if let Some(top) = stack.peek_mut(1) {
            *top = Word::Double(7);
        }
        assert_eq!(stack.peek(1), Some(&Word::Double(7)));
    }

    #[test]
    fn peek_by_words() {
        // receiver, long argument, int argument
        let stack: OffsetVec<Word> = vec![Word::Single(0), Word::Double(1), Word::Single(2)]
            .into_iter()
            .collect();
        assert_eq!(stack.peek_words(4), Some(&Word::Single(0)));
        assert_eq!(stack.peek_words(3), Some(&Word::Double(1)));
        assert_eq!(stack.peek_words(2), None, "middle of the long");
        assert_eq!(stack.peek_words(5), None);
    }

    #[test]
    fn drain_keeps_push_order() {
        let mut stack: OffsetVec<Word> = vec![Word::Single(1), Word::Double(2), Word::Single(3)]
            .into_iter()
            .collect();
        assert_eq!(
            stack.drain_top(2),
            Some(vec![Word::Double(2), Word::Single(3)])
        );
        assert_eq!(stack.offset_len(), Offset(1));
        assert_eq!(stack.drain_top(2), None);
        assert_eq!(stack.drain_top(1), Some(vec![Word::Single(1)]));
        assert_eq!(stack.offset_len(), Offset(0));
    }
}
