use std::fmt::{Debug, Error, Formatter};
use std::iter::FromIterator;
use std::slice::Iter;

/// Elements with a width (eg. when used in an `OffsetVec`)
pub trait Width {
    fn width(&self) -> usize;
}

/// Entries of different widths, each remembering the offset at which it starts
///
/// This is the shape of compact frames: `long` and `double` take up two local variable (or stack)
/// slots, but appear only once in the frame.
#[derive(Clone, PartialEq, Eq)]
pub struct OffsetVec<T> {
    entries: Vec<(Offset, T)>,

    /// Offset at which the next entry will start
    next_offset: Offset,
}

/// Offset into an `OffsetVec`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

impl<T: Width> OffsetVec<T> {
    pub fn new() -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            next_offset: Offset(0),
        }
    }

    /// Add an entry to the back, returning the offset where it starts
    pub fn push(&mut self, elem: T) -> Offset {
        let offset = self.next_offset;
        self.next_offset.0 += elem.width();
        self.entries.push((offset, elem));
        offset
    }
}

impl<T> OffsetVec<T> {
    /// Entries in order, along with their starting offsets
    pub fn iter(&self) -> OffsetVecIter<'_, T> {
        OffsetVecIter(self.entries.iter())
    }
}

impl<T: Width> Default for OffsetVec<T> {
    fn default() -> Self {
        OffsetVec::new()
    }
}

pub struct OffsetVecIter<'a, T>(Iter<'a, (Offset, T)>);

impl<'a, T> Iterator for OffsetVecIter<'a, T> {
    type Item = (Offset, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(off, elem)| (*off, elem))
    }
}

impl<'a, T> IntoIterator for &'a OffsetVec<T> {
    type Item = (Offset, &'a T);
    type IntoIter = OffsetVecIter<'a, T>;

    fn into_iter(self) -> OffsetVecIter<'a, T> {
        self.iter()
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
    enum Slot {
        OneWide(u8),
        TwoWide(u8),
    }

    impl Width for Slot {
        fn width(&self) -> usize {
            match self {
                Slot::OneWide(_) => 1,
                Slot::TwoWide(_) => 2,
            }
        }
    }

    #[test]
    fn offsets_of_mixed_widths() {
        let mut slots = OffsetVec::new();
        assert_eq!(slots.push(Slot::OneWide(1)), Offset(0));
        assert_eq!(slots.push(Slot::TwoWide(2)), Offset(1));
        assert_eq!(slots.push(Slot::TwoWide(3)), Offset(3));
        assert_eq!(slots.push(Slot::OneWide(4)), Offset(5));

        let collected: OffsetVec<Slot> =
            [Slot::OneWide(1), Slot::TwoWide(2), Slot::TwoWide(3), Slot::OneWide(4)]
                .into_iter()
                .collect();
        assert_eq!(slots, collected);
        assert_eq!(
            collected.iter().map(|(off, _)| off.0).collect::<Vec<_>>(),
            vec![0, 1, 3, 5]
        );
    }
}
