use std::fmt::{Debug, Error, Formatter};

/// Growable set of small indices (eg. positions of nodes in a method body)
#[derive(Clone, Default)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    pub fn new() -> BitSet {
        BitSet { words: vec![] }
    }

    /// New empty set, with room for indices up to `n` without reallocating
    pub fn with_capacity(n: usize) -> BitSet {
        BitSet {
            words: vec![0; (n + 63) / 64],
        }
    }

    /// Add an index, returning whether it was newly inserted
    pub fn insert(&mut self, index: usize) -> bool {
        let word = index / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let mask = 1 << (index % 64);
        let was_set = self.words[word] & mask != 0;
        self.words[word] |= mask;
        !was_set
    }

    pub fn contains(&self, index: usize) -> bool {
        match self.words.get(index / 64) {
            Some(word) => word & (1 << (index % 64)) != 0,
            None => false,
        }
    }

    /// Smallest index in the set which is greater than or equal to `from`
    pub fn next_set_bit(&self, from: usize) -> Option<usize> {
        let mut word_idx = from / 64;
        let mut word = *self.words.get(word_idx)? & (!0u64 << (from % 64));
        loop {
            if word != 0 {
                return Some(word_idx * 64 + word.trailing_zeros() as usize);
            }
            word_idx += 1;
            word = *self.words.get(word_idx)?;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }

    /// Number of indices in the set
    pub fn count(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Iterate over the indices, in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        let mut next = self.next_set_bit(0);
        std::iter::from_fn(move || {
            let current = next?;
            next = self.next_set_bit(current + 1);
            Some(current)
        })
    }
}

/// Sets are equal when they hold the same indices, regardless of how many words they have
impl PartialEq for BitSet {
    fn eq(&self, other: &BitSet) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for BitSet {}

impl Debug for BitSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        f.debug_set().entries(self.iter()).finish()
    }
}
