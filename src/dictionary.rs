//! Symbol dictionary: dense ids in insertion order plus a sorted index for
//! binary search.

use crate::error::{HalError, HalResult};
use crate::word::Word;

/// Integer identifier of a dictionary word.
pub type Symbol = u16;

/// `<BRAINSTART>`: first entry of every dictionary, never learned.
pub const ERROR_SYMBOL: Symbol = 0;
/// `<FIN>`: sentence terminator.
pub const FIN_SYMBOL: Symbol = 1;

/// Hard ceiling on dictionary size imposed by 16-bit symbols.
pub const MAX_SYMBOLS: usize = Symbol::MAX as usize + 1;

#[derive(Clone, Debug)]
pub struct Dictionary {
    entries: Vec<Word>,
    /// Symbol ids sorted by word.
    order: Vec<Symbol>,
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl Dictionary {
    /// A dictionary holding the two sentinels. `<BRAINSTART>` sorts before
    /// `<FIN>`, so the index starts out as `[0, 1]`.
    pub fn new() -> Self {
        Self {
            entries: vec![Word::spaced("<BRAINSTART>"), Word::spaced("<FIN>")],
            order: vec![ERROR_SYMBOL, FIN_SYMBOL],
        }
    }

    /// A dictionary without sentinels, filled by the brain loader.
    pub(crate) fn empty() -> Self {
        Self {
            entries: Vec::new(),
            order: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Word stored under `symbol`.
    pub fn word(&self, symbol: Symbol) -> Option<&Word> {
        self.entries.get(usize::from(symbol))
    }

    pub fn words(&self) -> &[Word] {
        &self.entries
    }

    /// Position of `word` in the sorted index: `Ok` when present, `Err` with
    /// the insertion point otherwise.
    fn search(&self, word: &Word) -> Result<usize, usize> {
        self.order
            .binary_search_by(|&id| self.entries[usize::from(id)].cmp(word))
    }

    /// Symbol of `word`, if known. A hit on `<BRAINSTART>` returns
    /// `Some(ERROR_SYMBOL)`; absence is always `None`.
    pub fn lookup(&self, word: &Word) -> Option<Symbol> {
        self.search(word).ok().map(|pos| self.order[pos])
    }

    pub fn contains(&self, word: &Word) -> bool {
        self.search(word).is_ok()
    }

    /// Symbol of `word`, adding it when missing.
    pub fn insert(&mut self, word: Word) -> HalResult<Symbol> {
        match self.search(&word) {
            Ok(pos) => Ok(self.order[pos]),
            Err(pos) => {
                if self.entries.len() >= MAX_SYMBOLS {
                    return Err(HalError::CapacityLimit {
                        current: self.entries.len(),
                        max: MAX_SYMBOLS,
                    });
                }
                let symbol = self.entries.len() as Symbol;
                self.entries.push(word);
                self.order.insert(pos, symbol);
                Ok(symbol)
            }
        }
    }

    /// How many of `words` would be new entries (duplicates counted once).
    pub fn missing_count<'a>(&self, words: impl IntoIterator<Item = &'a Word>) -> usize {
        let mut fresh: Vec<&Word> = Vec::new();
        for word in words {
            if !self.contains(word) && !fresh.contains(&word) {
                fresh.push(word);
            }
        }
        fresh.len()
    }

    /// Drop every symbol the remap removes and renumber the survivors.
    ///
    /// Tries and phrases must be rewritten with the same remap before this
    /// runs; afterwards the old ids no longer exist.
    pub fn compact(&mut self, remap: &SymbolRemap) {
        if remap.removed() == 0 {
            return;
        }
        let entries = std::mem::take(&mut self.entries);
        self.entries = entries
            .into_iter()
            .enumerate()
            .filter(|(old, _)| remap.apply(*old as Symbol).is_some())
            .map(|(_, word)| word)
            .collect();
        // relative order of survivors is unchanged, so the index stays sorted
        self.order = self
            .order
            .iter()
            .filter_map(|&old| remap.apply(old))
            .collect();
    }

    /// True when `order` is a permutation of the ids consistent with word order.
    pub fn is_consistent(&self) -> bool {
        if self.order.len() != self.entries.len() {
            return false;
        }
        let mut seen = vec![false; self.entries.len()];
        for &id in &self.order {
            match seen.get_mut(usize::from(id)) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        self.order
            .windows(2)
            .all(|w| self.entries[usize::from(w[0])] < self.entries[usize::from(w[1])])
    }
}

/// Old-to-new symbol correction produced when dictionary entries are removed:
/// a surviving symbol drops by the number of removed symbols below it.
#[derive(Clone, Debug)]
pub struct SymbolRemap {
    table: Vec<Option<Symbol>>,
    removed: usize,
}

impl SymbolRemap {
    /// Build the correction for a dictionary of `len` entries. `removed` need
    /// not be sorted; duplicates and out-of-range ids are ignored.
    pub fn new(len: usize, removed: &[Symbol]) -> Self {
        let mut gone = vec![false; len];
        for &symbol in removed {
            if let Some(slot) = gone.get_mut(usize::from(symbol)) {
                *slot = true;
            }
        }
        let mut table = Vec::with_capacity(len);
        let mut shift = 0usize;
        for (old, is_gone) in gone.into_iter().enumerate() {
            if is_gone {
                shift += 1;
                table.push(None);
            } else {
                table.push(Some((old - shift) as Symbol));
            }
        }
        Self {
            table,
            removed: shift,
        }
    }

    /// New id of `symbol`, or `None` when it was removed.
    pub fn apply(&self, symbol: Symbol) -> Option<Symbol> {
        self.table.get(usize::from(symbol)).copied().flatten()
    }

    /// Number of removed symbols.
    pub fn removed(&self) -> usize {
        self.removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_come_first() {
        let dict = Dictionary::new();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.word(ERROR_SYMBOL).unwrap().text(), "<BRAINSTART>");
        assert_eq!(dict.word(FIN_SYMBOL).unwrap().text(), "<FIN>");
        assert_eq!(dict.lookup(&Word::spaced("<FIN>")), Some(FIN_SYMBOL));
        assert!(dict.is_consistent());
    }

    #[test]
    fn lookup_of_brainstart_is_some_zero_not_absence() {
        // symbol 0 is a real entry; absence must be None, never Some(0)
        let dict = Dictionary::new();
        assert_eq!(dict.lookup(&Word::spaced("<BRAINSTART>")), Some(ERROR_SYMBOL));
        assert_eq!(dict.lookup(&Word::spaced("NOWHERE")), None);
    }

    #[test]
    fn insert_is_idempotent_and_lookup_agrees() {
        let mut dict = Dictionary::new();
        for text in ["ZEBRA", "APPLE", "MANGO", "apple", "Zebra"] {
            let symbol = dict.insert(Word::spaced(text)).unwrap();
            assert_eq!(dict.lookup(&Word::spaced(text)), Some(symbol));
        }
        assert_eq!(dict.len(), 5);
        assert!(dict.is_consistent());
    }

    #[test]
    fn symbols_follow_insertion_order() {
        let mut dict = Dictionary::new();
        assert_eq!(dict.insert(Word::spaced("B")).unwrap(), 2);
        assert_eq!(dict.insert(Word::spaced("A")).unwrap(), 3);
        assert_eq!(dict.insert(Word::attached("A")).unwrap(), 4);
    }

    #[test]
    fn capacity_limit_is_reported() {
        let mut dict = Dictionary::new();
        for i in 0..(MAX_SYMBOLS - 2) {
            dict.insert(Word::spaced(format!("W{i}"))).unwrap();
        }
        let err = dict.insert(Word::spaced("ONE-TOO-MANY")).unwrap_err();
        assert!(matches!(err, HalError::CapacityLimit { .. }));
        // existing words still resolve
        assert_eq!(dict.insert(Word::spaced("W0")).unwrap(), 2);
    }

    #[test]
    fn remap_shifts_by_removed_below() {
        let remap = SymbolRemap::new(8, &[5, 2]);
        assert_eq!(remap.apply(0), Some(0));
        assert_eq!(remap.apply(1), Some(1));
        assert_eq!(remap.apply(2), None);
        assert_eq!(remap.apply(3), Some(2));
        assert_eq!(remap.apply(5), None);
        assert_eq!(remap.apply(7), Some(5));
        assert_eq!(remap.removed(), 2);
    }

    #[test]
    fn compact_keeps_index_sorted() {
        let mut dict = Dictionary::new();
        for text in ["PEAR", "APPLE", "FIG", "CHERRY"] {
            dict.insert(Word::spaced(text)).unwrap();
        }
        let fig = dict.lookup(&Word::spaced("FIG")).unwrap();
        let remap = SymbolRemap::new(dict.len(), &[fig]);
        dict.compact(&remap);
        assert_eq!(dict.len(), 5);
        assert!(dict.is_consistent());
        assert_eq!(dict.lookup(&Word::spaced("FIG")), None);
        assert_eq!(dict.lookup(&Word::spaced("CHERRY")), Some(fig));
    }
}
