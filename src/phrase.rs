//! Registry of learned sentences, kept so that teaching can be undone exactly.

use crate::dictionary::{Symbol, SymbolRemap, FIN_SYMBOL};

/// Longest sentence a phrase can hold; the brain file stores lengths as `u16`.
pub const MAX_PHRASE_WORDS: usize = u16::MAX as usize;

/// One learned sentence as dictionary symbols, terminator included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Phrase {
    symbols: Vec<Symbol>,
}

impl Phrase {
    /// Build a phrase from the sentence's word symbols; the terminator is added here.
    pub fn new(words: &[Symbol]) -> Self {
        let mut symbols = Vec::with_capacity(words.len() + 1);
        symbols.extend_from_slice(words);
        symbols.push(FIN_SYMBOL);
        Self { symbols }
    }

    /// Word symbols without the terminator.
    pub fn words(&self) -> &[Symbol] {
        &self.symbols[..self.symbols.len() - 1]
    }

    /// Sequence the forward trie was trained on: `w1 .. wn FIN`.
    pub fn forward(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Sequence the backward trie was trained on: `wn .. w1 FIN`.
    pub fn backward(&self) -> Vec<Symbol> {
        let mut reversed: Vec<Symbol> = self.words().iter().rev().copied().collect();
        reversed.push(FIN_SYMBOL);
        reversed
    }

    pub fn contains(&self, symbol: Symbol) -> bool {
        self.words().contains(&symbol)
    }

    fn renumber(&mut self, remap: &SymbolRemap) {
        for symbol in &mut self.symbols {
            if let Some(new) = remap.apply(*symbol) {
                *symbol = new;
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PhraseRegistry {
    phrases: Vec<Phrase>,
}

impl PhraseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Phrase> {
        self.phrases.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Phrase> {
        self.phrases.iter()
    }

    pub fn push(&mut self, phrase: Phrase) {
        self.phrases.push(phrase);
    }

    /// Remove the phrase at `index`, closing the gap.
    pub fn remove(&mut self, index: usize) -> Option<Phrase> {
        (index < self.phrases.len()).then(|| self.phrases.remove(index))
    }

    /// Indices of every phrase identical to the one at `index`, itself included.
    pub fn identical_indices(&self, index: usize) -> Vec<usize> {
        let Some(target) = self.phrases.get(index) else {
            return Vec::new();
        };
        self.phrases
            .iter()
            .enumerate()
            .filter(|(_, phrase)| *phrase == target)
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices of the phrases that use `symbol`.
    pub fn indices_containing(&self, symbol: Symbol) -> Vec<usize> {
        self.phrases
            .iter()
            .enumerate()
            .filter(|(_, phrase)| phrase.contains(symbol))
            .map(|(i, _)| i)
            .collect()
    }

    /// Best match for a set of unique query symbols.
    ///
    /// A phrase qualifies when its length and the query size are within a
    /// factor of three of each other and the overlap reaches both `order`
    /// and a third of the phrase. The largest overlap wins; ties keep the
    /// earliest phrase.
    pub fn find_closest(&self, query: &[Symbol], order: usize) -> Option<usize> {
        if query.is_empty() {
            return None;
        }
        let mut best: Option<(usize, usize)> = None;
        for (i, phrase) in self.phrases.iter().enumerate() {
            let words = phrase.words();
            if query.len() < words.len() / 3 || words.len() < query.len() / 3 {
                continue;
            }
            let overlap = words.iter().filter(|s| query.contains(s)).count();
            if overlap < order || overlap < words.len() / 3 {
                continue;
            }
            if best.map_or(true, |(_, high)| overlap > high) {
                best = Some((i, overlap));
            }
        }
        best.map(|(i, _)| i)
    }

    pub fn renumber(&mut self, remap: &SymbolRemap) {
        for phrase in &mut self.phrases {
            phrase.renumber(remap);
        }
    }

    /// `used[s]` is true when some phrase mentions symbol `s`.
    pub fn symbols_in_use(&self, dictionary_len: usize) -> Vec<bool> {
        let mut used = vec![false; dictionary_len];
        for &symbol in self.phrases.iter().flat_map(|p| p.words()) {
            if let Some(slot) = used.get_mut(usize::from(symbol)) {
                *slot = true;
            }
        }
        used
    }

    pub fn max_symbol(&self) -> Option<Symbol> {
        self.phrases.iter().flat_map(|p| p.words().iter().copied()).max()
    }
}
