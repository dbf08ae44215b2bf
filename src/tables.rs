//! Ban, auxiliary and swap word tables.
//!
//! All three are plain text files with `#` comments. Entries are compared
//! case-insensitively and without regard to the attached marker.

use rustc_hash::{FxHashMap, FxHashSet};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::word::Word;

/// Words that never become keywords.
#[derive(Clone, Debug, Default)]
pub struct WordList {
    words: FxHashSet<String>,
}

impl WordList {
    /// First token of every non-comment line. A missing file is an empty list.
    pub fn load(path: &Path) -> Self {
        let Some(content) = read_table(path) else {
            return Self::default();
        };
        content
            .lines()
            .filter_map(|line| strip_comment(line).split_whitespace().next())
            .collect()
    }

    pub fn contains(&self, word: &Word) -> bool {
        self.words.contains(&word.folded())
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for WordList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            words: iter
                .into_iter()
                .map(|w| w.as_ref().to_uppercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }
}

/// Input words replaced before keyword extraction, e.g. `I` → `YOU`.
/// A word may map to several replacements.
#[derive(Clone, Debug, Default)]
pub struct SwapTable {
    pairs: FxHashMap<String, Vec<Word>>,
}

impl SwapTable {
    /// `from to` pairs, one per non-comment line. Lines with fewer than two
    /// tokens are skipped. A missing file is an empty table.
    pub fn load(path: &Path) -> Self {
        let Some(content) = read_table(path) else {
            return Self::default();
        };
        content
            .lines()
            .filter_map(|line| {
                let mut tokens = strip_comment(line).split_whitespace();
                Some((tokens.next()?, tokens.next()?))
            })
            .collect()
    }

    /// Replacements for `word`, or `None` when the table has no entry.
    pub fn get(&self, word: &Word) -> Option<&[Word]> {
        self.pairs.get(&word.folded()).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.pairs.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<A: AsRef<str>, B: AsRef<str>> FromIterator<(A, B)> for SwapTable {
    fn from_iter<I: IntoIterator<Item = (A, B)>>(iter: I) -> Self {
        let mut pairs: FxHashMap<String, Vec<Word>> = FxHashMap::default();
        for (from, to) in iter {
            pairs
                .entry(from.as_ref().to_uppercase())
                .or_default()
                .push(Word::spaced(to.as_ref().to_uppercase()));
        }
        Self { pairs }
    }
}

/// The three tables a personality carries.
#[derive(Clone, Debug, Default)]
pub struct WordTables {
    pub ban: WordList,
    pub aux: WordList,
    pub swap: SwapTable,
}

impl WordTables {
    pub fn load(ban: &Path, aux: &Path, swap: &Path) -> Self {
        let tables = Self {
            ban: WordList::load(ban),
            aux: WordList::load(aux),
            swap: SwapTable::load(swap),
        };
        debug!(
            ban = tables.ban.len(),
            aux = tables.aux.len(),
            swap = tables.swap.len(),
            "word tables loaded"
        );
        tables
    }
}

fn read_table(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(err) => {
            debug!("no word table at {}: {}", path.display(), err);
            None
        }
    }
}

fn strip_comment(line: &str) -> &str {
    line.split('#').next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn lists_skip_comments_and_fold_case() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# banned words\nthe\n  A  extra\n\n# trailing").unwrap();
        let list = WordList::load(file.path());
        assert_eq!(list.len(), 2);
        assert!(list.contains(&Word::spaced("THE")));
        assert!(list.contains(&Word::attached("a")));
        assert!(!list.contains(&Word::spaced("EXTRA")));
    }

    #[test]
    fn missing_file_is_empty() {
        let list = WordList::load(Path::new("/definitely/not/here.ban"));
        assert!(list.is_empty());
        assert!(SwapTable::load(Path::new("/definitely/not/here.swp")).is_empty());
    }

    #[test]
    fn swap_allows_several_targets() {
        let table: SwapTable = [("i", "you"), ("me", "you"), ("you", "me"), ("you", "i")]
            .into_iter()
            .collect();
        let targets: Vec<&str> = table
            .get(&Word::spaced("YOU"))
            .unwrap()
            .iter()
            .map(Word::text)
            .collect();
        assert_eq!(targets, vec!["ME", "I"]);
        assert!(table.get(&Word::spaced("FOX")).is_none());
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn swap_file_skips_incomplete_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "MY YOUR\nLONELY\n# I YOU").unwrap();
        let table = SwapTable::load(file.path());
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&Word::spaced("my")).unwrap()[0].text(), "YOUR");
    }
}
