//! Reply generation: keyword extraction, seeded random walks over both tries
//! and surprise scoring of the candidates.

use rand::Rng;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::dictionary::{Dictionary, Symbol, ERROR_SYMBOL, FIN_SYMBOL};
use crate::tables::WordTables;
use crate::trie::{Cursor, Trie};
use crate::word::Word;

/// How many accepted replies are remembered for the overlap filter.
pub const RECENT_REPLIES: usize = 5;

/// Extra time each walk direction gets beyond the reply budget.
const WALK_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone, Debug, PartialEq)]
pub struct ReplySettings {
    /// Budget for the candidate loop.
    pub timeout: Duration,
    /// Longest acceptable reply in words, 0 for no limit.
    pub max_reply_words: usize,
    /// Score rare continuations higher instead of likely ones.
    pub favor_rare: bool,
}

impl Default for ReplySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            max_reply_words: 0,
            favor_rare: false,
        }
    }
}

/// Interesting input words, as dictionary symbols.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Keywords {
    /// Known words that are neither banned nor auxiliary.
    pub primary: Vec<Symbol>,
    /// Auxiliary words, only usable once a primary keyword made it into the reply.
    pub secondary: Vec<Symbol>,
}

impl Keywords {
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.secondary.is_empty()
    }

    pub fn contains(&self, symbol: Symbol) -> bool {
        self.primary.contains(&symbol) || self.secondary.contains(&symbol)
    }

    fn all(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.primary.iter().chain(self.secondary.iter()).copied()
    }

    fn len(&self) -> usize {
        self.primary.len() + self.secondary.len()
    }
}

/// Swapped form of every input word: its replacements, or the word itself.
fn swapped<'a>(words: &'a [Word], tables: &'a WordTables) -> impl Iterator<Item = &'a Word> + 'a {
    words.iter().flat_map(move |word| match tables.swap.get(word) {
        Some(targets) => targets.iter().collect::<Vec<_>>(),
        None => vec![word],
    })
}

/// Pick keywords out of the user's words.
pub fn extract_keywords(words: &[Word], dictionary: &Dictionary, tables: &WordTables) -> Keywords {
    let mut keys = Keywords::default();
    for word in swapped(words, tables) {
        let Some(symbol) = dictionary.lookup(word) else {
            continue;
        };
        if !word.starts_alphanumeric() || tables.ban.contains(word) || tables.aux.contains(word) {
            continue;
        }
        if !keys.primary.contains(&symbol) {
            keys.primary.push(symbol);
        }
    }
    if keys.primary.is_empty() {
        return keys;
    }
    for word in swapped(words, tables) {
        let Some(symbol) = dictionary.lookup(word) else {
            continue;
        };
        if word.starts_alphanumeric() && tables.aux.contains(word) && !keys.secondary.contains(&symbol) {
            keys.secondary.push(symbol);
        }
    }
    keys
}

/// True when some window of `order + 1` symbols occurs twice without the two
/// occurrences overlapping.
pub fn is_repeating(reply: &[Symbol], order: usize) -> bool {
    if reply.len() <= order * 2 + 1 {
        return false;
    }
    let window = order + 1;
    (order + 1..reply.len() - order).any(|i| {
        (0..i - order).any(|j| reply[i..i + window] == reply[j..j + window])
    })
}

/// True when at least three quarters of `candidate`'s words occur in `previous`.
pub fn overlaps(candidate: &[Word], previous: &[Word]) -> bool {
    if candidate.is_empty() {
        return false;
    }
    let shared = candidate.iter().filter(|w| previous.contains(w)).count();
    shared * 4 >= candidate.len() * 3
}

/// Everything a reply needs from the model, borrowed for one call.
pub struct Generator<'a, R: Rng> {
    pub order: usize,
    pub forward: &'a Trie,
    pub backward: &'a Trie,
    pub dictionary: &'a Dictionary,
    pub tables: &'a WordTables,
    pub settings: &'a ReplySettings,
    pub rng: &'a mut R,
}

impl<'a, R: Rng> Generator<'a, R> {
    fn is_aux(&self, symbol: Symbol) -> bool {
        self.dictionary
            .word(symbol)
            .map_or(false, |word| self.tables.aux.contains(word))
    }

    /// First symbol of a reply: a keyword when one qualifies, else any word
    /// that can start a sentence.
    pub fn seed(&mut self, keys: &Keywords) -> Option<Symbol> {
        let root = self.forward.node(self.forward.root());
        let fallback = if root.children.is_empty() {
            None
        } else {
            let pick = root.children[self.rng.gen_range(0..root.children.len())];
            Some(self.forward.node(pick).symbol)
        };

        let total = keys.len();
        if total == 0 {
            return fallback;
        }
        let keys: Vec<Symbol> = keys.all().collect();
        let start = self.rng.gen_range(0..total);
        (0..total)
            .map(|offset| keys[(start + offset) % total])
            .find(|&symbol| !self.is_aux(symbol))
            .or(fallback)
    }

    /// Next symbol after the cursor's longest context, drawn by weight but
    /// preferring keywords not yet in the reply. `None` when the context has
    /// no continuations.
    pub fn babble(
        &mut self,
        trie: &Trie,
        cursor: &Cursor,
        keys: &Keywords,
        reply: &[Symbol],
        used_key: &mut bool,
    ) -> Option<Symbol> {
        let node = trie.node(cursor.longest()?);
        if node.children.is_empty() {
            return None;
        }
        let branches = node.children.len();
        let mut i = self.rng.gen_range(0..branches);
        let mut budget: i64 = if node.usage > 0 {
            i64::from(self.rng.gen_range(0..node.usage))
        } else {
            0
        };
        let mut symbol = ERROR_SYMBOL;
        while budget >= 0 {
            let child = trie.node(node.children[i]);
            symbol = child.symbol;
            if keys.contains(symbol)
                && (*used_key || !self.is_aux(symbol))
                && !reply.contains(&symbol)
            {
                *used_key = true;
                break;
            }
            budget -= i64::from(child.count.max(1));
            i = (i + 1) % branches;
        }
        Some(symbol)
    }

    /// One candidate reply: a forward walk from the seed, then a backward
    /// walk that prepends words until the sentence start is reached.
    pub fn generate_once(&mut self, keys: &Keywords) -> Vec<Symbol> {
        let walk_budget = self.settings.timeout + WALK_GRACE;
        let mut reply: Vec<Symbol> = Vec::new();
        let mut used_key = false;

        let forward = self.forward;
        let mut cursor = Cursor::new(self.order, forward.root());
        let started = Instant::now();
        loop {
            if started.elapsed() >= walk_budget {
                warn!("forward walk timed out after {} words", reply.len());
                break;
            }
            let next = if reply.is_empty() {
                self.seed(keys)
            } else {
                self.babble(forward, &cursor, keys, &reply, &mut used_key)
            };
            match next {
                Some(symbol) if symbol != ERROR_SYMBOL && symbol != FIN_SYMBOL => {
                    reply.push(symbol);
                    cursor.follow(forward, symbol);
                }
                _ => break,
            }
        }

        let backward = self.backward;
        let mut cursor = Cursor::new(self.order, backward.root());
        if !reply.is_empty() {
            let last = (reply.len() - 1).min(self.order);
            for &symbol in reply[..=last].iter().rev() {
                cursor.follow(backward, symbol);
            }
        }
        let mut prefix: Vec<Symbol> = Vec::new();
        let started = Instant::now();
        loop {
            if started.elapsed() >= walk_budget {
                warn!("backward walk timed out after {} words", prefix.len());
                break;
            }
            // keyword check sees the whole reply, prefix included
            let seen: Vec<Symbol> = prefix.iter().rev().chain(reply.iter()).copied().collect();
            match self.babble(backward, &cursor, keys, &seen, &mut used_key) {
                Some(symbol) if symbol != ERROR_SYMBOL && symbol != FIN_SYMBOL => {
                    prefix.push(symbol);
                    cursor.follow(backward, symbol);
                }
                _ => break,
            }
        }

        prefix.reverse();
        prefix.extend(reply);
        prefix
    }

    /// How unexpected the keywords in `candidate` are given their contexts.
    /// Higher is better. Candidates without keywords score 0.
    pub fn evaluate_surprise(&self, keys: &Keywords, candidate: &[Symbol]) -> f64 {
        let mut entropy = 0.0f64;
        let mut scored = 0usize;

        let passes: [(&Trie, Vec<Symbol>); 2] = [
            (self.forward, candidate.to_vec()),
            (self.backward, candidate.iter().rev().copied().collect()),
        ];
        for (trie, sequence) in passes {
            let mut cursor = Cursor::new(self.order, trie.root());
            for symbol in sequence {
                if keys.contains(symbol) {
                    scored += 1;
                    let mut probability = 0.0f64;
                    let mut contexts = 0usize;
                    for depth in 0..self.order {
                        let Some(context) = cursor.depth(depth) else {
                            continue;
                        };
                        let parent = trie.node(context);
                        let Some(child) = trie.find_child(context, symbol) else {
                            continue;
                        };
                        if parent.usage == 0 {
                            continue;
                        }
                        let ratio = f64::from(trie.node(child).count) / f64::from(parent.usage);
                        probability += if self.settings.favor_rare { 1.0 - ratio } else { ratio };
                        contexts += 1;
                    }
                    if contexts > 0 && probability > 0.0 {
                        entropy -= (probability / contexts as f64).ln();
                    }
                }
                cursor.follow(trie, symbol);
            }
        }

        if scored >= 8 {
            entropy /= ((scored - 1) as f64).sqrt();
        }
        if scored >= 16 {
            entropy /= scored as f64;
        }
        entropy
    }

    fn words(&self, symbols: &[Symbol]) -> Vec<Word> {
        symbols
            .iter()
            .filter_map(|&s| self.dictionary.word(s).cloned())
            .collect()
    }

    /// Whether a candidate is unusable as a reply to `input`.
    fn rejected(&self, candidate: &[Symbol], input: &[Word], recent: &VecDeque<Vec<Word>>) -> bool {
        let max = self.settings.max_reply_words;
        if max > 0 && candidate.len() > max {
            return true;
        }
        let words = self.words(candidate);
        words == input
            || is_repeating(candidate, self.order)
            || recent.iter().any(|previous| overlaps(&words, previous))
    }

    /// Best reply to `input`, or `None` when the model could not produce a
    /// single word.
    pub fn generate_reply(&mut self, input: &[Word], recent: &VecDeque<Vec<Word>>) -> Option<Vec<Word>> {
        let keys = extract_keywords(input, self.dictionary, self.tables);
        let unbiased = Keywords::default();

        let started = Instant::now();
        let mut fallback = self.generate_once(&unbiased);
        while self.rejected(&fallback, input, recent) && started.elapsed() < self.settings.timeout {
            fallback = self.generate_once(&unbiased);
        }

        let mut best: Option<(f64, Vec<Symbol>)> = None;
        let mut tried = 0usize;
        let started = Instant::now();
        loop {
            let candidate = self.generate_once(&keys);
            tried += 1;
            if !self.rejected(&candidate, input, recent) {
                let surprise = self.evaluate_surprise(&keys, &candidate);
                if best.as_ref().map_or(true, |(high, _)| surprise > *high) {
                    best = Some((surprise, candidate));
                }
            }
            if started.elapsed() >= self.settings.timeout {
                break;
            }
        }
        debug!(
            tried,
            keywords = keys.primary.len(),
            best = ?best.as_ref().map(|(score, _)| *score),
            "reply search finished"
        );

        let chosen = best.map(|(_, symbols)| symbols).unwrap_or(fallback);
        (!chosen.is_empty()).then(|| self.words(&chosen))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{SwapTable, WordList};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn dictionary(words: &[&str]) -> Dictionary {
        let mut dict = Dictionary::new();
        for w in words {
            dict.insert(Word::spaced(*w)).unwrap();
        }
        dict
    }

    #[test]
    fn keywords_skip_banned_and_unknown_words() {
        let dict = dictionary(&["THE", "FOX", "MY"]);
        let tables = WordTables {
            ban: ["THE"].into_iter().collect(),
            aux: ["MY"].into_iter().collect(),
            swap: SwapTable::default(),
        };
        let input = [Word::spaced("THE"), Word::spaced("FOX"), Word::spaced("MY"), Word::spaced("CAT")];
        let keys = extract_keywords(&input, &dict, &tables);
        assert_eq!(keys.primary, vec![dict.lookup(&Word::spaced("FOX")).unwrap()]);
        assert_eq!(keys.secondary, vec![dict.lookup(&Word::spaced("MY")).unwrap()]);
    }

    #[test]
    fn aux_words_need_a_primary_keyword() {
        let dict = dictionary(&["MY"]);
        let tables = WordTables {
            aux: ["MY"].into_iter().collect(),
            ..WordTables::default()
        };
        let keys = extract_keywords(&[Word::spaced("MY")], &dict, &tables);
        assert!(keys.is_empty());
    }

    #[test]
    fn swap_replaces_input_words() {
        let dict = dictionary(&["YOU", "I"]);
        let tables = WordTables {
            swap: [("I", "YOU")].into_iter().collect(),
            ban: WordList::default(),
            aux: WordList::default(),
        };
        let keys = extract_keywords(&[Word::spaced("I")], &dict, &tables);
        assert_eq!(keys.primary, vec![dict.lookup(&Word::spaced("YOU")).unwrap()]);
    }

    #[test]
    fn punctuation_never_becomes_a_keyword() {
        let dict = dictionary(&["!"]);
        let keys = extract_keywords(&[Word::attached("!")], &dict, &WordTables::default());
        assert!(keys.is_empty());
    }

    #[test]
    fn repeating_windows_are_detected() {
        assert!(!is_repeating(&[2, 3, 4, 5, 6], 1));
        assert!(is_repeating(&[2, 3, 9, 2, 3], 1));
        // overlapping occurrences do not count
        assert!(!is_repeating(&[2, 2, 2], 1));
        assert!(is_repeating(&[2, 2, 2, 2, 2, 2], 2));
    }

    #[test]
    fn overlap_threshold_is_three_quarters() {
        let words = |s: &str| s.split(' ').map(Word::spaced).collect::<Vec<_>>();
        assert!(overlaps(&words("A B C D"), &words("A B C X")));
        assert!(!overlaps(&words("A B C D"), &words("A B X Y")));
        assert!(!overlaps(&[], &words("A")));
    }

    #[test]
    fn babble_on_empty_trie_stops() {
        let dict = Dictionary::new();
        let trie = Trie::new();
        let tables = WordTables::default();
        let settings = ReplySettings::default();
        let mut rng = StdRng::seed_from_u64(7);
        let mut generator = Generator {
            order: 2,
            forward: &trie,
            backward: &trie,
            dictionary: &dict,
            tables: &tables,
            settings: &settings,
            rng: &mut rng,
        };
        let cursor = Cursor::new(2, trie.root());
        let mut used = false;
        assert_eq!(generator.babble(&trie, &cursor, &Keywords::default(), &[], &mut used), None);
        assert_eq!(generator.seed(&Keywords::default()), None);
        assert!(generator.generate_once(&Keywords::default()).is_empty());
    }

    #[test]
    fn babble_marks_keyword_use() {
        let dict = dictionary(&["A", "MY"]);
        let mut trie = Trie::new();
        let root = trie.root();
        for _ in 0..5 {
            trie.add_symbol(root, 3);
        }
        let tables = WordTables {
            aux: ["MY"].into_iter().collect(),
            ..WordTables::default()
        };
        let settings = ReplySettings::default();
        let mut rng = StdRng::seed_from_u64(11);
        let mut generator = Generator {
            order: 1,
            forward: &trie,
            backward: &trie,
            dictionary: &dict,
            tables: &tables,
            settings: &settings,
            rng: &mut rng,
        };
        let cursor = Cursor::new(1, root);
        let aux_only = Keywords {
            primary: Vec::new(),
            secondary: vec![3],
        };
        let primary = Keywords {
            primary: vec![3],
            secondary: Vec::new(),
        };

        // auxiliary keywords wait for a primary one
        let mut used = false;
        assert_eq!(generator.babble(&trie, &cursor, &aux_only, &[], &mut used), Some(3));
        assert!(!used);
        let mut used = true;
        assert_eq!(generator.babble(&trie, &cursor, &aux_only, &[], &mut used), Some(3));
        assert!(used);

        // a keyword already in the reply is not taken again
        let mut used = false;
        assert_eq!(generator.babble(&trie, &cursor, &primary, &[3], &mut used), Some(3));
        assert!(!used);
        assert_eq!(generator.babble(&trie, &cursor, &primary, &[], &mut used), Some(3));
        assert!(used);
    }

    fn score(
        forward: &Trie,
        backward: &Trie,
        order: usize,
        favor_rare: bool,
        keys: &Keywords,
        candidate: &[Symbol],
    ) -> f64 {
        let dict = dictionary(&["A", "B", "C"]);
        let tables = WordTables::default();
        let settings = ReplySettings {
            favor_rare,
            ..ReplySettings::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let generator = Generator {
            order,
            forward,
            backward,
            dictionary: &dict,
            tables: &tables,
            settings: &settings,
            rng: &mut rng,
        };
        generator.evaluate_surprise(keys, candidate)
    }

    fn primary(symbols: &[Symbol]) -> Keywords {
        Keywords {
            primary: symbols.to_vec(),
            secondary: Vec::new(),
        }
    }

    /// root: A x3, B x1; A: B x1.
    fn weighted_trie() -> Trie {
        let mut trie = Trie::new();
        let root = trie.root();
        for _ in 0..3 {
            trie.add_symbol(root, 2);
        }
        trie.add_symbol(root, 3);
        let a = trie.find_child(root, 2).unwrap();
        trie.add_symbol(a, 3);
        trie
    }

    #[test]
    fn surprise_averages_every_context_depth() {
        let forward = weighted_trie();
        let backward = Trie::new();
        // B after A: 1/4 at the root, 1/1 after A
        let got = score(&forward, &backward, 2, false, &primary(&[3]), &[2, 3]);
        let expected = -((0.25f64 + 1.0) / 2.0).ln();
        assert!((got - expected).abs() < 1e-12, "{got} vs {expected}");

        let rare = score(&forward, &backward, 2, true, &primary(&[3]), &[2, 3]);
        let expected = -((0.75f64 + 0.0) / 2.0).ln();
        assert!((rare - expected).abs() < 1e-12, "{rare} vs {expected}");
        assert!(rare > got);
    }

    #[test]
    fn candidate_without_keywords_scores_zero() {
        let forward = weighted_trie();
        assert_eq!(score(&forward, &forward, 2, false, &Keywords::default(), &[2, 3]), 0.0);
        assert_eq!(score(&forward, &forward, 2, false, &primary(&[4]), &[2, 3]), 0.0);
    }

    #[test]
    fn long_candidates_are_discounted() {
        let forward = weighted_trie();
        let backward = Trie::new();
        let keys = primary(&[3]);
        // every B costs ln 4 forward; the empty backward trie still counts it
        let per_token = 4f64.ln();

        let short = score(&forward, &backward, 1, false, &keys, &[3; 3]);
        assert!((short - 3.0 * per_token).abs() < 1e-9);

        // 8 scored tokens: divided by sqrt(7)
        let eight = score(&forward, &backward, 1, false, &keys, &[3; 4]);
        assert!((eight - 4.0 * per_token / 7f64.sqrt()).abs() < 1e-9);

        // 16 scored tokens: also divided by 16
        let sixteen = score(&forward, &backward, 1, false, &keys, &[3; 8]);
        assert!((sixteen - 8.0 * per_token / 15f64.sqrt() / 16.0).abs() < 1e-9);
    }

    #[test]
    fn seed_prefers_a_non_auxiliary_keyword() {
        // A=2, MY=3, B=4 all start sentences
        let dict = dictionary(&["A", "MY", "B"]);
        let mut trie = Trie::new();
        let root = trie.root();
        for symbol in [2, 3, 4] {
            trie.add_symbol(root, symbol);
        }
        let tables = WordTables {
            aux: ["MY"].into_iter().collect(),
            ..WordTables::default()
        };
        let settings = ReplySettings::default();
        let keys = Keywords {
            primary: vec![4],
            secondary: vec![3],
        };
        let aux_only = Keywords {
            primary: Vec::new(),
            secondary: vec![3],
        };

        let mut fallbacks = Vec::new();
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut generator = Generator {
                order: 1,
                forward: &trie,
                backward: &trie,
                dictionary: &dict,
                tables: &tables,
                settings: &settings,
                rng: &mut rng,
            };
            assert_eq!(generator.seed(&keys), Some(4));
            fallbacks.push(generator.seed(&aux_only).unwrap());
        }
        // with only auxiliary keys any sentence start will do
        assert!(fallbacks.iter().all(|s| [2, 3, 4].contains(s)));
        assert!(fallbacks.iter().any(|&s| s != 3));
    }
}
