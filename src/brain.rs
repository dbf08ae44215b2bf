//! The model: dictionary, forward and backward tries and the phrase registry,
//! kept consistent through learning, forgetting and compaction.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::mem::size_of;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::codec::{self, BrainParts, ORDER_RANGE};
use crate::config::Config;
use crate::corpus;
use crate::dictionary::{Dictionary, Symbol, SymbolRemap, MAX_SYMBOLS};
use crate::error::{HalError, HalResult};
use crate::phrase::{Phrase, PhraseRegistry, MAX_PHRASE_WORDS};
use crate::reply::{Generator, ReplySettings, RECENT_REPLIES};
use crate::tables::WordTables;
use crate::tokenizer::tokenize;
use crate::trie::{Cursor, Node, NodeId, Trie, TreeSize};
use crate::word::{capitalize, detokenize, Word};

/// Said when the model has nothing to say.
pub const CANNED_REPLY: &str = "I don't know enough to answer you yet!";

/// Phrases removed per node-count check while trimming.
const TRIM_BATCH: usize = 25;

/// Most children a branch may have to be listed by [`Model::view_branch`].
pub const VIEW_BRANCH_LIMIT: usize = 200;

/// Which of the two tries an operation looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Size report of a model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stats {
    pub order: usize,
    pub words: usize,
    pub phrases: usize,
    pub forward_nodes: usize,
    pub backward_nodes: usize,
    /// Distinct words that can start a sentence.
    pub branches: usize,
    /// Rough heap footprint in bytes.
    pub memory_estimate: usize,
}

impl Stats {
    pub fn node_count(&self) -> usize {
        self.forward_nodes + self.backward_nodes
    }
}

fn check_order(order: usize) -> HalResult<()> {
    if ORDER_RANGE.contains(&order) {
        Ok(())
    } else {
        Err(HalError::InvalidOrder(order))
    }
}

pub struct Model {
    order: usize,
    forward: Trie,
    backward: Trie,
    dictionary: Dictionary,
    phrases: PhraseRegistry,
    tables: WordTables,
    settings: ReplySettings,
    recent: VecDeque<Vec<Word>>,
    rng: StdRng,
}

impl Model {
    /// An empty model of the given order.
    pub fn new(order: usize) -> HalResult<Self> {
        Self::with_rng(order, StdRng::from_entropy())
    }

    /// An empty model whose replies are reproducible.
    pub fn with_seed(order: usize, seed: u64) -> HalResult<Self> {
        Self::with_rng(order, StdRng::seed_from_u64(seed))
    }

    fn with_rng(order: usize, rng: StdRng) -> HalResult<Self> {
        check_order(order)?;
        Ok(Self {
            order,
            forward: Trie::new(),
            backward: Trie::new(),
            dictionary: Dictionary::new(),
            phrases: PhraseRegistry::new(),
            tables: WordTables::default(),
            settings: ReplySettings::default(),
            recent: VecDeque::with_capacity(RECENT_REPLIES),
            rng,
        })
    }

    fn from_parts(parts: BrainParts) -> Self {
        Self {
            order: parts.order,
            forward: parts.forward,
            backward: parts.backward,
            dictionary: parts.dictionary,
            phrases: parts.phrases,
            tables: WordTables::default(),
            settings: ReplySettings::default(),
            recent: VecDeque::with_capacity(RECENT_REPLIES),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn phrases(&self) -> &PhraseRegistry {
        &self.phrases
    }

    pub fn trie(&self, direction: Direction) -> &Trie {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Backward => &self.backward,
        }
    }

    pub fn tables(&self) -> &WordTables {
        &self.tables
    }

    pub fn set_tables(&mut self, tables: WordTables) {
        self.tables = tables;
    }

    pub fn settings(&self) -> &ReplySettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: ReplySettings) {
        self.settings = settings;
    }

    /// Replies the overlap filter currently compares against, oldest first.
    pub fn recent_replies(&self) -> impl Iterator<Item = &[Word]> {
        self.recent.iter().map(Vec::as_slice)
    }

    // ---- learning ----

    fn feed(trie: &mut Trie, order: usize, sequence: &[Symbol]) {
        let mut cursor = Cursor::new(order, trie.root());
        for &symbol in sequence {
            cursor.advance(trie, symbol, true);
        }
    }

    /// Learn one tokenized sentence. Returns `false` when the sentence is too
    /// short or is a single word with trailing punctuation.
    pub fn learn(&mut self, words: &[Word]) -> HalResult<bool> {
        if words.len() < self.order || words[1..].iter().all(Word::is_attached) {
            return Ok(false);
        }
        if words.len() > MAX_PHRASE_WORDS {
            return Err(HalError::PhraseTooLong {
                words: words.len(),
                max: MAX_PHRASE_WORDS,
            });
        }
        let fresh = self.dictionary.missing_count(words);
        if self.dictionary.len() + fresh > MAX_SYMBOLS {
            return Err(HalError::CapacityLimit {
                current: self.dictionary.len(),
                max: MAX_SYMBOLS,
            });
        }
        let symbols = words
            .iter()
            .map(|word| self.dictionary.insert(word.clone()))
            .collect::<HalResult<Vec<Symbol>>>()?;
        let phrase = Phrase::new(&symbols);
        Self::feed(&mut self.forward, self.order, phrase.forward());
        Self::feed(&mut self.backward, self.order, &phrase.backward());
        self.phrases.push(phrase);
        Ok(true)
    }

    pub fn learn_text(&mut self, text: &str) -> HalResult<bool> {
        self.learn(&tokenize(text))
    }

    /// Learn corpus lines, skipping comments. Sentences that fail are logged
    /// and skipped. Returns how many were learned.
    pub fn train_sentences<I, S>(&mut self, lines: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut learned = 0;
        for line in lines {
            let Some(sentence) = corpus::sentence_of(line.as_ref()) else {
                continue;
            };
            match self.learn_text(sentence) {
                Ok(true) => learned += 1,
                Ok(false) => {}
                Err(err) => warn!("skipping {:?}: {}", sentence, err),
            }
        }
        learned
    }

    /// Learn every sentence of a corpus file (`.gz` allowed).
    pub fn train_file(&mut self, path: &Path) -> HalResult<usize> {
        let sentences = corpus::read_sentences(path)?;
        let total = sentences.len();
        let learned = self.train_sentences(sentences);
        info!("trained {}/{} sentences from {}", learned, total, path.display());
        Ok(learned)
    }

    // ---- forgetting ----

    /// Undo every count `sequence` added to `trie`.
    fn retract_sequence(trie: &mut Trie, order: usize, sequence: &[Symbol]) {
        for start in 0..sequence.len() {
            let end = (start + order + 1).min(sequence.len());
            let path = trie.path(&sequence[start..end]);
            for depth in (0..path.len()).rev() {
                let parent: NodeId = if depth == 0 { trie.root() } else { path[depth - 1] };
                trie.retract(path[depth], parent);
            }
        }
    }

    /// Remove one phrase and everything it taught both tries. Dictionary
    /// entries are left for [`Model::compact_dictionary`].
    pub fn delete_phrase(&mut self, index: usize) -> bool {
        let Some(phrase) = self.phrases.get(index).cloned() else {
            return false;
        };
        Self::retract_sequence(&mut self.forward, self.order, phrase.forward());
        Self::retract_sequence(&mut self.backward, self.order, &phrase.backward());
        self.phrases.remove(index);
        true
    }

    /// Remove the phrase at `index` and every identical copy of it.
    pub fn delete_all_matching(&mut self, index: usize) -> usize {
        let matches = self.phrases.identical_indices(index);
        for &i in matches.iter().rev() {
            self.delete_phrase(i);
        }
        matches.len()
    }

    /// Index of the learned phrase that best matches `text`.
    pub fn find_closest(&self, text: &str) -> Option<usize> {
        let mut query: Vec<Symbol> = Vec::new();
        for word in tokenize(text) {
            if word.char_len() < 2 {
                continue;
            }
            if let Some(symbol) = self.dictionary.lookup(&word) {
                if !query.contains(&symbol) {
                    query.push(symbol);
                }
            }
        }
        self.phrases.find_closest(&query, self.order)
    }

    /// Drop words that neither trie nor any phrase uses any more and
    /// renumber the rest everywhere. Returns how many words were dropped.
    pub fn compact_dictionary(&mut self) -> usize {
        let forward_root = self.forward.root();
        let backward_root = self.backward.root();
        let in_phrases = self.phrases.symbols_in_use(self.dictionary.len());
        let removed: Vec<Symbol> = (2..self.dictionary.len())
            .filter(|&s| !in_phrases[s])
            .map(|s| s as Symbol)
            .filter(|&s| {
                self.forward.find_child(forward_root, s).is_none()
                    && self.backward.find_child(backward_root, s).is_none()
            })
            .collect();
        if removed.is_empty() {
            return 0;
        }
        let remap = SymbolRemap::new(self.dictionary.len(), &removed);
        // ids change meaning once the dictionary is compacted, so references go first
        self.forward.renumber(&remap);
        self.backward.renumber(&remap);
        self.phrases.renumber(&remap);
        self.dictionary.compact(&remap);
        debug!("dictionary compacted, {} words dropped", removed.len());
        removed.len()
    }

    /// Forget the learned sentence closest to `text`. Returns a confirmation
    /// quoting it, or `None` when nothing matched.
    pub fn forget(&mut self, text: &str) -> Option<String> {
        let index = self.find_closest(text)?;
        let sentence = self.phrase_text(index)?;
        let copies = self.delete_all_matching(index);
        self.compact_dictionary();
        info!("forgot {:?} ({} copies)", sentence, copies);
        Some(format!("You mean \"{sentence}\"? OK, I'll try..."))
    }

    /// Forget every sentence containing the first word of `text`. Returns
    /// how many sentences went; 0 for an unknown word.
    pub fn forget_word(&mut self, text: &str) -> usize {
        let Some(word) = tokenize(text).into_iter().next() else {
            return 0;
        };
        let Some(symbol) = self.dictionary.lookup(&word) else {
            return 0;
        };
        let indices = self.phrases.indices_containing(symbol);
        for &i in indices.iter().rev() {
            self.delete_phrase(i);
        }
        self.compact_dictionary();
        info!("forgot {} sentences mentioning {}", indices.len(), word);
        indices.len()
    }

    /// Delete the oldest phrases until both tries together hold at most
    /// `max_nodes` nodes. Returns how many phrases were deleted.
    pub fn trim(&mut self, max_nodes: usize) -> usize {
        let before = self.node_count();
        let mut deleted = 0;
        while self.node_count() > max_nodes && !self.phrases.is_empty() {
            for _ in 0..TRIM_BATCH {
                if !self.delete_phrase(0) {
                    break;
                }
                deleted += 1;
            }
        }
        let words = self.compact_dictionary();
        info!(
            "trimmed {} phrases and {} words, nodes {} -> {}",
            deleted,
            words,
            before,
            self.node_count()
        );
        deleted
    }

    /// Rebuild the model at another order by relearning every phrase.
    /// Returns how many phrases survived.
    pub fn set_order(&mut self, order: usize) -> HalResult<usize> {
        check_order(order)?;
        let sentences: Vec<Vec<Word>> = self.phrases.iter().map(|p| self.phrase_words(p)).collect();
        self.order = order;
        self.forward = Trie::new();
        self.backward = Trie::new();
        self.dictionary = Dictionary::new();
        self.phrases = PhraseRegistry::new();
        self.recent.clear();
        let mut learned = 0;
        for words in &sentences {
            match self.learn(words) {
                Ok(true) => learned += 1,
                Ok(false) => {}
                Err(err) => warn!("dropping phrase while relearning: {}", err),
            }
        }
        info!("order set to {}, relearned {}/{} phrases", order, learned, sentences.len());
        Ok(learned)
    }

    // ---- replies ----

    /// Reply to `text`. Never empty: falls back to [`CANNED_REPLY`].
    pub fn generate_reply(&mut self, text: &str) -> String {
        let input = tokenize(text);
        let mut generator = Generator {
            order: self.order,
            forward: &self.forward,
            backward: &self.backward,
            dictionary: &self.dictionary,
            tables: &self.tables,
            settings: &self.settings,
            rng: &mut self.rng,
        };
        match generator.generate_reply(&input, &self.recent) {
            Some(words) => {
                let rendered = capitalize(&detokenize(&words));
                if self.recent.len() == RECENT_REPLIES {
                    self.recent.pop_front();
                }
                self.recent.push_back(words);
                rendered
            }
            None => CANNED_REPLY.to_string(),
        }
    }

    /// Optionally learn from `text`, then reply to it.
    pub fn converse(&mut self, text: &str, learn: bool) -> String {
        if learn {
            if let Err(err) = self.learn_text(text) {
                warn!("not learning {:?}: {}", text, err);
            }
        }
        self.generate_reply(text)
    }

    // ---- reports ----

    fn node_count(&self) -> usize {
        self.forward.node_count() + self.backward.node_count()
    }

    pub fn stats(&self) -> Stats {
        let node_bytes = size_of::<Node>() + size_of::<NodeId>();
        let words: usize = self
            .dictionary
            .words()
            .iter()
            .map(|w| size_of::<Word>() + w.text().len() + size_of::<Symbol>())
            .sum();
        let phrases: usize = self
            .phrases
            .iter()
            .map(|p| size_of::<Phrase>() + p.forward().len() * size_of::<Symbol>())
            .sum();
        Stats {
            order: self.order,
            words: self.dictionary.len(),
            phrases: self.phrases.len(),
            forward_nodes: self.forward.node_count(),
            backward_nodes: self.backward.node_count(),
            branches: self.forward.branch_count(),
            memory_estimate: self.node_count() * node_bytes + words + phrases,
        }
    }

    pub fn tree_size(&self, direction: Direction, branch: Option<usize>) -> TreeSize {
        self.trie(direction).tree_size(branch)
    }

    /// Indented listing of the `branch`-th root branch, or of the whole trie
    /// when `branch` is absent or out of range. Each line shows a node's
    /// symbol, word, count and usage. `None` when the listed node has more
    /// than [`VIEW_BRANCH_LIMIT`] children.
    pub fn view_branch(&self, direction: Direction, branch: Option<usize>) -> Option<String> {
        let trie = self.trie(direction);
        let root = trie.root();
        let top = branch
            .and_then(|b| trie.node(root).children.get(b).copied())
            .unwrap_or(root);
        if trie.node(top).children.len() > VIEW_BRANCH_LIMIT {
            return None;
        }
        let mut out = String::new();
        let mut stack = vec![(top, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let node = trie.node(id);
            let next = if id == root {
                depth
            } else {
                let word = self.dictionary.word(node.symbol).map_or("?", Word::text);
                out.push_str(&format!(
                    "{:indent$}[{}] {} x{} ({})\n",
                    "",
                    node.symbol,
                    word,
                    node.count,
                    node.usage,
                    indent = depth * 2
                ));
                depth + 1
            };
            stack.extend(node.children.iter().rev().map(|&child| (child, next)));
        }
        Some(out)
    }

    fn phrase_words(&self, phrase: &Phrase) -> Vec<Word> {
        phrase
            .words()
            .iter()
            .filter_map(|&s| self.dictionary.word(s).cloned())
            .collect()
    }

    /// A learned sentence as display text.
    pub fn phrase_text(&self, index: usize) -> Option<String> {
        let phrase = self.phrases.get(index)?;
        Some(capitalize(&detokenize(&self.phrase_words(phrase))))
    }

    /// True when every cross-reference in the model is valid.
    pub fn is_consistent(&self) -> bool {
        let len = self.dictionary.len();
        let in_range = |max: Option<Symbol>| max.map_or(true, |s| usize::from(s) < len);
        self.dictionary.is_consistent()
            && self.forward.usage_consistent()
            && self.backward.usage_consistent()
            && in_range(self.forward.max_symbol())
            && in_range(self.backward.max_symbol())
            && in_range(self.phrases.max_symbol())
            && self.phrases_are_rooted()
    }

    /// Every word of every phrase still starts a context in both tries.
    fn phrases_are_rooted(&self) -> bool {
        let forward_root = self.forward.root();
        let backward_root = self.backward.root();
        self.phrases.iter().flat_map(|p| p.words()).all(|&s| {
            self.forward.find_child(forward_root, s).is_some()
                && self.backward.find_child(backward_root, s).is_some()
        })
    }

    // ---- persistence ----

    pub fn save(&self, path: &Path) -> HalResult<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let mut out = BufWriter::new(File::create(path)?);
        codec::write_brain(
            &mut out,
            self.order,
            &self.forward,
            &self.backward,
            &self.dictionary,
            &self.phrases,
        )?;
        debug!("brain saved to {}", path.display());
        Ok(())
    }

    /// Read a brain file. Word tables and reply settings start at their defaults.
    pub fn load(path: &Path) -> HalResult<Self> {
        let mut input = BufReader::new(File::open(path)?);
        let parts = codec::read_brain(&mut input)?;
        Ok(Self::from_parts(parts))
    }

    /// Every learned sentence, one per line, in a form that can be trained again.
    pub fn export_phrases(&self, path: &Path) -> HalResult<usize> {
        let mut out = BufWriter::new(File::create(path)?);
        for phrase in self.phrases.iter() {
            writeln!(out, "{}", detokenize(&self.phrase_words(phrase)))?;
        }
        out.flush()?;
        Ok(self.phrases.len())
    }

    /// Every dictionary word, one per line, in symbol order.
    pub fn export_dictionary(&self, path: &Path) -> HalResult<usize> {
        let mut out = BufWriter::new(File::create(path)?);
        for word in self.dictionary.words() {
            writeln!(out, "{}", word)?;
        }
        out.flush()?;
        Ok(self.dictionary.len())
    }

    /// Open a personality: its brain when one loads, otherwise a fresh model
    /// trained from its corpus. A configured order that differs from the
    /// brain's is applied by relearning. Word tables and reply settings come
    /// from `config`.
    pub fn load_personality(config: &Config) -> HalResult<Self> {
        let brain = config.brain_path();
        let mut model = match Self::load(&brain) {
            Ok(mut model) => {
                info!("loaded brain {} (order {})", brain.display(), model.order);
                if let Some(order) = config.order.filter(|&order| order != model.order) {
                    let kept = model.set_order(order)?;
                    info!("relearned {} sentences at order {}", kept, order);
                }
                model
            }
            Err(err) => {
                if brain.exists() {
                    warn!("unusable brain {}: {}", brain.display(), err);
                } else {
                    info!("no brain at {}, starting fresh", brain.display());
                }
                let mut model = Self::new(config.fresh_order())?;
                let corpus = config.corpus_path();
                if let Err(err) = model.train_file(&corpus) {
                    warn!("no corpus at {}: {}", corpus.display(), err);
                }
                model
            }
        };
        model.set_tables(WordTables::load(
            &config.ban_path(),
            &config.aux_path(),
            &config.swap_path(),
        ));
        model.set_settings(config.reply_settings());
        Ok(model)
    }

    /// Write the brain plus its phrase and dictionary dumps.
    pub fn save_personality(&self, config: &Config) -> HalResult<()> {
        self.save(&config.brain_path())?;
        self.export_phrases(&config.phrases_path())?;
        self.export_dictionary(&config.dictionary_path())?;
        info!("saved personality {} to {}", config.name, config.cache_dir.display());
        Ok(())
    }
}
