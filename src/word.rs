//! Words as the model stores them: uppercase text plus an "attached" flag
//! recording that no whitespace preceded the token in the source.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Pseudo-character that stands for the attached flag in comparisons and on
/// disk.
pub const ATTACHED_MARK: char = '\u{1f}';

/// Longest persisted word, marker byte included.
pub const MAX_WORD_BYTES: usize = 255;

#[derive(Clone, Debug)]
pub struct Word {
    text: String,
    attached: bool,
}

impl Word {
    /// Build a word, truncating the text on a char boundary so the persisted
    /// form (marker included) fits in [`MAX_WORD_BYTES`].
    pub fn new(text: impl Into<String>, attached: bool) -> Self {
        let mut text = text.into();
        let budget = MAX_WORD_BYTES - usize::from(attached);
        if text.len() > budget {
            let mut cut = budget;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        Self { text, attached }
    }

    /// A word preceded by whitespace.
    pub fn spaced(text: impl Into<String>) -> Self {
        Self::new(text, false)
    }

    /// A word glued to the previous token.
    pub fn attached(text: impl Into<String>) -> Self {
        Self::new(text, true)
    }

    /// Decode the persisted form, where a leading [`ATTACHED_MARK`] carries the flag.
    pub fn from_stored(raw: &str) -> Self {
        match raw.strip_prefix(ATTACHED_MARK) {
            Some(rest) => Self::new(rest, true),
            None => Self::new(raw, false),
        }
    }

    /// Persisted form: marker (if attached) followed by the text.
    pub fn to_stored(&self) -> String {
        let mut out = String::with_capacity(self.text.len() + 1);
        if self.attached {
            out.push(ATTACHED_MARK);
        }
        out.push_str(&self.text);
        out
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Number of characters in the text, marker excluded.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// True when the first character of the text is alphanumeric.
    pub fn starts_alphanumeric(&self) -> bool {
        self.text.chars().next().map_or(false, char::is_alphanumeric)
    }

    /// True when the text ends in sentence-final punctuation.
    pub fn ends_sentence(&self) -> bool {
        matches!(self.text.chars().last(), Some('!' | '.' | '?'))
    }

    /// Case-folded text without the marker, used as a key in word tables.
    pub fn folded(&self) -> String {
        self.text.to_uppercase()
    }

    fn key_chars(&self) -> impl Iterator<Item = char> + '_ {
        self.attached
            .then_some(ATTACHED_MARK)
            .into_iter()
            .chain(self.text.chars().flat_map(char::to_uppercase))
    }
}

impl Ord for Word {
    fn cmp(&self, other: &Self) -> Ordering {
        // lexical over the common prefix, then the shorter word first
        self.key_chars().cmp(other.key_chars())
    }
}

impl PartialOrd for Word {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Word {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Word {}

impl Hash for Word {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for c in self.key_chars() {
            c.hash(state);
        }
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Rebuild text from words, inserting a space before every word that was not
/// attached in the source.
pub fn detokenize<'a>(words: impl IntoIterator<Item = &'a Word>) -> String {
    let mut out = String::new();
    for (i, word) in words.into_iter().enumerate() {
        if i > 0 && !word.is_attached() {
            out.push(' ');
        }
        out.push_str(word.text());
    }
    out
}

/// Sentence-case a reply: the first letter of every sentence upper, every
/// other letter lower.
pub fn capitalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut start = true;
    let mut prev: Option<char> = None;
    for (i, c) in text.chars().enumerate() {
        if i > 2 && c.is_whitespace() && matches!(prev, Some('!' | '.' | '?')) {
            start = true;
        }
        if c.is_alphabetic() {
            if start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            start = false;
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}
