//! Text → words.
//!
//! Chat text is stripped of terminal formatting, uppercased and cut at every
//! change between alphanumeric and other characters. Apostrophes and hyphens
//! inside a word do not cut it, so `DON'T` and `WELL-KNOWN` stay whole.

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

use crate::word::Word;

/// IRC bold/colour/bell/reverse/underline codes and ANSI `ESC[...x` sequences.
fn control_codes() -> &'static Regex {
    static CODES: OnceLock<Regex> = OnceLock::new();
    CODES.get_or_init(|| {
        Regex::new(r"\x03(?:[0-9]{1,2}(?:,[0-9]{1,2})?)?|\x1b(?:\[[0-9;]*.?)?|[\x02\x07\x16\x1f]")
            .expect("control code pattern is valid")
    })
}

/// Remove formatting codes, leaving the visible text.
pub fn strip_codes(text: &str) -> Cow<'_, str> {
    control_codes().replace_all(text, "")
}

fn is_alnum(c: Option<&char>) -> bool {
    c.map_or(false, |c| c.is_alphanumeric())
}

/// Whether a word that starts at `word[0]` ends before `word[pos]`.
fn is_boundary(word: &[char], pos: usize) -> bool {
    if pos == 0 {
        return false;
    }
    if pos >= word.len() {
        return true;
    }
    let here = word.get(pos);
    let before = word.get(pos - 1);
    let joiner = |c: Option<&char>| matches!(c, Some('\'' | '-'));

    // joiner flanked by alphanumerics, on either side of the cut
    if joiner(here) && is_alnum(before) && is_alnum(word.get(pos + 1)) {
        return false;
    }
    if pos > 1 && joiner(before) && is_alnum(word.get(pos - 2)) && is_alnum(here) {
        return false;
    }
    is_alnum(here) != is_alnum(before)
}

/// Split `text` into words, uppercased, with the attached flag set on words
/// not preceded by whitespace. A sentence that does not end in `! . ?` gets a
/// synthetic attached `.`.
pub fn tokenize(text: &str) -> Vec<Word> {
    let cleaned = strip_codes(text).to_uppercase();
    let chars: Vec<char> = cleaned.chars().collect();
    let mut words: Vec<Word> = Vec::new();

    let mut start = 0;
    while start < chars.len() {
        if chars[start].is_whitespace() {
            start += 1;
            continue;
        }
        let attached = !words.is_empty() && !chars[start - 1].is_whitespace();
        let rest = &chars[start..];
        let mut len = 1;
        while len < rest.len() && !rest[len].is_whitespace() && !is_boundary(rest, len) {
            len += 1;
        }
        words.push(Word::new(rest[..len].iter().collect::<String>(), attached));
        start += len;
    }

    if let Some(last) = words.last() {
        if last.starts_alphanumeric() || !last.ends_sentence() {
            words.push(Word::attached("."));
        }
    }
    words
}
