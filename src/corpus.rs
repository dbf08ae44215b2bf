//! Training corpora: one sentence per line, `#` starts a comment line.
//! Files ending in `.gz` are decompressed on the fly.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::HalResult;

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("gz"))
}

/// Open a corpus for line reading, decompressing when needed.
pub fn open(path: &Path) -> HalResult<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if is_gzip(path) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// Sentences of a corpus: trimmed, non-empty, comments dropped. Invalid UTF-8
/// is replaced rather than failing the whole file.
pub fn read_sentences(path: &Path) -> HalResult<Vec<String>> {
    let mut reader = open(path)?;
    let mut sentences = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        if let Some(sentence) = sentence_of(&line) {
            sentences.push(sentence.to_string());
        }
    }
    Ok(sentences)
}

/// The trainable part of one corpus line, if any.
pub fn sentence_of(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    (!trimmed.is_empty() && !trimmed.starts_with('#')).then_some(trimmed)
}
