//! Binary brain file.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! cookie      8 bytes  "MKVHAL01"
//! order       u8
//! forward     node tree
//! backward    node tree
//! dictionary  u32 word count, then per word: u8 length + UTF-8 bytes
//! phrases     u32 phrase count, then per phrase: u16 length + u16 symbols
//! ```
//!
//! A node is `symbol u16, usage u32, count u16, children u16` followed by its
//! children, pre-order. Attached words carry a leading 0x1F byte. Phrases are
//! stored without their terminator.

use std::io::{self, Read, Write};

use crate::dictionary::{Dictionary, Symbol};
use crate::error::{HalError, HalResult};
use crate::phrase::{Phrase, PhraseRegistry, MAX_PHRASE_WORDS};
use crate::trie::{Node, NodeId, Trie};
use crate::word::{Word, MAX_WORD_BYTES};

pub const COOKIE: &[u8; 8] = b"MKVHAL01";

/// Orders a brain file may declare.
pub const ORDER_RANGE: std::ops::RangeInclusive<usize> = 1..=5;

/// Everything a brain file holds.
#[derive(Debug)]
pub struct BrainParts {
    pub order: usize,
    pub forward: Trie,
    pub backward: Trie,
    pub dictionary: Dictionary,
    pub phrases: PhraseRegistry,
}

fn put_u8<W: Write>(out: &mut W, value: u8) -> io::Result<()> {
    out.write_all(&[value])
}

fn put_u16<W: Write>(out: &mut W, value: u16) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

fn put_u32<W: Write>(out: &mut W, value: u32) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

fn take<const N: usize, R: Read>(input: &mut R, what: &'static str) -> HalResult<[u8; N]> {
    let mut buf = [0u8; N];
    input.read_exact(&mut buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => HalError::Truncated(what),
        _ => HalError::Io(err),
    })?;
    Ok(buf)
}

fn take_u8<R: Read>(input: &mut R, what: &'static str) -> HalResult<u8> {
    Ok(take::<1, R>(input, what)?[0])
}

fn take_u16<R: Read>(input: &mut R, what: &'static str) -> HalResult<u16> {
    Ok(u16::from_le_bytes(take(input, what)?))
}

fn take_u32<R: Read>(input: &mut R, what: &'static str) -> HalResult<u32> {
    Ok(u32::from_le_bytes(take(input, what)?))
}

fn write_node<W: Write>(out: &mut W, trie: &Trie, id: NodeId) -> HalResult<()> {
    let node = trie.node(id);
    let children = u16::try_from(node.children.len())
        .map_err(|_| HalError::format(format!("node {} has too many children", node.symbol)))?;
    put_u16(out, node.symbol)?;
    put_u32(out, node.usage)?;
    put_u16(out, node.count)?;
    put_u16(out, children)?;
    for &child in &node.children {
        write_node(out, trie, child)?;
    }
    Ok(())
}

fn read_children<R: Read>(
    input: &mut R,
    trie: &mut Trie,
    parent: NodeId,
    children: u16,
    depth: usize,
    max_depth: usize,
) -> HalResult<()> {
    if children > 0 && depth > max_depth {
        return Err(HalError::format(format!("tree deeper than {max_depth}")));
    }
    let mut previous: Option<Symbol> = None;
    for _ in 0..children {
        let symbol = take_u16(input, "node symbol")?;
        let usage = take_u32(input, "node usage")?;
        let count = take_u16(input, "node count")?;
        let grandchildren = take_u16(input, "node children")?;
        if previous.map_or(false, |p| p >= symbol) {
            return Err(HalError::format(format!("children out of order at symbol {symbol}")));
        }
        if count == 0 {
            return Err(HalError::format(format!("node {symbol} has a zero count")));
        }
        previous = Some(symbol);
        let id = trie.push_child(
            parent,
            Node {
                symbol,
                count,
                usage,
                children: Vec::with_capacity(usize::from(grandchildren)),
            },
        );
        read_children(input, trie, id, grandchildren, depth + 1, max_depth)?;
    }
    Ok(())
}

fn read_tree<R: Read>(input: &mut R, order: usize) -> HalResult<Trie> {
    let mut trie = Trie::new();
    let symbol = take_u16(input, "root symbol")?;
    let usage = take_u32(input, "root usage")?;
    let count = take_u16(input, "root count")?;
    let children = take_u16(input, "root children")?;
    trie.set_root(symbol, usage, count);
    let root = trie.root();
    // learning records windows of order + 1 symbols below the root
    read_children(input, &mut trie, root, children, 1, order + 1)?;
    Ok(trie)
}

fn write_dictionary<W: Write>(out: &mut W, dictionary: &Dictionary) -> HalResult<()> {
    put_u32(out, dictionary.len() as u32)?;
    for word in dictionary.words() {
        let stored = word.to_stored();
        let len = u8::try_from(stored.len())
            .map_err(|_| HalError::format(format!("word longer than {MAX_WORD_BYTES} bytes")))?;
        put_u8(out, len)?;
        out.write_all(stored.as_bytes())?;
    }
    Ok(())
}

fn read_dictionary<R: Read>(input: &mut R) -> HalResult<Dictionary> {
    let count = take_u32(input, "dictionary size")? as usize;
    if count < 2 {
        return Err(HalError::format("dictionary lacks its sentinels"));
    }
    let mut dictionary = Dictionary::empty();
    for index in 0..count {
        let len = usize::from(take_u8(input, "word length")?);
        let mut bytes = vec![0u8; len];
        input.read_exact(&mut bytes).map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => HalError::Truncated("word"),
            _ => HalError::Io(err),
        })?;
        let text = String::from_utf8(bytes)
            .map_err(|_| HalError::format(format!("word {index} is not UTF-8")))?;
        let symbol = dictionary.insert(Word::from_stored(&text))?;
        if usize::from(symbol) != index {
            return Err(HalError::format(format!("duplicate word {text:?}")));
        }
    }
    Ok(dictionary)
}

fn write_phrases<W: Write>(out: &mut W, phrases: &PhraseRegistry) -> HalResult<()> {
    put_u32(out, phrases.len() as u32)?;
    for phrase in phrases.iter() {
        let words = phrase.words();
        let len = u16::try_from(words.len())
            .map_err(|_| HalError::format(format!("phrase longer than {MAX_PHRASE_WORDS} words")))?;
        put_u16(out, len)?;
        for &symbol in words {
            put_u16(out, symbol)?;
        }
    }
    Ok(())
}

fn read_phrases<R: Read>(input: &mut R, dictionary: &Dictionary) -> HalResult<PhraseRegistry> {
    let count = take_u32(input, "phrase count")?;
    let mut phrases = PhraseRegistry::new();
    for _ in 0..count {
        let len = take_u16(input, "phrase length")?;
        let mut words = Vec::with_capacity(usize::from(len));
        for _ in 0..len {
            let symbol = take_u16(input, "phrase symbol")?;
            if usize::from(symbol) >= dictionary.len() {
                return Err(HalError::format(format!("phrase symbol {symbol} out of range")));
            }
            words.push(symbol);
        }
        phrases.push(Phrase::new(&words));
    }
    Ok(phrases)
}

/// Serialize a whole model.
pub fn write_brain<W: Write>(
    out: &mut W,
    order: usize,
    forward: &Trie,
    backward: &Trie,
    dictionary: &Dictionary,
    phrases: &PhraseRegistry,
) -> HalResult<()> {
    if !ORDER_RANGE.contains(&order) {
        return Err(HalError::InvalidOrder(order));
    }
    out.write_all(COOKIE)?;
    put_u8(out, order as u8)?;
    write_node(out, forward, forward.root())?;
    write_node(out, backward, backward.root())?;
    write_dictionary(out, dictionary)?;
    write_phrases(out, phrases)?;
    out.flush()?;
    Ok(())
}

/// Parse and validate a whole model.
pub fn read_brain<R: Read>(input: &mut R) -> HalResult<BrainParts> {
    let cookie: [u8; 8] = take(input, "cookie")?;
    if &cookie != COOKIE {
        return Err(HalError::format("not a brain file (bad cookie)"));
    }
    let order = usize::from(take_u8(input, "order")?);
    if !ORDER_RANGE.contains(&order) {
        return Err(HalError::format(format!("brain declares order {order}")));
    }
    let forward = read_tree(input, order)?;
    let backward = read_tree(input, order)?;
    let dictionary = read_dictionary(input)?;
    for trie in [&forward, &backward] {
        if let Some(max) = trie.max_symbol() {
            if usize::from(max) >= dictionary.len() {
                return Err(HalError::format(format!("tree symbol {max} out of range")));
            }
        }
    }
    let phrases = read_phrases(input, &dictionary)?;
    Ok(BrainParts {
        order,
        forward,
        backward,
        dictionary,
        phrases,
    })
}
