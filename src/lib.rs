//! Conversational n-gram model.
//!
//! Sentences are learned into a forward and a backward context trie over a
//! shared word dictionary. Replies grow outward from a keyword of the input
//! in both directions, and the most surprising of many candidates wins. Every
//! learned sentence is kept so it can be forgotten exactly later.

pub mod brain;
pub mod codec;
pub mod config;
pub mod corpus;
pub mod dictionary;
pub mod error;
pub mod phrase;
pub mod reply;
pub mod tables;
pub mod tokenizer;
pub mod trie;
pub mod word;

pub use brain::{Direction, Model, Stats, CANNED_REPLY};
pub use config::Config;
pub use dictionary::{Dictionary, Symbol};
pub use error::{HalError, HalResult};
pub use reply::ReplySettings;
pub use tables::WordTables;
pub use tokenizer::tokenize;
pub use word::Word;
