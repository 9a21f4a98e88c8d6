//! Word symbol table (`words.txt` format: one `word id` pair per line).

use std::collections::HashMap;

use crate::error::{Result, TrellisError};
use crate::lattice::WordId;

/// Bidirectional word ↔ id mapping. Ids may be sparse.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    words: Vec<Option<String>>,
    index: HashMap<String, WordId>,
}

impl SymbolTable {
    /// Parse the `words.txt` text format.
    pub fn parse(text: &str) -> Result<SymbolTable> {
        let mut table = SymbolTable::default();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(word), Some(id)) = (parts.next(), parts.next()) else {
                return Err(TrellisError::ModelLoad(format!(
                    "words.txt line {}: expected 'word id', got '{line}'",
                    lineno + 1
                )));
            };
            let id: WordId = id.parse().map_err(|_| {
                TrellisError::ModelLoad(format!(
                    "words.txt line {}: invalid symbol id '{id}'",
                    lineno + 1
                ))
            })?;
            table.insert(word, id);
        }
        Ok(table)
    }

    /// Build a table from words in id order starting at 0 (`<eps>` first by
    /// convention).
    pub fn from_words<I, S>(words: I) -> SymbolTable
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = SymbolTable::default();
        for (id, word) in words.into_iter().enumerate() {
            table.insert(&word.into(), id as WordId);
        }
        table
    }

    fn insert(&mut self, word: &str, id: WordId) {
        let idx = id as usize;
        if self.words.len() <= idx {
            self.words.resize(idx + 1, None);
        }
        self.words[idx] = Some(word.to_string());
        self.index.insert(word.to_string(), id);
    }

    pub fn id(&self, word: &str) -> Option<WordId> {
        self.index.get(word).copied()
    }

    pub fn word(&self, id: WordId) -> Option<&str> {
        self.words.get(id as usize).and_then(|w| w.as_deref())
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_words_txt() {
        let table = SymbolTable::parse("<eps> 0\nhello 1\nworld 2\n\n<unk> 5\n").unwrap();
        assert_eq!(table.id("hello"), Some(1));
        assert_eq!(table.word(2), Some("world"));
        // sparse id
        assert_eq!(table.word(5), Some("<unk>"));
        assert_eq!(table.word(3), None);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn rejects_malformed_lines() {
        let err = SymbolTable::parse("hello\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
        let err = SymbolTable::parse("hello abc\n").unwrap_err();
        assert!(err.to_string().contains("invalid symbol id"));
    }

    #[test]
    fn from_words_assigns_sequential_ids() {
        let table = SymbolTable::from_words(["<eps>", "a", "b"]);
        assert_eq!(table.id("<eps>"), Some(0));
        assert_eq!(table.id("b"), Some(2));
    }
}
