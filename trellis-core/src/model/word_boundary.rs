//! Word-boundary metadata (`word_boundary.int` format: `phone kind` lines).
//!
//! Consumed opaquely by `LatticeAlgebra::word_align`; the core only parses
//! and carries it.

use std::collections::HashMap;

use crate::error::{Result, TrellisError};
use crate::lattice::PhoneId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordBoundaryKind {
    Begin,
    End,
    Internal,
    Singleton,
    Nonword,
}

impl WordBoundaryKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "begin" => Some(Self::Begin),
            "end" => Some(Self::End),
            "internal" => Some(Self::Internal),
            "singleton" => Some(Self::Singleton),
            "nonword" => Some(Self::Nonword),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WordBoundaryInfo {
    kinds: HashMap<PhoneId, WordBoundaryKind>,
}

impl WordBoundaryInfo {
    pub fn parse(text: &str) -> Result<WordBoundaryInfo> {
        let mut kinds = HashMap::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(phone), Some(kind)) = (parts.next(), parts.next()) else {
                return Err(TrellisError::ModelLoad(format!(
                    "word_boundary.int line {}: expected 'phone kind'",
                    lineno + 1
                )));
            };
            let phone: PhoneId = phone.parse().map_err(|_| {
                TrellisError::ModelLoad(format!(
                    "word_boundary.int line {}: invalid phone id '{phone}'",
                    lineno + 1
                ))
            })?;
            let kind = WordBoundaryKind::parse(kind).ok_or_else(|| {
                TrellisError::ModelLoad(format!(
                    "word_boundary.int line {}: unknown boundary kind '{kind}'",
                    lineno + 1
                ))
            })?;
            kinds.insert(phone, kind);
        }
        Ok(WordBoundaryInfo { kinds })
    }

    pub fn kind(&self, phone: PhoneId) -> Option<WordBoundaryKind> {
        self.kinds.get(&phone).copied()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_boundary_file() {
        let info = WordBoundaryInfo::parse("1 nonword\n2 begin\n3 end\n4 internal\n5 singleton\n")
            .unwrap();
        assert_eq!(info.kind(1), Some(WordBoundaryKind::Nonword));
        assert_eq!(info.kind(5), Some(WordBoundaryKind::Singleton));
        assert_eq!(info.kind(9), None);
        assert_eq!(info.len(), 5);
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = WordBoundaryInfo::parse("1 sideways\n").unwrap_err();
        assert!(err.to_string().contains("unknown boundary kind"));
    }
}
