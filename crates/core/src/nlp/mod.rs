//! Tokenizer / part-of-speech contract consumed by the pipeline.
//!
//! The pipeline never tags text itself; it asks an [`Analyzer`] for typed
//! tokens and noun-chunk spans. Two providers exist: the offline
//! [`lexicon::LexiconAnalyzer`] and the HTTP client in the API crate that
//! talks to an external tagging service.

pub mod lexicon;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

/// Coarse part-of-speech classes the extractor distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Pos {
    Adj,
    Noun,
    Propn,
    Pron,
    Num,
    Cconj,
    Punct,
    Other,
}

impl Pos {
    /// Map a Universal Dependencies tag onto the coarse classes.
    ///
    /// Anything outside the eight classes collapses to [`Pos::Other`].
    pub fn from_universal(tag: &str) -> Self {
        match tag.to_ascii_uppercase().as_str() {
            "ADJ" => Self::Adj,
            "NOUN" => Self::Noun,
            "PROPN" => Self::Propn,
            "PRON" => Self::Pron,
            "NUM" => Self::Num,
            "CCONJ" => Self::Cconj,
            "PUNCT" => Self::Punct,
            _ => Self::Other,
        }
    }

    pub fn is_noun(self) -> bool {
        matches!(self, Self::Noun | Self::Propn)
    }

    /// POS classes a hyphen join may attach to.
    pub fn is_hyphen_joinable(self) -> bool {
        matches!(self, Self::Adj | Self::Noun | Self::Propn)
    }
}

/// One analyzed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Position of the token in the analyzed document.
    pub index: usize,
    /// Surface form as it appears in the text (original case).
    pub surface: String,
    /// Lowercased lemma.
    pub lemma: String,
    pub pos: Pos,
    /// Index of the sentence the token belongs to.
    pub sentence: usize,
    /// Byte offset of the token's first character in the analyzed text.
    pub offset: usize,
}

impl Token {
    /// Lowercased surface form, the canonical form stored in annotations.
    pub fn lower(&self) -> String {
        self.surface.to_lowercase()
    }
}

/// A noun chunk as token indices: `[start, end)` with its syntactic root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpan {
    pub start: usize,
    pub end: usize,
    pub root: usize,
}

impl ChunkSpan {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Output of one analyzer call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedDoc {
    pub tokens: Vec<Token>,
    pub chunks: Vec<ChunkSpan>,
}

/// A deterministic tokenizer + POS tagger + noun chunker.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze one line or a `\n`-joined multi-line document.
    async fn analyze(&self, text: &str) -> CoreResult<AnalyzedDoc>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn universal_tags_collapse_to_coarse_classes() {
        assert_eq!(Pos::from_universal("ADJ"), Pos::Adj);
        assert_eq!(Pos::from_universal("propn"), Pos::Propn);
        assert_eq!(Pos::from_universal("VERB"), Pos::Other);
        assert_eq!(Pos::from_universal("DET"), Pos::Other);
    }

    #[test]
    fn only_adjectives_and_nouns_join_hyphens() {
        assert!(Pos::Adj.is_hyphen_joinable());
        assert!(Pos::Propn.is_hyphen_joinable());
        assert!(!Pos::Pron.is_hyphen_joinable());
        assert!(!Pos::Other.is_hyphen_joinable());
    }
}
