//! Offline rule-based analyzer.
//!
//! A closed-class lexicon (determiners, pronouns, conjunctions, common verbs
//! and prepositions) plus an open list of descriptive adjectives is enough to
//! tag short object descriptions deterministically. Unknown words are tagged
//! as nouns with a naive singular lemma. Used when no external tagging
//! service is configured, and by the test suites.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use super::{AnalyzedDoc, Analyzer, ChunkSpan, Pos, Token};
use crate::error::{CoreError, CoreResult};

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9]+(?:'[A-Za-z]+)?|[^\sA-Za-z0-9]").expect("word regex is valid")
});

/// Lexical class, finer than [`Pos`] so the chunker can tell determiners and
/// possessives apart from other closed-class words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WordClass {
    Det,
    Pron,
    PossPron,
    Adj,
    Noun,
    Propn,
    Num,
    Cconj,
    Punct,
    Other,
}

impl WordClass {
    fn pos(self) -> Pos {
        match self {
            Self::Det | Self::Other => Pos::Other,
            Self::Pron | Self::PossPron => Pos::Pron,
            Self::Adj => Pos::Adj,
            Self::Noun => Pos::Noun,
            Self::Propn => Pos::Propn,
            Self::Num => Pos::Num,
            Self::Cconj => Pos::Cconj,
            Self::Punct => Pos::Punct,
        }
    }

    /// Classes allowed inside a noun chunk.
    fn chunkable(self) -> bool {
        matches!(
            self,
            Self::Det | Self::PossPron | Self::Adj | Self::Noun | Self::Propn | Self::Num
        )
    }

    fn is_noun(self) -> bool {
        matches!(self, Self::Noun | Self::Propn)
    }
}

#[derive(Debug, Clone)]
struct LexEntry {
    lemma: String,
    class: WordClass,
}

/// One user-supplied lexicon entry, as read from a JSON file.
#[derive(Debug, Deserialize)]
struct LexiconFileEntry {
    lemma: Option<String>,
    pos: String,
    #[serde(default)]
    possessive: bool,
}

const DETERMINERS: &[&str] = &[
    "a", "an", "the", "this", "that", "these", "those", "some", "any", "each", "every", "no",
    "another", "both", "all", "several", "many", "few",
];

const PRONOUNS: &[&str] = &[
    "i", "you", "he", "she", "it", "we", "they", "me", "him", "them", "us", "something",
    "someone", "one",
];

const POSSESSIVES: &[&str] = &["my", "your", "his", "her", "its", "our", "their"];

const CONJUNCTIONS: &[&str] = &["and", "or", "but", "nor"];

const OTHER_WORDS: &[&str] = &[
    // auxiliaries and common verbs
    "is", "are", "was", "were", "be", "been", "being", "am", "has", "have", "had", "does", "do",
    "did", "can", "could", "will", "would", "should", "may", "might", "sits", "sitting", "sat",
    "looks", "looking", "seems", "appears", "stands", "standing", "flying", "flies", "holds",
    "holding", "shows", "showing", "lies", "lying", "eats", "eating", "walks", "walking",
    "perched", "covered",
    // prepositions, subordinators, adverbs
    "because", "with", "without", "on", "in", "at", "of", "to", "from", "by", "near", "under",
    "over", "above", "below", "behind", "beside", "between", "into", "onto", "as", "like",
    "very", "quite", "also", "not", "there", "here", "while", "which", "who", "where", "when",
    "than", "then", "so", "too", "rather", "mostly", "slightly", "around", "against", "for",
    "if", "since", "although", "though",
];

const ADJECTIVES: &[&str] = &[
    // colours and tones
    "red", "orange", "yellow", "green", "blue", "purple", "pink", "brown", "black", "white",
    "gray", "grey", "golden", "silver", "dark", "light", "bright", "pale", "tan", "beige",
    // size and shape
    "small", "large", "big", "little", "tiny", "huge", "long", "short", "tall", "round", "thin",
    "thick", "wide", "narrow", "pointed", "sharp", "curved", "straight", "flat", "slender",
    // texture and pattern
    "fluffy", "furry", "smooth", "rough", "soft", "striped", "spotted", "shiny", "wet", "dry",
    "bushy", "hooked", "feathered", "scaly",
    // state
    "young", "old", "adult", "juvenile", "male", "female", "wild", "open", "closed", "visible",
];

const IRREGULAR_NOUNS: &[(&str, &str)] = &[
    ("feet", "foot"),
    ("teeth", "tooth"),
    ("geese", "goose"),
    ("mice", "mouse"),
    ("children", "child"),
    ("men", "man"),
    ("women", "woman"),
    ("leaves", "leaf"),
    ("wolves", "wolf"),
    ("calves", "calf"),
    ("halves", "half"),
    ("hooves", "hoof"),
    ("people", "person"),
    ("fish", "fish"),
    ("sheep", "sheep"),
    ("deer", "deer"),
];

/// Naive English singular used for unknown nouns.
pub fn singularize(word: &str) -> String {
    let w = word.to_lowercase();
    if w.len() <= 3 || w.ends_with("ss") || w.ends_with("us") || w.ends_with("is") {
        return w;
    }
    if let Some(stem) = w.strip_suffix("ies") {
        if w.len() > 4 {
            return format!("{stem}y");
        }
    }
    for suffix in ["ches", "shes", "xes", "zes", "sses"] {
        if w.ends_with(suffix) {
            return w[..w.len() - 2].to_string();
        }
    }
    match w.strip_suffix('s') {
        Some(stem) => stem.to_string(),
        None => w,
    }
}

/// Deterministic lexicon-driven tokenizer, tagger and noun chunker.
#[derive(Debug, Clone)]
pub struct LexiconAnalyzer {
    entries: HashMap<String, LexEntry>,
}

impl Default for LexiconAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LexiconAnalyzer {
    /// Build an analyzer with the built-in lexicon.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        let mut add = |words: &[&str], class: WordClass| {
            for word in words {
                entries.insert(
                    word.to_string(),
                    LexEntry {
                        lemma: word.to_string(),
                        class,
                    },
                );
            }
        };
        add(DETERMINERS, WordClass::Det);
        add(PRONOUNS, WordClass::Pron);
        add(POSSESSIVES, WordClass::PossPron);
        add(CONJUNCTIONS, WordClass::Cconj);
        add(OTHER_WORDS, WordClass::Other);
        add(ADJECTIVES, WordClass::Adj);
        for (surface, lemma) in IRREGULAR_NOUNS {
            entries.insert(
                surface.to_string(),
                LexEntry {
                    lemma: lemma.to_string(),
                    class: WordClass::Noun,
                },
            );
        }
        Self { entries }
    }

    /// Extend the built-in lexicon with entries from a JSON file.
    ///
    /// The file maps lowercase words to `{ "pos": "<UD tag>", "lemma": "...",
    /// "possessive": bool }`. `DET` marks determiners; `lemma` defaults to the
    /// word itself.
    pub fn with_lexicon_file(mut self, path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Validation(format!("cannot read lexicon '{}': {e}", path.display()))
        })?;
        let parsed: HashMap<String, LexiconFileEntry> = serde_json::from_str(&raw)
            .map_err(|e| CoreError::Validation(format!("invalid lexicon JSON: {e}")))?;
        for (word, entry) in parsed {
            let class = match entry.pos.to_ascii_uppercase().as_str() {
                "DET" => WordClass::Det,
                "PRON" if entry.possessive => WordClass::PossPron,
                other => match Pos::from_universal(other) {
                    Pos::Adj => WordClass::Adj,
                    Pos::Noun => WordClass::Noun,
                    Pos::Propn => WordClass::Propn,
                    Pos::Pron => WordClass::Pron,
                    Pos::Num => WordClass::Num,
                    Pos::Cconj => WordClass::Cconj,
                    Pos::Punct => WordClass::Punct,
                    Pos::Other => WordClass::Other,
                },
            };
            let word = word.to_lowercase();
            let lemma = entry.lemma.unwrap_or_else(|| word.clone()).to_lowercase();
            self.entries.insert(word, LexEntry { lemma, class });
        }
        tracing::debug!(entries = self.entries.len(), path = %path.display(), "Lexicon extended");
        Ok(self)
    }

    fn classify(&self, surface: &str, sentence_start: bool) -> (String, WordClass) {
        let lower = surface.to_lowercase();
        if let Some(entry) = self.entries.get(&lower) {
            return (entry.lemma.clone(), entry.class);
        }
        if lower.chars().all(|c| c.is_ascii_digit()) {
            return (lower, WordClass::Num);
        }
        if !lower.chars().any(|c| c.is_ascii_alphanumeric()) {
            return (lower, WordClass::Punct);
        }
        if lower.len() > 4 && lower.ends_with("ly") {
            return (lower, WordClass::Other);
        }
        let capitalized = surface.chars().next().is_some_and(|c| c.is_ascii_uppercase());
        if capitalized && !sentence_start {
            return (lower, WordClass::Propn);
        }
        (singularize(&lower), WordClass::Noun)
    }

    /// Tokenize and tag, returning tokens alongside their lexical classes.
    fn tag(&self, text: &str) -> Vec<(Token, WordClass)> {
        let mut out: Vec<(Token, WordClass)> = Vec::new();
        let mut sentence = 0;
        let mut sentence_start = true;
        let mut last_end = 0;
        for m in WORD_RE.find_iter(text) {
            if text[last_end..m.start()].contains('\n') && !sentence_start {
                sentence += 1;
                sentence_start = true;
            }
            let (lemma, class) = self.classify(m.as_str(), sentence_start);
            out.push((
                Token {
                    index: out.len(),
                    surface: m.as_str().to_string(),
                    lemma,
                    pos: class.pos(),
                    sentence,
                    offset: m.start(),
                },
                class,
            ));
            sentence_start = false;
            if matches!(m.as_str(), "." | "!" | "?") {
                sentence += 1;
                sentence_start = true;
            }
            last_end = m.end();
        }
        out
    }
}

/// Group tagged tokens into noun chunks.
fn chunk(tagged: &[(Token, WordClass)]) -> Vec<ChunkSpan> {
    let mut chunks = Vec::new();
    let mut i = 0;
    while i < tagged.len() {
        let (token, class) = &tagged[i];
        if *class == WordClass::Pron {
            chunks.push(ChunkSpan {
                start: i,
                end: i + 1,
                root: i,
            });
            i += 1;
            continue;
        }
        if !class.chunkable() {
            i += 1;
            continue;
        }

        let start = i;
        let mut end = i + 1;
        let mut seen_noun = class.is_noun();
        let mut after_hyphen = false;
        while end < tagged.len() {
            let (next, next_class) = &tagged[end];
            if next.sentence != token.sentence {
                break;
            }
            // Whatever a hyphen glues on belongs to the same word.
            if after_hyphen {
                if *next_class == WordClass::Punct {
                    break;
                }
                after_hyphen = false;
                seen_noun |= next_class.is_noun();
                end += 1;
                continue;
            }
            if next.surface == "-" {
                let joinable = tagged.get(end + 1).is_some_and(|(after, c)| {
                    *c != WordClass::Punct && after.sentence == next.sentence
                });
                if joinable && tagged[end - 1].1 != WordClass::Det {
                    after_hyphen = true;
                    end += 1;
                    continue;
                }
                break;
            }
            // A determiner after a noun opens the next chunk.
            if !next_class.chunkable() || (seen_noun && *next_class == WordClass::Det) {
                break;
            }
            seen_noun |= next_class.is_noun();
            end += 1;
        }

        // Trim so the chunk ends at a noun; the last noun is the root.
        if let Some(root) = (start..end).rev().find(|&k| tagged[k].1.is_noun()) {
            chunks.push(ChunkSpan {
                start,
                end: root + 1,
                root,
            });
        }
        i = end;
    }
    chunks
}

#[async_trait]
impl Analyzer for LexiconAnalyzer {
    async fn analyze(&self, text: &str) -> CoreResult<AnalyzedDoc> {
        let tagged = self.tag(text);
        let chunks = chunk(&tagged);
        Ok(AnalyzedDoc {
            tokens: tagged.into_iter().map(|(token, _)| token).collect(),
            chunks,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
