//! Noun-phrase extraction.
//!
//! Filters raw noun chunks down to `(adjectives, nouns, root)` groups, joins
//! hyphenated words, detects label mentions and yields phrase records with
//! token and byte spans. The rules are fixed:
//!
//! 1. Single-token chunks are skipped.
//! 2. Only ADJ, NOUN, PROPN and PRON tokens are kept.
//! 3. A `-` after an ADJ/NOUN/PROPN joins both neighbours into one synthetic
//!    token carrying the left neighbour's POS.
//! 4. Adjectives of length <= 1 are dropped.
//! 5. The root is the tagger's chunk root, or the synthetic token absorbing it.
//! 6. A chunk with adjectives but no noun gets a synthetic `subject` noun.
//! 7. A label span is emitted when every label token appears in the chunk.
//!
//! Within a chunk a new concept starts at an adjective that follows a noun.

use std::collections::HashSet;

use serde::Serialize;

use crate::nlp::{AnalyzedDoc, ChunkSpan, Pos, Token};
use crate::text::JoinedDocument;

/// Noun emitted for chunks that only carry adjectives.
pub const SUBJECT_NOUN: &str = "subject";

/// A filtered chunk token; possibly a synthetic hyphen join of several tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhraseToken {
    /// Lowercased surface form.
    pub surface: String,
    pub lemma: String,
    pub pos: Pos,
    /// First covered token index.
    pub start: usize,
    /// One past the last covered token index.
    pub end: usize,
    pub byte_start: usize,
    pub byte_end: usize,
}

impl PhraseToken {
    fn from_token(token: &Token) -> Self {
        Self {
            surface: token.lower(),
            lemma: token.lemma.to_lowercase(),
            pos: token.pos,
            start: token.index,
            end: token.index + 1,
            byte_start: token.offset,
            byte_end: token.offset + token.surface.len(),
        }
    }

    /// Glue `right` onto `self` across a hyphen.
    fn join(&self, right: &Token) -> Self {
        Self {
            surface: format!("{}-{}", self.surface, right.lower()),
            lemma: format!("{}-{}", self.lemma, right.lemma.to_lowercase()),
            pos: self.pos,
            start: self.start,
            end: right.index + 1,
            byte_start: self.byte_start,
            byte_end: right.offset + right.surface.len(),
        }
    }

    fn subject_at(anchor: &PhraseToken) -> Self {
        Self {
            surface: SUBJECT_NOUN.to_string(),
            lemma: SUBJECT_NOUN.to_string(),
            pos: Pos::Noun,
            start: anchor.end,
            end: anchor.end,
            byte_start: anchor.byte_end,
            byte_end: anchor.byte_end,
        }
    }

    fn covers(&self, index: usize) -> bool {
        (self.start..self.end).contains(&index)
    }

    pub fn is_synthetic_subject(&self) -> bool {
        self.start == self.end
    }
}

/// One extracted concept candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NounPhrase {
    pub token_start: usize,
    pub token_end: usize,
    pub byte_start: usize,
    pub byte_end: usize,
    pub adjectives: Vec<PhraseToken>,
    pub nouns: Vec<PhraseToken>,
    pub root_noun: PhraseToken,
    pub is_label_mention: bool,
    pub label_span: Option<(usize, usize)>,
}

impl NounPhrase {
    /// Adjectives then nouns, plus the root when it is not among the nouns.
    pub fn words(&self) -> Vec<&PhraseToken> {
        let mut words: Vec<&PhraseToken> = self.adjectives.iter().chain(&self.nouns).collect();
        if !self.nouns.contains(&self.root_noun) {
            words.push(&self.root_noun);
        }
        words
    }
}

/// An item produced for one annotation line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Extraction {
    Phrase(NounPhrase),
    /// Token range `[start, end)` mentioning the object's label.
    LabelSpan { start: usize, end: usize },
}

/// Extraction output for one line of a joined document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineExtraction {
    pub line: usize,
    /// The line's analysis with indices and offsets rebased to the line.
    pub doc: AnalyzedDoc,
    pub items: Vec<Extraction>,
}

// ---------------------------------------------------------------------------
// Chunk filtering
// ---------------------------------------------------------------------------

/// Rules 2, 3 and 5: keep content tokens, join hyphens, locate the root.
fn filter_chunk(tokens: &[Token], span: &ChunkSpan) -> (Vec<PhraseToken>, Option<usize>) {
    let mut kept: Vec<PhraseToken> = Vec::new();
    let mut root: Option<usize> = None;
    let mut i = span.start;
    while i < span.end {
        let token = &tokens[i];
        if token.surface == "-" && i + 1 < span.end {
            if let Some(prev) = kept.last() {
                let next = &tokens[i + 1];
                if prev.end == i && prev.pos.is_hyphen_joinable() && next.pos.is_hyphen_joinable() {
                    let joined = prev.join(next);
                    let last = kept.len() - 1;
                    kept[last] = joined;
                    if kept[last].covers(span.root) {
                        root = Some(last);
                    }
                    i += 2;
                    continue;
                }
            }
        }
        if matches!(token.pos, Pos::Adj | Pos::Noun | Pos::Propn | Pos::Pron) {
            if token.index == span.root {
                root = Some(kept.len());
            }
            kept.push(PhraseToken::from_token(token));
        }
        i += 1;
    }
    (kept, root)
}

/// Rule 7: the label span when every label token is among the kept surfaces.
fn label_span(kept: &[PhraseToken], label_tokens: &HashSet<String>) -> Option<(usize, usize)> {
    if label_tokens.is_empty() {
        return None;
    }
    let surfaces: HashSet<&str> = kept.iter().map(|t| t.surface.as_str()).collect();
    if !label_tokens.iter().all(|t| surfaces.contains(t.as_str())) {
        return None;
    }
    let matching = kept.iter().filter(|t| label_tokens.contains(&t.surface));
    let start = matching.clone().map(|t| t.start).min()?;
    let end = matching.map(|t| t.end).max()?;
    Some((start, end))
}

/// Split kept tokens into concept groups: a new group opens at an adjective
/// that follows a noun. Pronouns never belong to a group.
pub fn split_concept_groups(kept: &[PhraseToken]) -> Vec<Vec<PhraseToken>> {
    let mut groups: Vec<Vec<PhraseToken>> = Vec::new();
    let mut current: Vec<PhraseToken> = Vec::new();
    let mut seen_noun = false;
    for token in kept.iter().filter(|t| t.pos != Pos::Pron) {
        let is_adj = token.pos == Pos::Adj;
        if is_adj && seen_noun {
            groups.push(std::mem::take(&mut current));
            seen_noun = false;
        }
        seen_noun |= token.pos.is_noun();
        current.push(token.clone());
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

/// Build a phrase from one group (rules 4 and 6). `None` when nothing is left.
fn build_phrase(group: Vec<PhraseToken>, chunk_root: Option<&PhraseToken>) -> Option<NounPhrase> {
    let (adjectives, mut nouns): (Vec<PhraseToken>, Vec<PhraseToken>) =
        group.into_iter().partition(|t| t.pos == Pos::Adj);
    let adjectives: Vec<PhraseToken> = adjectives
        .into_iter()
        .filter(|t| t.surface.len() > 1)
        .collect();

    let present = || adjectives.iter().chain(&nouns);
    let first = present().min_by_key(|t| t.start)?.clone();
    let last = present().max_by_key(|t| t.end)?.clone();

    if nouns.is_empty() {
        let anchor = adjectives.last()?;
        nouns.push(PhraseToken::subject_at(anchor));
    }
    let root_noun = chunk_root
        .filter(|root| nouns.contains(root))
        .cloned()
        .or_else(|| nouns.last().cloned())?;

    Some(NounPhrase {
        token_start: first.start,
        token_end: last.end,
        byte_start: first.byte_start,
        byte_end: last.byte_end,
        adjectives,
        nouns,
        root_noun,
        is_label_mention: false,
        label_span: None,
    })
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Extract phrases and label spans from one analyzed annotation.
///
/// `label_tokens` are the object's lowercased label name tokens; pass an
/// empty set to disable label detection.
pub fn extract(doc: &AnalyzedDoc, label_tokens: &HashSet<String>) -> Vec<Extraction> {
    let mut items = Vec::new();
    for span in &doc.chunks {
        if span.len() < 2 || span.end > doc.tokens.len() {
            continue;
        }
        let (kept, root_idx) = filter_chunk(&doc.tokens, span);
        let root = root_idx.map(|i| kept[i].clone());
        let label = label_span(&kept, label_tokens);
        let has_adjectives = kept
            .iter()
            .any(|t| t.pos == Pos::Adj && t.surface.len() > 1);

        if label.is_none() || has_adjectives {
            for group in split_concept_groups(&kept) {
                if let Some(mut phrase) = build_phrase(group, root.as_ref()) {
                    phrase.is_label_mention = label.is_some();
                    phrase.label_span = label;
                    items.push(Extraction::Phrase(phrase));
                }
            }
        }
        if let Some((start, end)) = label {
            items.push(Extraction::LabelSpan { start, end });
        }
    }
    items
}

/// Treat the whole analysis as a single chunk and build one phrase.
///
/// Used when a user marks an explicit token range: no chunk splitting and no
/// single-token skip. Returns `None` when no adjective or noun survives.
pub fn extract_whole(doc: &AnalyzedDoc) -> Option<NounPhrase> {
    if doc.tokens.is_empty() {
        return None;
    }
    let root = doc
        .tokens
        .iter()
        .rev()
        .find(|t| t.pos.is_noun())
        .map_or(doc.tokens.len() - 1, |t| t.index);
    let span = ChunkSpan {
        start: 0,
        end: doc.tokens.len(),
        root,
    };
    let (kept, root_idx) = filter_chunk(&doc.tokens, &span);
    let root = root_idx.map(|i| kept[i].clone());
    let content: Vec<PhraseToken> = kept.into_iter().filter(|t| t.pos != Pos::Pron).collect();
    build_phrase(content, root.as_ref())
}

/// Slice a joined multi-line analysis into per-line analyses.
///
/// Tokens outside every line range (the appended `.` terminators) are
/// dropped; chunks are clipped to their line and discarded when the root
/// falls outside it.
pub fn split_lines(doc: &AnalyzedDoc, joined: &JoinedDocument) -> Vec<AnalyzedDoc> {
    let mut lines: Vec<AnalyzedDoc> = vec![AnalyzedDoc::default(); joined.line_ranges.len()];
    // Global token index -> (line, local index).
    let mut placement: Vec<Option<(usize, usize)>> = vec![None; doc.tokens.len()];

    for token in &doc.tokens {
        let Some(line) = joined.line_of(token.offset) else {
            continue;
        };
        let target = &mut lines[line];
        let local = target.tokens.len();
        placement[token.index] = Some((line, local));
        target.tokens.push(Token {
            index: local,
            offset: token.offset - joined.line_ranges[line].start,
            ..token.clone()
        });
    }

    for span in &doc.chunks {
        let Some(Some((line, root))) = placement.get(span.root).copied() else {
            continue;
        };
        let local: Vec<usize> = (span.start..span.end)
            .filter_map(|i| placement.get(i).copied().flatten())
            .filter(|(l, _)| *l == line)
            .map(|(_, idx)| idx)
            .collect();
        if let (Some(&start), Some(&last)) = (local.first(), local.last()) {
            lines[line].chunks.push(ChunkSpan {
                start,
                end: last + 1,
                root,
            });
        }
    }
    lines
}

/// Extract every line of a joined document against the same label.
pub fn extract_lines(
    doc: &AnalyzedDoc,
    joined: &JoinedDocument,
    label_tokens: &HashSet<String>,
) -> Vec<LineExtraction> {
    split_lines(doc, joined)
        .into_iter()
        .enumerate()
        .map(|(line, doc)| {
            let items = extract(&doc, label_tokens);
            LineExtraction { line, doc, items }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
