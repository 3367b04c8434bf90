//! Text normalisation helpers shared by the analyzer providers and the
//! annotation assembler.
//!
//! These functions are pure and deterministic: the pipeline's output only
//! depends on them and on the analyzer, never on request state.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// Word-or-symbol splitter used by [`tokenize`].
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-z0-9]+(?:'[a-z]+)?|[^\sa-z0-9]").expect("token regex is valid")
});

/// Terminal punctuation normalised away at the end of an annotation line.
const TERMINAL_PUNCT: &[char] = &['.', '!', '?', ';', ':'];

// ---------------------------------------------------------------------------
// Character-level cleanup
// ---------------------------------------------------------------------------

/// Expand `%XX` hex escapes. Malformed escapes are kept verbatim.
pub fn decode_percent_escapes(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hi = (bytes[i + 1] as char).to_digit(16);
            let lo = (bytes[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Drop every non-ASCII character.
pub fn strip_non_ascii(text: &str) -> String {
    text.chars().filter(char::is_ascii).collect()
}

// ---------------------------------------------------------------------------
// Tokenisation
// ---------------------------------------------------------------------------

/// Lightweight tokenizer used for label names, category names and search
/// queries.
///
/// Lowercases, strips non-ASCII, expands percent-hex escapes and splits into
/// words and single-character symbols. With `strip_punct` the symbols are
/// dropped entirely.
pub fn tokenize(text: &str, strip_punct: bool) -> Vec<String> {
    let cleaned = strip_non_ascii(&decode_percent_escapes(text)).to_lowercase();
    TOKEN_RE
        .find_iter(&cleaned)
        .map(|m| m.as_str())
        .filter(|tok| !strip_punct || tok.chars().any(|c| c.is_ascii_alphanumeric()))
        .map(str::to_string)
        .collect()
}

/// Normalise one raw annotation string before analysis.
///
/// Expands escapes, drops non-ASCII, collapses whitespace and strips trailing
/// terminal punctuation. Case is preserved so the tagger can see proper nouns.
pub fn normalize_annotation(text: &str) -> String {
    let cleaned = strip_non_ascii(&decode_percent_escapes(text));
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(|c: char| TERMINAL_PUNCT.contains(&c) || c.is_whitespace())
        .to_string()
}

/// A multi-line document assembled from several annotation strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedDocument {
    /// Lines terminated by `.` and joined with `\n`.
    pub text: String,
    /// Byte range of each line's content, excluding the appended `.`.
    pub line_ranges: Vec<Range<usize>>,
}

impl JoinedDocument {
    /// Index of the line containing byte `offset`, if any.
    pub fn line_of(&self, offset: usize) -> Option<usize> {
        self.line_ranges
            .iter()
            .position(|range| range.contains(&offset))
    }
}

/// Join annotation strings into one document so they can be analyzed in a
/// single call. Each line's terminal punctuation is normalised to `.`.
pub fn join_document<S: AsRef<str>>(lines: &[S]) -> JoinedDocument {
    let mut text = String::new();
    let mut line_ranges = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            text.push('\n');
        }
        let normalized = normalize_annotation(line.as_ref());
        let start = text.len();
        text.push_str(&normalized);
        line_ranges.push(start..text.len());
        if !normalized.is_empty() {
            text.push('.');
        }
    }
    JoinedDocument { text, line_ranges }
}

/// Rebuild phrase text from a slice of annotation tokens.
///
/// Tokens are joined with spaces, except that single-character punctuation
/// and any token following a hyphen attach to the previous token.
pub fn reconstruct_phrase<S: AsRef<str>>(tokens: &[S]) -> String {
    let mut out = String::new();
    let mut prev_hyphen = false;
    for (i, token) in tokens.iter().enumerate() {
        let token = token.as_ref();
        let is_punct = token.len() == 1 && token.chars().all(|c| c.is_ascii_punctuation());
        if i > 0 && !is_punct && !prev_hyphen {
            out.push(' ');
        }
        out.push_str(token);
        prev_hyphen = token == "-";
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
