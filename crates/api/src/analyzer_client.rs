//! HTTP client for an external tokenizer / tagger / noun-chunker.
//!
//! The service receives `POST {url}` with `{ "text": ... }` and answers in
//! the spaCy-style shape
//! `{ "tokens": [{ text, lemma, pos, sent, idx }], "noun_chunks": [{ start, end, root }] }`.

use async_trait::async_trait;
use glossa_core::error::{CoreError, CoreResult};
use glossa_core::nlp::{AnalyzedDoc, Analyzer, ChunkSpan, Pos, Token};
use serde::{Deserialize, Serialize};

/// [`Analyzer`] backed by a remote tagging service.
pub struct HttpAnalyzer {
    client: reqwest::Client,
    api_url: String,
}

/// Errors from the analyzer HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerClientError {
    /// The HTTP request itself failed (network, DNS, TLS, decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Analyzer API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl From<AnalyzerClientError> for CoreError {
    fn from(err: AnalyzerClientError) -> Self {
        CoreError::Internal(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    text: &'a str,
}

/// Wire shape of one token.
#[derive(Debug, Deserialize)]
pub struct WireToken {
    pub text: String,
    pub lemma: String,
    pub pos: String,
    /// Sentence index.
    pub sent: usize,
    /// Offset of the first character in the analyzed text.
    pub idx: usize,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WireChunk {
    pub start: usize,
    pub end: usize,
    pub root: usize,
}

#[derive(Debug, Deserialize)]
pub struct WireDoc {
    pub tokens: Vec<WireToken>,
    #[serde(default)]
    pub noun_chunks: Vec<WireChunk>,
}

impl HttpAnalyzer {
    /// * `api_url` - Full endpoint URL, e.g. `http://tagger:8080/analyze`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Reuse an existing [`reqwest::Client`] (timeouts, pooling).
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    async fn fetch(&self, text: &str) -> Result<WireDoc, AnalyzerClientError> {
        let response = self
            .client
            .post(&self.api_url)
            .json(&AnalyzeRequest { text })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(AnalyzerClientError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<WireDoc>().await?)
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn analyze(&self, text: &str) -> CoreResult<AnalyzedDoc> {
        let wire = self.fetch(text).await?;
        Ok(into_analyzed(wire))
    }
}

/// Convert the wire document, dropping chunks that do not fit the tokens.
pub fn into_analyzed(wire: WireDoc) -> AnalyzedDoc {
    let tokens: Vec<Token> = wire
        .tokens
        .into_iter()
        .enumerate()
        .map(|(index, t)| Token {
            index,
            lemma: t.lemma.to_lowercase(),
            pos: Pos::from_universal(&t.pos),
            surface: t.text,
            sentence: t.sent,
            offset: t.idx,
        })
        .collect();

    let chunks = wire
        .noun_chunks
        .into_iter()
        .filter(|c| {
            let ok = c.start < c.end && c.end <= tokens.len() && (c.start..c.end).contains(&c.root);
            if !ok {
                tracing::warn!(start = c.start, end = c.end, root = c.root, "Dropping malformed noun chunk");
            }
            ok
        })
        .map(|c| ChunkSpan {
            start: c.start,
            end: c.end,
            root: c.root,
        })
        .collect();

    AnalyzedDoc { tokens, chunks }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_document_maps_to_tokens_and_chunks() {
        let wire: WireDoc = serde_json::from_value(serde_json::json!({
            "tokens": [
                { "text": "Red", "lemma": "Red", "pos": "ADJ", "sent": 0, "idx": 0 },
                { "text": "wings", "lemma": "wing", "pos": "NOUN", "sent": 0, "idx": 4 },
                { "text": "flap", "lemma": "flap", "pos": "VERB", "sent": 0, "idx": 10 }
            ],
            "noun_chunks": [
                { "start": 0, "end": 2, "root": 1 },
                { "start": 2, "end": 5, "root": 3 },
                { "start": 1, "end": 1, "root": 1 }
            ]
        }))
        .unwrap();

        let doc = into_analyzed(wire);

        assert_eq!(doc.tokens.len(), 3);
        assert_eq!(doc.tokens[0].surface, "Red");
        assert_eq!(doc.tokens[0].lemma, "red");
        assert_eq!(doc.tokens[1].pos, Pos::Noun);
        assert_eq!(doc.tokens[1].offset, 4);
        assert_eq!(doc.tokens[2].pos, Pos::Other);
        assert_eq!(doc.tokens[2].index, 2);
        assert_eq!(doc.chunks, vec![ChunkSpan { start: 0, end: 2, root: 1 }]);
    }

    #[test]
    fn missing_chunks_default_to_empty() {
        let wire: WireDoc = serde_json::from_str(r#"{ "tokens": [] }"#).unwrap();
        assert_eq!(into_analyzed(wire), AnalyzedDoc::default());
    }
}
