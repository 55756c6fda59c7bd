//! Query side of the retrieval index.
//!
//! A [`Searcher`] is loaded once and only read afterwards. Every failure to load
//! collapses into degraded mode: search returns no results and a warning is logged.

use serde::Serialize;

use crate::build::BuiltIndex;
use crate::persist::{check_shape, load_dump, load_model, IndexError, IndexPaths};
use crate::vectorizer::cosine_similarity;
use crate::{Document, Vectorizer};

pub const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub document: Document,
    pub similarity_score: f32,
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub k: usize,
    /// Results must score strictly above zero and at least this much.
    pub min_score: f32,
    /// When non-empty, only documents carrying one of these tags or technologies.
    pub labels: Vec<String>,
}

impl SearchOptions {
    pub fn top(k: usize) -> Self {
        Self { k, min_score: 0.0, labels: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub documents: usize,
    pub model_loaded: bool,
}

#[derive(Debug, Default)]
pub struct Searcher {
    documents: Vec<Document>,
    vectors: Vec<Vec<f32>>,
    model: Option<Vectorizer>,
}

impl Searcher {
    /// A searcher with nothing loaded.
    pub fn empty() -> Self { Self::default() }

    pub fn from_built(built: BuiltIndex) -> Self {
        Self { documents: built.documents, vectors: built.vectors, model: Some(built.vectorizer) }
    }

    /// Load both artifacts. The document dump alone still serves listing and lookup.
    pub fn load(paths: &IndexPaths) -> Self {
        match Self::try_load(paths) {
            Ok(searcher) => searcher,
            Err(err) => {
                tracing::warn!(error = %err, root = %paths.root.display(), "retrieval index unavailable, search disabled");
                Self::empty()
            }
        }
    }

    fn try_load(paths: &IndexPaths) -> Result<Self, IndexError> {
        let dump = load_dump(paths)?;
        let model = match load_model(paths).and_then(|m| check_shape(&dump, &m).map(|_| m)) {
            Ok(m) => Some(m),
            Err(err) => {
                tracing::warn!(error = %err, "vectorizer model unavailable, search disabled");
                None
            }
        };
        if dump.documents.is_empty() {
            tracing::info!("loaded empty retrieval index");
        } else {
            tracing::info!(num_docs = dump.documents.len(), model_loaded = model.is_some(), "loaded retrieval index");
        }
        let vectors = if model.is_some() { dump.vectors_array } else { Vec::new() };
        Ok(Self { documents: dump.documents, vectors, model })
    }

    pub fn status(&self) -> IndexStatus {
        IndexStatus { documents: self.documents.len(), model_loaded: self.model.is_some() }
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some() && !self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] { &self.documents }

    pub fn get(&self, slug: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.slug == slug)
    }

    /// Top `k` documents by cosine similarity to `query`, scores strictly positive.
    pub fn search(&self, query: &str, k: usize) -> Vec<SearchHit> {
        self.search_with(query, &SearchOptions::top(k))
    }

    pub fn search_with(&self, query: &str, opts: &SearchOptions) -> Vec<SearchHit> {
        if query.trim().is_empty() || opts.k == 0 {
            return Vec::new();
        }
        let model = match &self.model {
            Some(m) if !self.documents.is_empty() => m,
            _ => return Vec::new(),
        };
        let qv = model.transform(query);
        self.rank(&qv, opts, None)
    }

    /// Documents most similar to the one identified by `slug`, itself excluded.
    pub fn related(&self, slug: &str, k: usize) -> Vec<SearchHit> {
        if k == 0 || self.model.is_none() {
            return Vec::new();
        }
        let Some(pos) = self.documents.iter().position(|d| d.slug == slug) else {
            return Vec::new();
        };
        self.rank(&self.vectors[pos], &SearchOptions::top(k), Some(pos))
    }

    fn rank(&self, qv: &[f32], opts: &SearchOptions, exclude: Option<usize>) -> Vec<SearchHit> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != exclude)
            .filter(|(i, _)| opts.labels.is_empty() || opts.labels.iter().any(|l| self.documents[*i].has_label(l)))
            .map(|(i, v)| (i, cosine_similarity(qv, v)))
            .filter(|(_, s)| *s > 0.0 && *s >= opts.min_score)
            .collect();
        // stable: equal scores keep corpus order
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(opts.k)
            .map(|(i, score)| {
                let document = self.documents[i].clone();
                let snippet = snippet(&document.text);
                SearchHit { document, similarity_score: score, snippet }
            })
            .collect()
    }
}

/// First [`SNIPPET_CHARS`] characters of `text`, with `...` when truncated.
pub fn snippet(text: &str) -> String {
    match text.char_indices().nth(SNIPPET_CHARS) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_truncates_on_char_boundary() {
        let text = "é".repeat(250);
        let s = snippet(&text);
        assert_eq!(s.chars().count(), SNIPPET_CHARS + 3);
        assert!(s.ends_with("..."));
        assert_eq!(snippet("short"), "short");
        let exact = "x".repeat(SNIPPET_CHARS);
        assert_eq!(snippet(&exact), exact);
    }

    #[test]
    fn empty_searcher_returns_nothing() {
        let s = Searcher::empty();
        assert!(s.search("anything", 5).is_empty());
        assert!(s.related("a", 5).is_empty());
        assert!(!s.status().model_loaded);
    }
}
