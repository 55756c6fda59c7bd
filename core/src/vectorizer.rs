//! TF-IDF vectorizer fitted over the corpus' combined texts.
//!
//! The fitted model is what gets persisted as the binary artifact: query vectors
//! and document vectors both come out of [`Vectorizer::transform`], so they share
//! one vocabulary and one set of idf weights.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::tokenizer::analyze;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizerConfig {
    /// Keep at most this many terms, ranked by corpus-wide count.
    pub max_features: usize,
    pub ngram_range: (usize, usize),
    /// Minimum number of documents a term must appear in.
    pub min_df: u32,
    /// Drop terms appearing in more than this proportion of documents.
    pub max_df: f64,
    pub smooth_idf: bool,
    pub sublinear_tf: bool,
    pub stem: bool,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            max_features: 5000,
            ngram_range: (1, 2),
            min_df: 1,
            max_df: 0.8,
            smooth_idf: true,
            sublinear_tf: false,
            stem: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vectorizer {
    pub config: VectorizerConfig,
    /// term -> feature index; indices follow lexicographic term order.
    pub vocabulary: BTreeMap<String, u32>,
    /// idf weight per feature index.
    pub idf: Vec<f32>,
}

impl Vectorizer {
    /// A model with no vocabulary. Every transform yields an empty vector.
    pub fn empty(config: VectorizerConfig) -> Self {
        Self { config, vocabulary: BTreeMap::new(), idf: Vec::new() }
    }

    pub fn fit<S: AsRef<str>>(texts: &[S], config: VectorizerConfig) -> Self {
        let n = texts.len();
        if n == 0 {
            return Self::empty(config);
        }

        let mut df: HashMap<String, u32> = HashMap::new();
        let mut totals: HashMap<String, u64> = HashMap::new();
        for text in texts {
            let counts = count_terms(text.as_ref(), &config);
            for (term, c) in counts {
                *df.entry(term.clone()).or_insert(0) += 1;
                *totals.entry(term).or_insert(0) += c as u64;
            }
        }

        // The max_df cut-off never drops below min_df, otherwise a one-document
        // corpus would lose every term.
        let max_doc_count = (config.max_df * n as f64).max(config.min_df as f64);
        let mut kept: Vec<(String, u64)> = totals
            .into_iter()
            .filter(|(term, _)| {
                let d = df[term];
                d >= config.min_df && (d as f64) <= max_doc_count
            })
            .collect();

        if kept.len() > config.max_features {
            kept.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            kept.truncate(config.max_features);
        }
        kept.sort_by(|a, b| a.0.cmp(&b.0));

        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(kept.len());
        for (i, (term, _)) in kept.into_iter().enumerate() {
            let d = df[&term] as f64;
            let w = if config.smooth_idf {
                ((1.0 + n as f64) / (1.0 + d)).ln() + 1.0
            } else {
                (n as f64 / d).ln() + 1.0
            };
            idf.push(w as f32);
            vocabulary.insert(term, i as u32);
        }

        tracing::debug!(num_docs = n, num_terms = vocabulary.len(), "fitted vectorizer");
        Self { config, vocabulary, idf }
    }

    pub fn num_features(&self) -> usize { self.vocabulary.len() }

    pub fn feature_names(&self) -> Vec<String> {
        // BTreeMap iteration order equals feature index order.
        self.vocabulary.keys().cloned().collect()
    }

    /// Dense, L2-normalized tf-idf vector. Out-of-vocabulary terms are ignored.
    pub fn transform(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.num_features()];
        if vec.is_empty() {
            return vec;
        }
        for (term, c) in count_terms(text, &self.config) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                let tf = if self.config.sublinear_tf { 1.0 + (c as f32).ln() } else { c as f32 };
                vec[idx as usize] = tf * self.idf[idx as usize];
            }
        }
        let norm = vec.iter().map(|w| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            for w in vec.iter_mut() { *w /= norm; }
        }
        vec
    }
}

fn count_terms(text: &str, config: &VectorizerConfig) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for term in analyze(text, config.ngram_range, config.stem) {
        *counts.entry(term).or_insert(0) += 1;
    }
    counts
}

/// Cosine similarity; 0.0 when lengths differ or either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}
