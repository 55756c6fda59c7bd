use crate::{Document, SourceDocument, Vectorizer, VectorizerConfig};
use std::collections::HashSet;

/// In-memory result of the offline build: documents in corpus order, the fitted
/// model, and one vector per document (same order).
#[derive(Debug, Clone)]
pub struct BuiltIndex {
    pub documents: Vec<Document>,
    pub vectorizer: Vectorizer,
    pub vectors: Vec<Vec<f32>>,
}

impl BuiltIndex {
    pub fn is_empty(&self) -> bool { self.documents.is_empty() }
}

/// Normalize, deduplicate by slug, fit the vectorizer and vectorize every document.
/// Zero documents produce an empty index rather than an error.
pub fn build_index(sources: Vec<SourceDocument>, config: VectorizerConfig) -> BuiltIndex {
    let mut seen: HashSet<String> = HashSet::new();
    let mut documents = Vec::with_capacity(sources.len());
    for src in sources {
        if src.slug.trim().is_empty() {
            tracing::warn!(title = %src.title, "skipping document without a slug");
            continue;
        }
        if !seen.insert(src.slug.clone()) {
            tracing::warn!(slug = %src.slug, "skipping duplicate slug");
            continue;
        }
        documents.push(Document::from_source(src));
    }

    if documents.is_empty() {
        tracing::warn!("corpus has no valid documents, building an empty index");
        return BuiltIndex { documents, vectorizer: Vectorizer::empty(config), vectors: Vec::new() };
    }

    let texts: Vec<&str> = documents.iter().map(|d| d.combined_text.as_str()).collect();
    let vectorizer = Vectorizer::fit(&texts, config);
    let vectors = texts.iter().map(|t| vectorizer.transform(t)).collect();
    tracing::info!(num_docs = documents.len(), num_terms = vectorizer.num_features(), "built index");
    BuiltIndex { documents, vectorizer, vectors }
}
