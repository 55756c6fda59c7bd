use serde::{Deserialize, Serialize};

use crate::normalize::normalize_markdown;

/// A document as read from the corpus, before normalization.
///
/// Records may carry `id`, `slug` or both; a missing one is taken from the other.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "SourceRecord")]
pub struct SourceDocument {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub tags: Vec<String>,
    pub tech: Vec<String>,
    pub url: Option<String>,
}

/// An indexed document. `combined_text` is the unit that gets vectorized;
/// `text` is the normalized body used for snippets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "DocumentRecord")]
pub struct Document {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub tech: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub raw_text: String,
    pub text: String,
    pub combined_text: String,
}

impl Document {
    pub fn from_source(src: SourceDocument) -> Self {
        let text = normalize_markdown(&src.body);
        let combined_text = combine_text(&src.title, &src.description, &text, &src.tags, &src.tech);
        let (id, slug) = identity(Some(src.id), Some(src.slug));
        Self {
            id,
            slug,
            title: src.title,
            description: src.description,
            tags: src.tags,
            tech: src.tech,
            url: src.url,
            raw_text: src.body,
            text,
            combined_text,
        }
    }

    /// Case-insensitive match against tags and technologies.
    pub fn has_label(&self, label: &str) -> bool {
        let needle = label.trim().to_lowercase();
        if needle.is_empty() { return false; }
        self.tags.iter().chain(self.tech.iter()).any(|t| t.to_lowercase() == needle)
    }
}

/// Fill an empty `id` or `slug` from the other one.
fn identity(id: Option<String>, slug: Option<String>) -> (String, String) {
    let id = id.filter(|s| !s.is_empty());
    let slug = slug.filter(|s| !s.is_empty());
    match (id, slug) {
        (Some(id), Some(slug)) => (id, slug),
        (Some(id), None) => (id.clone(), id),
        (None, Some(slug)) => (slug.clone(), slug),
        (None, None) => (String::new(), String::new()),
    }
}

#[derive(Deserialize)]
struct SourceRecord {
    id: Option<String>,
    slug: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default, alias = "text")]
    body: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default, alias = "technologies")]
    tech: Vec<String>,
    #[serde(default)]
    url: Option<String>,
}

impl From<SourceRecord> for SourceDocument {
    fn from(r: SourceRecord) -> Self {
        let (id, slug) = identity(r.id, r.slug);
        Self { id, slug, title: r.title, description: r.description, body: r.body, tags: r.tags, tech: r.tech, url: r.url }
    }
}

#[derive(Deserialize)]
struct DocumentRecord {
    id: Option<String>,
    slug: Option<String>,
    title: String,
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    tech: Vec<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    raw_text: String,
    text: String,
    combined_text: String,
}

impl From<DocumentRecord> for Document {
    fn from(r: DocumentRecord) -> Self {
        let (id, slug) = identity(r.id, r.slug);
        Self {
            id,
            slug,
            title: r.title,
            description: r.description,
            tags: r.tags,
            tech: r.tech,
            url: r.url,
            raw_text: r.raw_text,
            text: r.text,
            combined_text: r.combined_text,
        }
    }
}

/// `"{title}. {description}. {body}"` followed by optional tag and technology sentences.
pub fn combine_text(title: &str, description: &str, body: &str, tags: &[String], tech: &[String]) -> String {
    let mut out = format!("{title}. {description}. {body}");
    if !tags.is_empty() {
        out.push_str(&format!(" Tags: {}.", tags.join(", ")));
    }
    if !tech.is_empty() {
        out.push_str(&format!(" Technologies: {}.", tech.join(", ")));
    }
    out
}
