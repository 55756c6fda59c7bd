//! Reading source documents from a corpus directory.
//!
//! Markdown (`.md`, `.mdx`) files may open with a YAML front matter block;
//! `.json` files hold one document or an array, `.jsonl` one document per line.
//! Unreadable or unparsable sources are skipped with a warning.

use crate::SourceDocument;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

#[derive(Debug, Default, Deserialize)]
struct FrontMatter {
    slug: Option<String>,
    title: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default, alias = "technologies")]
    tech: Vec<String>,
    url: Option<String>,
}

/// Walk `dir` in file-name order and collect every document that parses.
pub fn load_corpus(dir: &Path) -> Vec<SourceDocument> {
    if !dir.exists() {
        tracing::warn!(path = %dir.display(), "corpus directory does not exist");
        return Vec::new();
    }
    let mut docs = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name().into_iter() {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable corpus entry");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() { continue; }
        let ext = match path.extension().and_then(|s| s.to_str()) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => continue,
        };
        let parsed = match ext.as_str() {
            "md" | "mdx" => parse_markdown_file(path).map(|d| vec![d]),
            "json" => parse_json_file(path),
            "jsonl" => parse_jsonl_file(path),
            _ => continue,
        };
        match parsed {
            Ok(mut found) => docs.append(&mut found),
            Err(err) => tracing::warn!(path = %path.display(), error = %err, "skipping unparsable document"),
        }
    }
    tracing::info!(num_docs = docs.len(), path = %dir.display(), "loaded corpus");
    docs
}

fn parse_markdown_file(path: &Path) -> Result<SourceDocument> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| anyhow!("file name is not valid UTF-8"))?;
    parse_markdown(stem, &raw)
}

/// Parse a markdown document with optional `---` delimited front matter.
pub fn parse_markdown(default_slug: &str, raw: &str) -> Result<SourceDocument> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let (front, body) = split_front_matter(raw)?;
    let fm: FrontMatter = match front {
        Some(yaml) if !yaml.trim().is_empty() => serde_yaml::from_str(yaml).context("invalid front matter")?,
        _ => FrontMatter::default(),
    };
    let slug = fm.slug.unwrap_or_else(|| default_slug.to_string());
    if slug.trim().is_empty() {
        return Err(anyhow!("document has an empty slug"));
    }
    Ok(SourceDocument {
        id: slug.clone(),
        title: fm.title.unwrap_or_else(|| slug.clone()),
        slug,
        description: fm.description,
        body: body.to_string(),
        tags: fm.tags,
        tech: fm.tech,
        url: fm.url,
    })
}

fn split_front_matter(raw: &str) -> Result<(Option<&str>, &str)> {
    let first_line_end = raw.find('\n').unwrap_or(raw.len());
    if raw[..first_line_end].trim_end() != "---" {
        return Ok((None, raw));
    }
    let rest = &raw[(first_line_end + 1).min(raw.len())..];
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Ok((Some(yaml), body));
        }
        offset += line.len();
    }
    Err(anyhow!("front matter is not terminated"))
}

fn parse_json_file(path: &Path) -> Result<Vec<SourceDocument>> {
    let raw = fs::read_to_string(path)?;
    let json: serde_json::Value = serde_json::from_str(&raw)?;
    match json {
        serde_json::Value::Array(arr) => arr
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(Into::into))
            .collect(),
        serde_json::Value::Object(_) => Ok(vec![serde_json::from_value(json)?]),
        _ => Err(anyhow!("expected a document object or an array of them")),
    }
}

fn parse_jsonl_file(path: &Path) -> Result<Vec<SourceDocument>> {
    let raw = fs::read_to_string(path)?;
    let mut docs = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() { continue; }
        match serde_json::from_str::<SourceDocument>(line) {
            Ok(doc) => docs.push(doc),
            Err(err) => tracing::warn!(path = %path.display(), line = lineno + 1, error = %err, "skipping bad jsonl record"),
        }
    }
    Ok(docs)
}
