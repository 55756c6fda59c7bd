use crate::build::BuiltIndex;
use crate::{Document, Vectorizer};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const INDEX_VERSION: u32 = 1;

/// Document dump: everything needed to list and rank documents without the model.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexDump {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub created_at: String,
    pub documents: Vec<Document>,
    #[serde(default)]
    pub feature_names: Vec<String>,
    pub vectors_array: Vec<Vec<f32>>,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index artifact not found: {0}")]
    Missing(PathBuf),
    #[error("failed to read index artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed document dump: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed vectorizer model: {0}")]
    Model(#[from] bincode::Error),
    #[error("vector shape mismatch: {0}")]
    DimensionMismatch(String),
    #[error("index format version {found}, expected {expected}")]
    Version { found: u32, expected: u32 },
}

/// File layout of an index directory. The model blob is paired with the
/// document dump by sharing its file stem.
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn documents(&self) -> PathBuf { self.root.join("index.json") }
    pub fn model(&self) -> PathBuf { self.root.join("index.model.bin") }
}

pub fn save_dump(paths: &IndexPaths, dump: &IndexDump) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.documents())?;
    let json = serde_json::to_string_pretty(dump)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_dump(paths: &IndexPaths) -> Result<IndexDump, IndexError> {
    let path = paths.documents();
    if !path.exists() {
        return Err(IndexError::Missing(path));
    }
    let mut f = File::open(path)?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let dump: IndexDump = serde_json::from_str(&buf)?;
    if dump.version != INDEX_VERSION {
        return Err(IndexError::Version { found: dump.version, expected: INDEX_VERSION });
    }
    Ok(dump)
}

pub fn save_model(paths: &IndexPaths, model: &Vectorizer) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.model())?;
    let bytes = bincode::serialize(model)?;
    f.write_all(&bytes)?;
    Ok(())
}

pub fn load_model(paths: &IndexPaths) -> Result<Vectorizer, IndexError> {
    let path = paths.model();
    if !path.exists() {
        return Err(IndexError::Missing(path));
    }
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let model = bincode::deserialize(&buf)?;
    Ok(model)
}

/// Persist both artifacts of a built index.
pub fn save_index(paths: &IndexPaths, built: &BuiltIndex) -> Result<()> {
    let dump = IndexDump {
        version: INDEX_VERSION,
        created_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
        documents: built.documents.clone(),
        feature_names: built.vectorizer.feature_names(),
        vectors_array: built.vectors.clone(),
    };
    save_dump(paths, &dump)?;
    save_model(paths, &built.vectorizer)?;
    Ok(())
}

/// Check that the dump's vectors line up with its documents and the model.
pub fn check_shape(dump: &IndexDump, model: &Vectorizer) -> Result<(), IndexError> {
    if dump.vectors_array.len() != dump.documents.len() {
        return Err(IndexError::DimensionMismatch(format!(
            "{} vectors for {} documents",
            dump.vectors_array.len(),
            dump.documents.len()
        )));
    }
    let dim = model.num_features();
    if let Some(row) = dump.vectors_array.iter().find(|row| row.len() != dim) {
        return Err(IndexError::DimensionMismatch(format!(
            "vector of length {} against a vocabulary of {}",
            row.len(),
            dim
        )));
    }
    Ok(())
}
