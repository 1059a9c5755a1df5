//! The static corpus of TMS reference documents. Loaded once at
//! startup and read-only for the process lifetime.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Load-time failures, split by where the data went wrong.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// The file is missing, unreadable, or its content is not JSON at
    /// all (including an empty file).
    #[error("corpus unavailable: {0}")]
    DataUnavailable(String),
    /// The content is valid JSON with the wrong shape: no top-level
    /// `documents` array, or a document lacking a `title` or `content`
    /// string.
    #[error("corpus schema error: {0}")]
    Schema(String),
}

/// One retrievable document. Identity is its position in the corpus
/// sequence. Never mutated after load.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub title: String,
    pub content: String,
}

// Fields are optional at the parse stage so a missing title or
// content surfaces as a schema error with the document's position
// rather than an opaque decode failure.
#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct RawCorpus {
    documents: Vec<RawDocument>,
}

#[derive(Clone, Debug, Default)]
pub struct Corpus(Vec<Document>);

impl Corpus {
    /// Reads and validates the corpus file. The expected shape is a
    /// top-level `documents` array of `{title, content}` objects.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CorpusError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            CorpusError::DataUnavailable(format!("{}: {}", path.display(), e))
        })?;
        let parsed: RawCorpus = serde_json::from_str(&raw).map_err(|e| {
            if raw.trim().is_empty() || serde_json::from_str::<serde_json::Value>(&raw).is_err() {
                CorpusError::DataUnavailable(format!("{}: {}", path.display(), e))
            } else {
                CorpusError::Schema(format!("{}: {}", path.display(), e))
            }
        })?;

        let mut documents = Vec::with_capacity(parsed.documents.len());
        for (position, doc) in parsed.documents.into_iter().enumerate() {
            let title = doc.title.ok_or_else(|| {
                CorpusError::Schema(format!("document {} is missing a title", position))
            })?;
            let content = doc.content.ok_or_else(|| {
                CorpusError::Schema(format!("document {} is missing content", position))
            })?;
            documents.push(Document { title, content });
        }

        tracing::debug!("Loaded {} corpus documents from {}", documents.len(), path.display());
        Ok(Self(documents))
    }

    pub fn from_documents(documents: Vec<Document>) -> Self {
        Self(documents)
    }

    pub fn documents(&self) -> &[Document] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.0
    }
}
