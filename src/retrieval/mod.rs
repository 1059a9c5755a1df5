//! Minimal-relevance retrieval over the corpus. Each document is a
//! TF-IDF weighted term vector over `title + content`; a query is
//! embedded in the same space and scored by cosine similarity. Linear
//! scan per query which is fine for a corpus this small; an inverted
//! index is deliberately out of scope.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::corpus::{Corpus, Document};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("cannot retrieve from an empty corpus")]
    EmptyCorpus,
}

// Words too common to carry signal. Anything here is excluded from
// the vocabulary on both the document and query side.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "did", "do", "does", "for",
    "from", "had", "has", "have", "how", "i", "if", "in", "is", "it", "its", "me", "my", "not",
    "of", "on", "or", "our", "so", "that", "the", "their", "them", "then", "there", "these",
    "they", "this", "to", "was", "we", "were", "what", "when", "where", "which", "who", "why",
    "will", "with", "you", "your",
];

fn is_stop_word(term: &str) -> bool {
    STOP_WORDS.binary_search(&term).is_ok()
}

/// Lowercases and splits on non-alphanumeric boundaries, dropping
/// stop words. No stemming.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && !is_stop_word(t))
        .map(str::to_string)
        .collect()
}

fn term_counts(tokens: &[String]) -> BTreeMap<String, f64> {
    let mut counts = BTreeMap::new();
    for token in tokens {
        *counts.entry(token.clone()).or_insert(0.0) += 1.0;
    }
    counts
}

pub struct TfIdfIndex {
    documents: Vec<Document>,
    // Per-document TF-IDF weights and precomputed vector norms.
    doc_vectors: Vec<BTreeMap<String, f64>>,
    doc_norms: Vec<f64>,
    doc_count: usize,
    doc_freq: BTreeMap<String, usize>,
}

impl TfIdfIndex {
    /// Builds the index, consuming the corpus. Weights use smoothed
    /// IDF (`ln((1 + n) / (1 + df)) + 1`) so terms absent from the
    /// corpus still have a defined weight on the query side. Ordered
    /// maps keep scoring deterministic across rebuilds.
    pub fn build(corpus: Corpus) -> Self {
        let documents = corpus.into_documents();
        let doc_count = documents.len();

        let doc_terms: Vec<BTreeMap<String, f64>> = documents
            .iter()
            .map(|doc| {
                let text = format!("{} {}", doc.title, doc.content);
                term_counts(&tokenize(&text))
            })
            .collect();

        let mut doc_freq: BTreeMap<String, usize> = BTreeMap::new();
        for terms in &doc_terms {
            for term in terms.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }

        let mut doc_vectors = Vec::with_capacity(doc_count);
        let mut doc_norms = Vec::with_capacity(doc_count);
        for terms in doc_terms {
            let vector: BTreeMap<String, f64> = terms
                .into_iter()
                .map(|(term, tf)| {
                    let df = doc_freq.get(&term).copied().unwrap_or(0);
                    let weight = tf * smoothed_idf(doc_count, df);
                    (term, weight)
                })
                .collect();
            let norm = vector.values().map(|w| w * w).sum::<f64>().sqrt();
            doc_vectors.push(vector);
            doc_norms.push(norm);
        }

        Self {
            documents,
            doc_vectors,
            doc_norms,
            doc_count,
            doc_freq,
        }
    }

    /// Returns the single best-matching document for the query by
    /// cosine similarity. Ties and the all-zero-similarity case both
    /// resolve to the earliest corpus position.
    pub fn query(&self, text: &str) -> Result<&Document, RetrievalError> {
        if self.documents.is_empty() {
            return Err(RetrievalError::EmptyCorpus);
        }

        let query_vector: BTreeMap<String, f64> = term_counts(&tokenize(text))
            .into_iter()
            .map(|(term, tf)| {
                let df = self.doc_freq.get(&term).copied().unwrap_or(0);
                let weight = tf * smoothed_idf(self.doc_count, df);
                (term, weight)
            })
            .collect();
        let query_norm = query_vector.values().map(|w| w * w).sum::<f64>().sqrt();

        let mut best_position = 0;
        let mut best_score = self.cosine(0, &query_vector, query_norm);
        for position in 1..self.documents.len() {
            let score = self.cosine(position, &query_vector, query_norm);
            // Strict comparison keeps the earliest position on ties.
            if score > best_score {
                best_score = score;
                best_position = position;
            }
        }

        tracing::debug!(
            "Retrieved document {} ({:?}) with score {:.4}",
            best_position,
            self.documents[best_position].title,
            best_score
        );
        Ok(&self.documents[best_position])
    }

    fn cosine(&self, position: usize, query: &BTreeMap<String, f64>, query_norm: f64) -> f64 {
        let doc = &self.doc_vectors[position];
        let doc_norm = self.doc_norms[position];
        if doc_norm == 0.0 || query_norm == 0.0 {
            return 0.0;
        }
        let dot: f64 = query
            .iter()
            .filter_map(|(term, weight)| doc.get(term).map(|dw| dw * weight))
            .sum();
        dot / (doc_norm * query_norm)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }
}

fn smoothed_idf(doc_count: usize, doc_freq: usize) -> f64 {
    (((1 + doc_count) as f64) / ((1 + doc_freq) as f64)).ln() + 1.0
}
