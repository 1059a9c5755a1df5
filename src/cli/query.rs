use anyhow::Result;
use serde_json::json;

use crate::core::AppConfig;
use crate::corpus::Corpus;
use crate::retrieval::TfIdfIndex;

pub async fn run(term: String, config: &AppConfig) -> Result<()> {
    let corpus = Corpus::load(&config.corpus_path)?;
    let index = TfIdfIndex::build(corpus);
    let doc = index.query(&term)?;
    println!(
        "{}",
        json!({
            "query": term,
            "title": doc.title,
            "content": doc.content,
        })
    );
    Ok(())
}
