//! In-memory vector index over model embeddings

use crate::llm::{LlmClient, LlmError};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Texts sent per embedding request
const EMBED_BATCH: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub text: String,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryHit {
    pub id: String,
    pub text: String,
    pub score: f32,
}

struct Entry {
    id: String,
    text: String,
    vector: Vec<f32>,
}

/// Cosine-similarity index; documents are upserted by id
pub struct VectorIndex {
    llm: Arc<dyn LlmClient>,
    entries: RwLock<Vec<Entry>>,
}

impl VectorIndex {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Embed and store documents, replacing any with the same id
    pub async fn add_documents(&self, documents: Vec<Document>) -> Result<usize, LlmError> {
        let mut embedded = Vec::with_capacity(documents.len());
        for chunk in documents.chunks(EMBED_BATCH) {
            let texts: Vec<String> = chunk.iter().map(|d| d.text.clone()).collect();
            let vectors = self.llm.embed(&texts).await?;
            embedded.extend(chunk.iter().cloned().zip(vectors));
        }

        let count = embedded.len();
        let mut entries = self.entries.write().await;
        for (doc, vector) in embedded {
            match entries.iter_mut().find(|e| e.id == doc.id) {
                Some(existing) => {
                    existing.text = doc.text;
                    existing.vector = vector;
                }
                None => entries.push(Entry {
                    id: doc.id,
                    text: doc.text,
                    vector,
                }),
            }
        }
        debug!(added = count, total = entries.len(), "Vector index updated");
        Ok(count)
    }

    /// Nearest documents to the query text, best first
    pub async fn query(&self, text: &str, top_k: usize) -> Result<Vec<QueryHit>, LlmError> {
        if top_k == 0 || self.is_empty().await {
            return Ok(Vec::new());
        }

        let query_vector = self
            .llm
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(LlmError::Empty)?;

        let entries = self.entries.read().await;
        let mut hits: Vec<QueryHit> = entries
            .iter()
            .map(|e| QueryHit {
                id: e.id.clone(),
                text: e.text.clone(),
                score: cosine_similarity(&query_vector, &e.vector),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// Cosine similarity; 0 for mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llm::LlmRequest;
    use async_trait::async_trait;

    /// Embeds text as letter-presence vectors for a handful of letters
    pub(crate) struct LetterEmbedder;

    #[async_trait]
    impl LlmClient for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }

        async fn generate(&self, _request: LlmRequest) -> Result<String, LlmError> {
            Err(LlmError::NotConfigured)
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    ['a', 'b', 'c', 'o', 'r']
                        .iter()
                        .map(|ch| t.matches(*ch).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_upsert_and_query() {
        let index = VectorIndex::new(Arc::new(LetterEmbedder));
        index
            .add_documents(vec![
                Document::new("1", "aaa"),
                Document::new("2", "bbb"),
                Document::new("3", "ccc"),
            ])
            .await
            .unwrap();
        index.add_documents(vec![Document::new("2", "rrr")]).await.unwrap();
        assert_eq!(index.len().await, 3);

        let hits = index.query("rr", 2).await.unwrap();
        assert_eq!(hits[0].id, "2");
        assert_eq!(hits[0].text, "rrr");
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_query_empty_index() {
        let index = VectorIndex::new(Arc::new(LetterEmbedder));
        assert!(index.query("anything", 3).await.unwrap().is_empty());
    }
}
