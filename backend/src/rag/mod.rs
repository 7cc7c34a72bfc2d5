//! Retrieval for grounding agent answers
//!
//! The keyword knowledge base is always available. When embeddings are
//! enabled, a vector index built from the same data answers free-text
//! nutrition queries and serves as the last resort for exercise queries.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

pub(crate) mod knowledge;
pub(crate) mod vector;

pub use knowledge::{
    overlap_score, rank_exercises, similarity_score, Exercise, FoodFact, FoodMatch, Intensity,
    KnowledgeBase, SafetyFilter, SafetyProtocol, EXERCISE_MIN_SCORE, FOOD_MIN_SCORE,
};
pub use vector::{cosine_similarity, Document, QueryHit, VectorIndex};

use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("could not parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Result of the safety-first exercise lookup
#[derive(Debug, Clone, Default, Serialize)]
pub struct SafeRecommendations {
    pub safe_exercises: Vec<Exercise>,
    pub safety_warnings: Vec<String>,
    pub filtered_count: usize,
    /// Only filled when no exercise survived the filter
    pub semantic_results: Vec<QueryHit>,
}

/// Knowledge base plus optional vector search
pub struct Retriever {
    kb: Arc<KnowledgeBase>,
    vector: Option<VectorIndex>,
}

impl Retriever {
    pub fn new(kb: KnowledgeBase, vector: Option<VectorIndex>) -> Self {
        Self {
            kb: Arc::new(kb),
            vector,
        }
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn search_food(&self, query: &str) -> Option<FoodMatch> {
        self.kb.search_food(query)
    }

    /// Embed every food and exercise into the vector index
    pub async fn index_knowledge_base(&self) -> Result<usize, LlmError> {
        let Some(index) = &self.vector else {
            return Ok(0);
        };

        let documents: Vec<Document> = self
            .kb
            .foods
            .iter()
            .map(|f| Document::new(format!("food:{}", f.name.to_lowercase()), f.describe()))
            .chain(
                self.kb
                    .exercises
                    .iter()
                    .map(|e| Document::new(format!("exercise:{}", e.name.to_lowercase()), e.describe())),
            )
            .collect();

        let count = index.add_documents(documents).await?;
        info!(documents = count, "Knowledge base indexed");
        Ok(count)
    }

    /// Grounding snippets for a nutrition question
    ///
    /// Vector hits when available, otherwise the best keyword food match.
    #[instrument(skip(self))]
    pub async fn nutrition_context(&self, query: &str, top_k: usize) -> Vec<String> {
        if let Some(index) = &self.vector {
            match index.query(query, top_k).await {
                Ok(hits) if !hits.is_empty() => return hits.into_iter().map(|h| h.text).collect(),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Vector query failed, using keyword lookup"),
            }
        }

        match self.kb.search_food(query) {
            Some(best) => vec![best.fact.describe()],
            None => self
                .kb
                .mentioned_foods(query)
                .into_iter()
                .take(top_k)
                .map(FoodFact::describe)
                .collect(),
        }
    }

    /// Exercises that are safe for the given conditions, best match first
    ///
    /// Safe exercises matching the query come first. When nothing matches,
    /// low-intensity safe exercises are offered, then any safe exercise.
    /// Vector results are only fetched when the filter removed everything.
    #[instrument(skip(self))]
    pub async fn get_safe_recommendations(
        &self,
        query: &str,
        conditions: &[String],
        top_k: usize,
    ) -> SafeRecommendations {
        let filter = self.kb.filter_safe(conditions);

        let mut safe_exercises = rank_exercises(&filter.safe, query, top_k);
        if safe_exercises.is_empty() {
            safe_exercises = filter
                .safe
                .iter()
                .filter(|e| e.intensity == Intensity::Low)
                .take(top_k)
                .cloned()
                .collect();
        }
        if safe_exercises.is_empty() {
            safe_exercises = filter.safe.iter().take(top_k).cloned().collect();
        }

        let mut semantic_results = Vec::new();
        if safe_exercises.is_empty() {
            if let Some(index) = &self.vector {
                semantic_results = index.query(query, top_k).await.unwrap_or_else(|e| {
                    warn!(error = %e, "Vector fallback failed");
                    Vec::new()
                });
            }
        }

        SafeRecommendations {
            safe_exercises,
            safety_warnings: filter.warnings,
            filtered_count: filter.filtered_count,
            semantic_results,
        }
    }
}
