//! Context retrieval boundary.
//!
//! Given a workspace, a free-text query, and an optional file-set
//! restriction, a retriever returns ranked context snippets. The engine
//! treats retrieval as best-effort: when ranked search errors, it falls
//! back to `recent_chunks`, and proceeds with zero context if that fails
//! too.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::models::RetrievedChunk;

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Ranked similarity search scoped to a workspace and, when `file_ids`
    /// is non-empty, restricted to those files.
    async fn search(
        &self,
        workspace_id: &str,
        query: &str,
        file_ids: &[String],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>>;

    /// Unranked fallback: the most recent chunks in chunk order for the
    /// scoped files. Used when ranked search is unavailable.
    async fn recent_chunks(
        &self,
        workspace_id: &str,
        file_ids: &[String],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>>;
}

/// In-memory retriever over a fixed chunk set. Ranks by naive term overlap,
/// which is enough for the default wiring and for tests; a production
/// deployment plugs a vector-search backend in behind the same trait.
#[derive(Default)]
pub struct StaticRetriever {
    chunks: Mutex<Vec<RetrievedChunk>>,
}

impl StaticRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunks(chunks: Vec<RetrievedChunk>) -> Self {
        Self {
            chunks: Mutex::new(chunks),
        }
    }

    pub async fn add_chunk(&self, chunk: RetrievedChunk) {
        self.chunks.lock().await.push(chunk);
    }

    fn scope<'a>(
        chunks: &'a [RetrievedChunk],
        workspace_id: &str,
        file_ids: &[String],
    ) -> Vec<&'a RetrievedChunk> {
        chunks
            .iter()
            .filter(|c| c.workspace_id == workspace_id)
            .filter(|c| file_ids.is_empty() || file_ids.contains(&c.file_id))
            .collect()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn search(
        &self,
        workspace_id: &str,
        query: &str,
        file_ids: &[String],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let chunks = self.chunks.lock().await;
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();

        let mut scored: Vec<(f64, RetrievedChunk)> = Self::scope(&chunks, workspace_id, file_ids)
            .into_iter()
            .map(|c| {
                let haystack = c.content.to_lowercase();
                let hits = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
                let score = if terms.is_empty() {
                    0.0
                } else {
                    hits as f64 / terms.len() as f64
                };
                let mut chunk = c.clone();
                chunk.similarity = score;
                (score, chunk)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(top_k).map(|(_, c)| c).collect())
    }

    async fn recent_chunks(
        &self,
        workspace_id: &str,
        file_ids: &[String],
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let chunks = self.chunks.lock().await;
        let mut scoped: Vec<RetrievedChunk> = Self::scope(&chunks, workspace_id, file_ids)
            .into_iter()
            .cloned()
            .collect();
        scoped.sort_by(|a, b| {
            (a.file_id.as_str(), a.chunk_index).cmp(&(b.file_id.as_str(), b.chunk_index))
        });
        // No real similarity score in fallback mode
        for chunk in scoped.iter_mut() {
            chunk.similarity = 1.0;
        }
        scoped.truncate(limit);
        Ok(scoped)
    }
}

/// Build a distinct file_id -> first-seen map, preserving encounter order.
/// Shared by deliverable assembly when deriving sources from context.
pub fn distinct_files(chunks: &[RetrievedChunk]) -> Vec<(&str, &RetrievedChunk)> {
    let mut seen: HashMap<&str, ()> = HashMap::new();
    let mut out = Vec::new();
    for chunk in chunks {
        if seen.insert(chunk.file_id.as_str(), ()).is_none() {
            out.push((chunk.file_id.as_str(), chunk));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, file_id: &str, idx: u32, content: &str) -> RetrievedChunk {
        RetrievedChunk {
            id: id.to_string(),
            file_id: file_id.to_string(),
            workspace_id: "ws-1".to_string(),
            chunk_index: idx,
            content: content.to_string(),
            token_count: 10,
            file_name: format!("{file_id}.pdf"),
            similarity: 0.0,
        }
    }

    #[tokio::test]
    async fn search_ranks_by_term_overlap() {
        let retriever = StaticRetriever::with_chunks(vec![
            chunk("c1", "f1", 0, "plumbing revenue grew fast"),
            chunk("c2", "f2", 0, "unrelated text about weather"),
        ]);

        let hits = retriever.search("ws-1", "revenue", &[], 5).await.unwrap();
        assert_eq!(hits[0].id, "c1");
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[tokio::test]
    async fn search_respects_file_scope_and_top_k() {
        let retriever = StaticRetriever::with_chunks(vec![
            chunk("c1", "f1", 0, "alpha"),
            chunk("c2", "f2", 0, "alpha"),
            chunk("c3", "f2", 1, "alpha"),
        ]);

        let hits = retriever
            .search("ws-1", "alpha", &["f2".to_string()], 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_id, "f2");
    }

    #[tokio::test]
    async fn recent_chunks_have_synthetic_similarity() {
        let retriever = StaticRetriever::with_chunks(vec![
            chunk("c2", "f1", 1, "b"),
            chunk("c1", "f1", 0, "a"),
        ]);

        let hits = retriever.recent_chunks("ws-1", &[], 10).await.unwrap();
        assert_eq!(hits[0].chunk_index, 0);
        assert!(hits.iter().all(|c| c.similarity == 1.0));
    }

    #[test]
    fn distinct_files_preserves_first_seen_order() {
        let chunks = vec![
            chunk("c1", "f2", 0, "x"),
            chunk("c2", "f1", 0, "y"),
            chunk("c3", "f2", 1, "z"),
        ];
        let files = distinct_files(&chunks);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].0, "f2");
        assert_eq!(files[1].0, "f1");
    }
}
