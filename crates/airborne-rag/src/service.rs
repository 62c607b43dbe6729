use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::chunk::{chunk_text, ChunkConfig};
use crate::client::{ClientError, EmbedderClient, UpsertPoint, VectorHit, VectorStoreClient};

const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    Client(#[from] ClientError),
}

pub struct RagService {
    embedder: Arc<dyn EmbedderClient>,
    vector_store: Arc<dyn VectorStoreClient>,
    chunk_config: ChunkConfig,
}

impl RagService {
    pub fn new(embedder: Arc<dyn EmbedderClient>, vector_store: Arc<dyn VectorStoreClient>) -> Self {
        Self {
            embedder,
            vector_store,
            chunk_config: ChunkConfig::default(),
        }
    }

    /// Chunks, embeds, and upserts one document. Propagates errors — unlike
    /// `retrieve_or_degrade`, ingest failures are part of the upload flow and
    /// must be surfaced to the caller.
    pub async fn ingest(
        &self,
        tenant_id: &str,
        store_id: &str,
        file_id: &str,
        filename: &str,
        text: &str,
    ) -> Result<usize, RagError> {
        let chunks = chunk_text(text, &self.chunk_config);
        let mut points = Vec::with_capacity(chunks.len());
        for (idx, chunk) in chunks.iter().enumerate() {
            let vector = self.embedder.embed(&chunk.text).await?;
            points.push(UpsertPoint {
                id: point_id(file_id, idx),
                vector,
                tenant_id: tenant_id.to_string(),
                store_id: store_id.to_string(),
                file_id: file_id.to_string(),
                filename: filename.to_string(),
                offset: chunk.offset,
                text: chunk.text.clone(),
            });
        }
        let count = points.len();
        if !points.is_empty() {
            self.vector_store.upsert(points).await?;
        }
        Ok(count)
    }

    pub async fn delete_store(&self, tenant_id: &str, store_id: &str) -> Result<(), RagError> {
        self.vector_store.delete_store(tenant_id, store_id).await?;
        Ok(())
    }

    /// Retrieves top-k hits, degrading to an empty result (with a logged
    /// warning) on any failure. The call this feeds must proceed without
    /// context rather than fail outright.
    pub async fn retrieve_or_degrade(
        &self,
        tenant_id: &str,
        store_ids: &[String],
        query: &str,
        top_k: Option<usize>,
    ) -> Vec<VectorHit> {
        let k = top_k.unwrap_or(DEFAULT_TOP_K);
        let vector = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(tenant_id, "rag embed failed, proceeding without context: {e}");
                return Vec::new();
            }
        };
        match self.vector_store.search(tenant_id, store_ids, vector, k).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(tenant_id, "rag search failed, proceeding without context: {e}");
                Vec::new()
            }
        }
    }

    /// Formats retrieved hits as the context block injected into
    /// `Instructions` for providers without native file search.
    pub fn format_context_block(hits: &[VectorHit]) -> String {
        if hits.is_empty() {
            return String::new();
        }
        let mut block = String::from("<context>\n");
        for hit in hits {
            block.push_str(&format!("[{}] {}\n", hit.filename, hit.text));
        }
        block.push_str("</context>");
        block
    }
}

fn point_id(file_id: &str, chunk_index: usize) -> String {
    format!("{file_id}:{chunk_index}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl EmbedderClient for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ClientError> {
            if self.fail {
                return Err(ClientError::Embedder("boom".to_string()));
            }
            Ok(vec![text.len() as f32])
        }
    }

    struct FakeVectorStore {
        upserts: Mutex<Vec<UpsertPoint>>,
        fail_search: bool,
    }

    #[async_trait]
    impl VectorStoreClient for FakeVectorStore {
        async fn upsert(&self, points: Vec<UpsertPoint>) -> Result<(), ClientError> {
            self.upserts.lock().unwrap().extend(points);
            Ok(())
        }

        async fn search(
            &self,
            _tenant_id: &str,
            _store_ids: &[String],
            _query_vector: Vec<f32>,
            _top_k: usize,
        ) -> Result<Vec<VectorHit>, ClientError> {
            if self.fail_search {
                return Err(ClientError::VectorStore("down".to_string()));
            }
            Ok(vec![VectorHit {
                id: "f1:0".to_string(),
                score: 0.9,
                file_id: "f1".to_string(),
                filename: "doc.md".to_string(),
                offset: 0,
                text: "hit text".to_string(),
            }])
        }

        async fn delete_store(&self, _tenant_id: &str, _store_id: &str) -> Result<(), ClientError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn ingest_assigns_deterministic_ids_per_chunk() {
        let embedder = Arc::new(FakeEmbedder { fail: false });
        let store = Arc::new(FakeVectorStore {
            upserts: Mutex::new(vec![]),
            fail_search: false,
        });
        let service = RagService::new(embedder, store.clone());
        let n = service
            .ingest("t1", "s1", "f1", "doc.md", "hello world, this is a short document.")
            .await
            .unwrap();
        assert_eq!(n, 1);
        let upserts = store.upserts.lock().unwrap();
        assert_eq!(upserts[0].id, "f1:0");
        assert_eq!(upserts[0].tenant_id, "t1");
    }

    #[tokio::test]
    async fn retrieve_degrades_to_empty_on_embed_failure() {
        let embedder = Arc::new(FakeEmbedder { fail: true });
        let store = Arc::new(FakeVectorStore {
            upserts: Mutex::new(vec![]),
            fail_search: false,
        });
        let service = RagService::new(embedder, store);
        let hits = service
            .retrieve_or_degrade("t1", &["s1".to_string()], "query", None)
            .await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn retrieve_degrades_to_empty_on_search_failure() {
        let embedder = Arc::new(FakeEmbedder { fail: false });
        let store = Arc::new(FakeVectorStore {
            upserts: Mutex::new(vec![]),
            fail_search: true,
        });
        let service = RagService::new(embedder, store);
        let hits = service
            .retrieve_or_degrade("t1", &["s1".to_string()], "query", None)
            .await;
        assert!(hits.is_empty());
    }

    #[test]
    fn context_block_formats_hits_and_is_empty_for_no_hits() {
        assert_eq!(RagService::format_context_block(&[]), "");
        let hits = vec![VectorHit {
            id: "a".to_string(),
            score: 1.0,
            file_id: "f1".to_string(),
            filename: "doc.md".to_string(),
            offset: 0,
            text: "some text".to_string(),
        }];
        let block = RagService::format_context_block(&hits);
        assert!(block.starts_with("<context>"));
        assert!(block.contains("doc.md"));
        assert!(block.ends_with("</context>"));
    }
}
