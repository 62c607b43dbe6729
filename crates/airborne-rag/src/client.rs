use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("embedder request failed: {0}")]
    Embedder(String),
    #[error("vector store request failed: {0}")]
    VectorStore(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub file_id: String,
    pub filename: String,
    pub offset: usize,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub tenant_id: String,
    pub store_id: String,
    pub file_id: String,
    pub filename: String,
    pub offset: usize,
    pub text: String,
}

/// Embeds text via an external embedding service. One call per chunk at
/// ingest time; one call per query at retrieval time.
#[async_trait]
pub trait EmbedderClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ClientError>;
}

/// Cosine-similarity vector store wire contract: create a collection lazily
/// on first upsert, upsert points in a single batch, and search filtered by
/// tenant and store.
#[async_trait]
pub trait VectorStoreClient: Send + Sync {
    async fn upsert(&self, points: Vec<UpsertPoint>) -> Result<(), ClientError>;

    async fn search(
        &self,
        tenant_id: &str,
        store_ids: &[String],
        query_vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<VectorHit>, ClientError>;

    async fn delete_store(&self, tenant_id: &str, store_id: &str) -> Result<(), ClientError>;
}

/// HTTP embedder speaking a plain `{text} -> {embedding}` contract (the
/// shape both Ollama's and OpenAI-compatible embedding endpoints converge
/// on).
pub struct HttpEmbedderClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpEmbedderClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl EmbedderClient for HttpEmbedderClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ClientError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({"model": self.model, "prompt": text}))
            .send()
            .await
            .map_err(|e| ClientError::Embedder(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ClientError::Embedder(format!("status {}", response.status())));
        }
        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Embedder(e.to_string()))?;
        Ok(body.embedding)
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Vector store speaking a Qdrant-shaped upsert/search contract.
pub struct HttpVectorStoreClient {
    client: reqwest::Client,
    base_url: String,
    collection: String,
}

impl HttpVectorStoreClient {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            collection: collection.into(),
        }
    }
}

#[async_trait]
impl VectorStoreClient for HttpVectorStoreClient {
    async fn upsert(&self, points: Vec<UpsertPoint>) -> Result<(), ClientError> {
        let url = format!("{}/collections/{}/points", self.base_url, self.collection);
        let payload: Vec<_> = points
            .into_iter()
            .map(|p| {
                json!({
                    "id": p.id,
                    "vector": p.vector,
                    "payload": {
                        "tenant_id": p.tenant_id,
                        "store_id": p.store_id,
                        "file_id": p.file_id,
                        "filename": p.filename,
                        "offset": p.offset,
                        "text": p.text,
                    }
                })
            })
            .collect();
        let response = self
            .client
            .put(&url)
            .json(&json!({"points": payload}))
            .send()
            .await
            .map_err(|e| ClientError::VectorStore(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ClientError::VectorStore(format!("status {}", response.status())));
        }
        Ok(())
    }

    async fn search(
        &self,
        tenant_id: &str,
        store_ids: &[String],
        query_vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<VectorHit>, ClientError> {
        let url = format!("{}/collections/{}/points/search", self.base_url, self.collection);
        let filter = json!({
            "must": [
                {"key": "tenant_id", "match": {"value": tenant_id}},
                {"key": "store_id", "match": {"any": store_ids}},
            ]
        });
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "vector": query_vector,
                "limit": top_k,
                "filter": filter,
                "with_payload": true,
            }))
            .send()
            .await
            .map_err(|e| ClientError::VectorStore(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ClientError::VectorStore(format!("status {}", response.status())));
        }
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ClientError::VectorStore(e.to_string()))?;
        Ok(parsed
            .result
            .into_iter()
            .map(|hit| VectorHit {
                id: hit.id,
                score: hit.score,
                file_id: hit.payload.file_id,
                filename: hit.payload.filename,
                offset: hit.payload.offset,
                text: hit.payload.text,
            })
            .collect())
    }

    async fn delete_store(&self, tenant_id: &str, store_id: &str) -> Result<(), ClientError> {
        let url = format!("{}/collections/{}/points/delete", self.base_url, self.collection);
        let filter = json!({
            "must": [
                {"key": "tenant_id", "match": {"value": tenant_id}},
                {"key": "store_id", "match": {"value": store_id}},
            ]
        });
        let response = self
            .client
            .post(&url)
            .json(&json!({"filter": filter}))
            .send()
            .await
            .map_err(|e| ClientError::VectorStore(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ClientError::VectorStore(format!("status {}", response.status())));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
    score: f32,
    payload: SearchPayload,
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    file_id: String,
    filename: String,
    offset: usize,
    text: String,
}
