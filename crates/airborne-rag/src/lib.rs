pub mod chunk;
pub mod client;
pub mod service;

pub use chunk::{chunk_text, Chunk, ChunkConfig};
pub use client::{EmbedderClient, VectorHit, VectorStoreClient};
pub use service::{RagError, RagService};
