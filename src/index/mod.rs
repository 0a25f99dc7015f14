//! 索引模块

pub mod embedding;
pub mod embedding_cache;
pub mod vector;

pub use embedding::{EmbeddingError, EmbeddingProvider, create_embedding_provider};
pub use embedding_cache::{EmbeddingCache, EmbeddingVector, RetryPolicy};
pub use vector::{InMemoryVectorIndex, PineconeVectorIndex, VectorIndex, create_vector_index};
