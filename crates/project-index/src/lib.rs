//! # Report Project Index
//!
//! Loads the project master file, embeds one descriptor vector per project
//! and serves case-insensitive id lookups plus brute-force cosine search.
//! Vectors are cached on disk and invalidated by a fingerprint of the master
//! bytes and the embedding backend signature.

pub mod embeddings;
pub mod error;
pub mod master;

pub use embeddings::{
    cosine_similarity, EmbeddingClient, EmbeddingMode, EMBEDDING_MODE_ENV, STUB_DIMENSION,
};
pub use error::{ProjectIndexError, Result};
pub use master::{ProjectIndex, ProjectRecord, ProjectVector, ScoredProject, VectorsFile};
