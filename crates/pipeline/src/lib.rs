//! # Report Pipeline
//!
//! Incremental ingestion of project report documents: discover files,
//! decide what changed since the last run, analyze and map the changed
//! documents in parallel, persist per-document records and publish the
//! run index that makes the next run incremental.

pub mod change;
pub mod config;
pub mod error;
pub mod loader;
pub mod mapper;
pub mod persist;
pub mod processor;
pub mod run_index;
pub mod scanner;
pub mod stats;

pub use change::{ChangeSet, PendingDocument, RunOptions};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use loader::{LoadedDocument, LoaderError};
pub use mapper::ProjectMapper;
pub use persist::{NamingPlan, RecordStore};
pub use processor::DocumentPipeline;
pub use scanner::{DocumentScanner, SUPPORTED_EXTENSIONS};
pub use stats::{DocumentEmbedding, RunReport, RunSummary};
