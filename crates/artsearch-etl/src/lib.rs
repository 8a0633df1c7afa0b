//! Embedding pipeline and search services for artsearch.
//!
//! Implements batch embedding generation, index update and deployment as
//! treadle `Stage` implementations, and the interactive query path, on
//! top of clients for the managed Google Cloud services.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod gcp;
pub mod generate;
pub mod listing;
pub mod memory;
pub mod pipeline;
pub mod preprocess;
pub mod query;
pub mod resilience;
pub mod stages;
pub mod traits;
pub mod transfer;
pub mod work_item;

pub use config::Config;
pub use error::{PipelineError, PipelineResult};
pub use generate::EmbeddingGenerator;
pub use memory::MemoryObjectStore;
pub use pipeline::{build_pipeline, build_workflow};
pub use query::QueryService;
pub use resilience::{RateLimiter, RetryPolicy};
pub use stages::{DeployIndexStage, GenerateEmbeddingsStage, UpdateIndexStage};
pub use traits::{Embedder, MetadataLookup, NeighborSearch, ObjectStore};
pub use work_item::PipelineRun;
