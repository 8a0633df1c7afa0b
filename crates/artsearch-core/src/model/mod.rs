pub mod batch;
pub mod category;
pub mod image;
pub mod record;
pub mod report;
pub mod search;

pub use batch::{effective_batch_size, Batch, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE};
pub use category::Category;
pub use image::ImageObject;
pub use record::{EmbeddingRecord, Restrict, CATEGORY_NAMESPACE};
pub use report::{BatchReport, ImageOutcome, QuarantineFailure, RunSummary};
pub use search::{ArtworkMetadata, Match, Neighbor};
