//! Core domain model for artsearch.
//!
//! This crate defines the records that flow through the embedding
//! pipeline (categories, image objects, embedding records, batches and
//! their reports) and the bucket layout that turns them into storage keys.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod layout;
pub mod model;

pub use error::{Error, Result};
pub use layout::BucketLayout;
