use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::category::Category;

/// An image stored in the data bucket.
///
/// The id is the base filename without its extension; it becomes the
/// datapoint id in the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageObject {
    /// Full object key, e.g. `all/impressionism/claude-monet_water-lilies.jpg`.
    pub key: String,
    pub id: String,
    pub category: Category,
}

impl ImageObject {
    /// Build an image object from its storage key.
    ///
    /// # Errors
    /// Returns [`Error::InvalidKey`] when the key names a directory, is
    /// absolute, or contains `..` segments. Keys are mirrored below the
    /// local work directory and must stay inside it.
    pub fn new(key: impl Into<String>, category: Category) -> Result<Self> {
        let key = key.into();
        if key.starts_with('/')
            || key.ends_with('/')
            || key.split('/').any(|segment| segment == "..")
        {
            return Err(Error::InvalidKey(key));
        }

        let id = Path::new(&key)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidKey(key.clone()))?;

        Ok(Self { key, id, category })
    }

    /// Where the object is mirrored while its batch is in flight.
    #[must_use]
    pub fn local_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(&self.key)
    }
}

impl fmt::Display for ImageObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}
