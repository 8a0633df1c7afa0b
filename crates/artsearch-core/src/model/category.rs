use serde::{Deserialize, Serialize};
use std::fmt;

/// A grouping label for images.
///
/// Derived from the last segment of the storage directory an image lives
/// in, and used both as the index partition key and as a query filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Derive the category from a directory path such as `all/impressionism`.
    ///
    /// Returns `None` for the bucket root.
    #[must_use]
    pub fn from_directory(directory: &str) -> Option<Self> {
        directory
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .map(Self::new)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Category {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
