use serde::{Deserialize, Serialize};

/// A ranked neighbor returned by the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: String,
    pub distance: f32,
}

/// Descriptive metadata for an artwork, as stored in the analytical table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtworkMetadata {
    pub artist: String,
    pub description: String,
    pub genre: String,
}

impl ArtworkMetadata {
    /// Display label: `artist - description - genre`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} - {} - {}", self.artist, self.description, self.genre)
    }
}

/// A search hit: where the image lives and how to caption it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub path: String,
    pub label: String,
}
