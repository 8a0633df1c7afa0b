use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::category::Category;

/// Namespace used for category restrictions on records and queries.
pub const CATEGORY_NAMESPACE: &str = "category";

/// A namespace restriction attached to an embedding record or a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restrict {
    pub namespace: String,
    pub allow: Vec<String>,
}

impl Restrict {
    /// Restrict to a single category.
    #[must_use]
    pub fn category(category: &Category) -> Self {
        Self {
            namespace: CATEGORY_NAMESPACE.to_string(),
            allow: vec![category.to_string()],
        }
    }

    /// Build query restrictions from a set of selected categories.
    ///
    /// No selection means no restriction, so the result is an empty list.
    #[must_use]
    pub fn for_categories(categories: &[Category]) -> Vec<Self> {
        if categories.is_empty() {
            return Vec::new();
        }
        vec![Self {
            namespace: CATEGORY_NAMESPACE.to_string(),
            allow: categories.iter().map(ToString::to_string).collect(),
        }]
    }
}

/// One line of an index source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub restricts: Vec<Restrict>,
}

impl EmbeddingRecord {
    #[must_use]
    pub fn new(id: impl Into<String>, embedding: Vec<f32>, category: &Category) -> Self {
        Self {
            id: id.into(),
            embedding,
            restricts: vec![Restrict::category(category)],
        }
    }

    /// Serialize as a single newline-terminated JSON line.
    pub fn to_json_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_json_shape() {
        let record = EmbeddingRecord::new("monet_lilies", vec![0.5, -1.0], &Category::new("impressionism"));
        let value: serde_json::Value =
            serde_json::from_str(record.to_json_line().unwrap().trim_end()).unwrap();

        assert_eq!(
            value,
            json!({
                "id": "monet_lilies",
                "embedding": [0.5, -1.0],
                "restricts": [{"namespace": "category", "allow": ["impressionism"]}]
            })
        );
    }

    #[test]
    fn test_record_line_is_newline_terminated() {
        let record = EmbeddingRecord::new("a", vec![1.0], &Category::new("b"));
        let line = record.to_json_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_no_selected_categories_means_empty_restricts() {
        assert!(Restrict::for_categories(&[]).is_empty());
    }

    #[test]
    fn test_selected_categories_share_one_restrict() {
        let restricts =
            Restrict::for_categories(&[Category::new("baroque"), Category::new("cubism")]);
        assert_eq!(restricts.len(), 1);
        assert_eq!(restricts[0].namespace, CATEGORY_NAMESPACE);
        assert_eq!(restricts[0].allow, vec!["baroque", "cubism"]);
    }
}
