use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::model::category::Category;
use crate::model::image::ImageObject;

/// Upper bound on the number of images mirrored locally at once.
pub const MAX_BATCH_SIZE: usize = 100;

pub const DEFAULT_BATCH_SIZE: usize = MAX_BATCH_SIZE;

/// Clamp a requested batch size into `1..=MAX_BATCH_SIZE`.
#[must_use]
pub fn effective_batch_size(requested: usize) -> usize {
    requested.clamp(1, MAX_BATCH_SIZE)
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// A bounded slice of one category's images, processed and published
/// together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub category: Category,
    /// Position of this batch within its category, starting at zero.
    pub index: usize,
    pub objects: Vec<ImageObject>,
}

impl Batch {
    /// Chunk a category's images into batches of at most `batch_size`.
    ///
    /// `batch_size` is clamped into `1..=MAX_BATCH_SIZE`.
    #[must_use]
    pub fn split(category: &Category, objects: Vec<ImageObject>, batch_size: usize) -> Vec<Self> {
        let batch_size = effective_batch_size(batch_size);
        let mut batches = Vec::with_capacity(objects.len().div_ceil(batch_size));
        let mut objects = objects.into_iter().peekable();
        let mut index = 0;

        while objects.peek().is_some() {
            let chunk: Vec<ImageObject> = objects.by_ref().take(batch_size).collect();
            batches.push(Self {
                category: category.clone(),
                index,
                objects: chunk,
            });
            index += 1;
        }

        batches
    }

    /// Output file name: `<timestamp>_<category>_batch_<index>.json`.
    #[must_use]
    pub fn file_name(&self, at: NaiveDateTime) -> String {
        format!(
            "{}_{}_batch_{}.json",
            at.format(TIMESTAMP_FORMAT),
            self.category,
            self.index
        )
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn objects(category: &Category, count: usize) -> Vec<ImageObject> {
        (0..count)
            .map(|i| ImageObject::new(format!("{category}/img{i}.jpg"), category.clone()).unwrap())
            .collect()
    }

    #[test]
    fn test_split_respects_batch_size() {
        let category = Category::new("cubism");
        let batches = Batch::split(&category, objects(&category, 250), DEFAULT_BATCH_SIZE);

        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
        let indices: Vec<usize> = batches.iter().map(|b| b.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_split_never_exceeds_max_batch_size() {
        let category = Category::new("cubism");
        let batches = Batch::split(&category, objects(&category, 150), 500);

        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![100, 50]);
    }

    #[test]
    fn test_effective_batch_size_bounds() {
        assert_eq!(effective_batch_size(0), 1);
        assert_eq!(effective_batch_size(25), 25);
        assert_eq!(effective_batch_size(5000), MAX_BATCH_SIZE);
    }

    #[test]
    fn test_split_keeps_order() {
        let category = Category::new("cubism");
        let batches = Batch::split(&category, objects(&category, 3), 2);
        assert_eq!(batches[0].objects[0].id, "img0");
        assert_eq!(batches[0].objects[1].id, "img1");
        assert_eq!(batches[1].objects[0].id, "img2");
    }

    #[test]
    fn test_split_empty_category() {
        let category = Category::new("empty");
        assert!(Batch::split(&category, Vec::new(), 10).is_empty());
    }

    #[test]
    fn test_file_name_format() {
        let category = Category::new("impressionism");
        let batch = Batch {
            category,
            index: 3,
            objects: Vec::new(),
        };
        let at = NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_opt(9, 4, 30)
            .unwrap();
        assert_eq!(
            batch.file_name(at),
            "2024-05-17_09-04-30_impressionism_batch_3.json"
        );
    }
}
