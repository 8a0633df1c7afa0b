use serde::{Deserialize, Serialize};

/// Where the pipeline reads images from and writes its outputs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketLayout {
    /// Bucket holding the source images and the quarantine prefix.
    pub data_bucket: String,
    /// Bucket holding the index source files.
    pub vertex_bucket: String,
    /// Prefix the source images are stored under.
    pub all_prefix: String,
    /// Prefix of the index source files in the vertex bucket.
    pub idx_prefix: String,
    /// Prefix failed images are copied to in the data bucket.
    pub fail_prefix: String,
}

impl BucketLayout {
    /// Quarantine key for a source key: `<fail_prefix>/<key relative to all_prefix>`.
    #[must_use]
    pub fn quarantine_key(&self, source_key: &str) -> String {
        let all = self.all_prefix.trim_matches('/');
        let relative = if all.is_empty() {
            source_key
        } else {
            source_key
                .strip_prefix(all)
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(source_key)
        };
        join(&self.fail_prefix, relative)
    }

    /// Key an index source file is published under.
    #[must_use]
    pub fn index_key(&self, file_name: &str) -> String {
        join(&self.idx_prefix, file_name)
    }

    /// `gs://` URI of the directory the index is built from.
    #[must_use]
    pub fn contents_uri(&self) -> String {
        let prefix = self.idx_prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("gs://{}/", self.vertex_bucket)
        } else {
            format!("gs://{}/{}/", self.vertex_bucket, prefix)
        }
    }

    /// Storage path of an artwork by its datapoint id.
    #[must_use]
    pub fn artwork_path(&self, id: &str) -> String {
        let key = join(&self.all_prefix, &format!("{id}.jpg"));
        format!("{}/{}", self.data_bucket, key)
    }
}

fn join(prefix: &str, rest: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        rest.to_string()
    } else {
        format!("{prefix}/{rest}")
    }
}
