mod walker;

pub use walker::{is_dataset_file_name, Scanner};

use crate::utils::format_size;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A zipped CSV dataset found on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetFile {
    /// Path of the `.csv.zip` file
    pub path: PathBuf,

    /// Compressed size in bytes at discovery time
    pub size: u64,
}

impl DatasetFile {
    /// Returns a human-readable size string
    pub fn size_human(&self) -> String {
        format_size(self.size)
    }
}
