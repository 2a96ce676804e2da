use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::Point;

/// Pre-computed stream file placed at a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamShape {
    pub center: Point,
    pub stream_file_path: PathBuf,
}

impl StreamShape {
    pub fn new(center: Point, stream_file_path: impl Into<PathBuf>) -> Self {
        Self {
            center,
            stream_file_path: stream_file_path.into(),
        }
    }
}
