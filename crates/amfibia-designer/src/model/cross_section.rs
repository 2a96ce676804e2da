use serde::{Deserialize, Serialize};

use super::RectangleShape;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScanMethod {
    #[default]
    MultiPass,
    SinglePass,
}

/// Stair-step cross-section: a rectangle milled deeper towards one edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegularCrossSectionShape {
    pub rect: RectangleShape,
    pub multi_scan_pass_count: u32,
    pub scan_method: ScanMethod,
    pub scan_ratio: f64,
}

impl Default for RegularCrossSectionShape {
    fn default() -> Self {
        Self {
            rect: RectangleShape::default(),
            multi_scan_pass_count: 1,
            scan_method: ScanMethod::MultiPass,
            scan_ratio: 1.0,
        }
    }
}
