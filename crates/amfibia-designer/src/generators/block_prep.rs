//! Block preparation patterns.
//!
//! Fourteen rectangles frame a block left standing on a bridge: inner and
//! outer rings of trenches, a wedge trench above the block sized from the
//! milling angle, and a gap for the lift-out needle. Each rectangle belongs
//! to one or more milling stages (coarse, medium, fine), and each enabled
//! stage becomes one pattern group.

use amfibia_core::ProjectError;
use std::collections::BTreeMap;

use crate::group::{DisplayablePattern, GroupColor, PatternGroup};
use crate::model::{
    Pattern, PatternAttributes, PatternShape, Point, RectangleShape, ScanDirection, ScanType,
};
use crate::transform::ImageFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockPrepMode {
    #[default]
    TopDown,
    /// Side trenches mirrored across the block and no needle gap.
    Planar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MillingStage {
    Coarse,
    Medium,
    Fine,
}

impl MillingStage {
    pub const ALL: [MillingStage; 3] = [MillingStage::Coarse, MillingStage::Medium, MillingStage::Fine];

    /// Rectangles milled in this stage.
    pub fn pattern_indices(&self) -> &'static [u8] {
        match self {
            MillingStage::Coarse => &[8],
            MillingStage::Medium => &[4, 5, 7, 9, 14, 11, 12, 13],
            MillingStage::Fine => &[1, 2, 3, 6, 10],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageSettings {
    pub enabled: bool,
    pub current_a: f64,
    pub sequential_group: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockPrepParams {
    pub block_width_m: f64,
    pub block_height_m: f64,
    pub block_depth_m: f64,
    pub inner_pattern_size_m: f64,
    pub inner_margin_m: f64,
    pub outer_pattern_size_m: f64,
    pub outer_margin_m: f64,
    pub milling_angle_deg: f64,
    /// Fraction of the pattern size by which neighbouring trenches overlap.
    pub overlap_x: f64,
    pub overlap_y: f64,
    pub bridge_width_m: f64,
    pub needle_gap_width_m: f64,
    pub needle_gap_height_m: f64,
    pub needle_gap_overlap_m: f64,
    pub trench_safety_margin_m: f64,
    pub mode: BlockPrepMode,
    pub coarse: StageSettings,
    pub medium: StageSettings,
    pub fine: StageSettings,
}

impl Default for BlockPrepParams {
    fn default() -> Self {
        Self {
            block_width_m: 40e-6,
            block_height_m: 35e-6,
            block_depth_m: 30e-6,
            inner_pattern_size_m: 8e-6,
            inner_margin_m: 0.5e-6,
            outer_pattern_size_m: 10e-6,
            outer_margin_m: 5e-6,
            milling_angle_deg: 10.0,
            overlap_x: 1.0,
            overlap_y: 1.0,
            bridge_width_m: 15e-6,
            needle_gap_width_m: 25e-6,
            needle_gap_height_m: 65e-6,
            needle_gap_overlap_m: 2e-6,
            trench_safety_margin_m: 25e-6,
            mode: BlockPrepMode::TopDown,
            coarse: StageSettings {
                enabled: true,
                current_a: 65e-9,
                sequential_group: 0,
            },
            medium: StageSettings {
                enabled: true,
                current_a: 50e-9,
                sequential_group: 0,
            },
            fine: StageSettings {
                enabled: true,
                current_a: 15e-9,
                sequential_group: 1,
            },
        }
    }
}

impl BlockPrepParams {
    pub fn stage(&self, stage: MillingStage) -> &StageSettings {
        match stage {
            MillingStage::Coarse => &self.coarse,
            MillingStage::Medium => &self.medium,
            MillingStage::Fine => &self.fine,
        }
    }

    /// Height of the wedge trench above the block: the horizontal run of a
    /// cut reaching `block_depth` at `milling_angle`, plus a safety margin.
    pub fn trench_height_m(&self) -> f64 {
        self.block_depth_m / self.milling_angle_deg.to_radians().tan() + self.trench_safety_margin_m
    }

    pub fn validate(&self) -> Result<(), ProjectError> {
        for (field, value) in [
            ("block_width", self.block_width_m),
            ("block_height", self.block_height_m),
            ("block_depth", self.block_depth_m),
            ("inner_pattern_size", self.inner_pattern_size_m),
            ("outer_pattern_size", self.outer_pattern_size_m),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ProjectError::invalid_value(field, "must be positive"));
            }
        }
        if !(self.milling_angle_deg > 0.0 && self.milling_angle_deg < 90.0) {
            return Err(ProjectError::invalid_value(
                "milling_angle",
                "must be between 0 and 90 degrees",
            ));
        }
        for stage in MillingStage::ALL {
            let current = self.stage(stage).current_a;
            if !(current.is_finite() && current >= 0.0) {
                return Err(ProjectError::invalid_value(
                    format!("{:?} current", stage).to_lowercase(),
                    "must not be negative",
                ));
            }
        }
        Ok(())
    }
}

/// Corners as returned by [`rectangle_vertices`]: top-left, bottom-left,
/// bottom-right, top-right.
type Corners = [Point; 4];

fn rectangle_vertices(center_x: f64, center_y: f64, w: f64, h: f64) -> Corners {
    [
        Point::new(center_x - w / 2.0, center_y + h / 2.0),
        Point::new(center_x - w / 2.0, center_y - h / 2.0),
        Point::new(center_x + w / 2.0, center_y - h / 2.0),
        Point::new(center_x + w / 2.0, center_y + h / 2.0),
    ]
}

/// Centre and size of a rectangle given in [`rectangle_vertices`] order.
fn rectangle_properties(v: &Corners) -> (Point, f64, f64) {
    let w = v[3].x - v[0].x;
    let h = v[0].y - v[1].y;
    (Point::new(v[1].x + w / 2.0, v[1].y + h / 2.0), w.abs(), h.abs())
}

fn corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Corners {
    // (x0, y0) is the first vertex and (x1, y1) the opposite one.
    [
        Point::new(x0, y0),
        Point::new(x0, y1),
        Point::new(x1, y1),
        Point::new(x1, y0),
    ]
}

/// Outlines of rectangles 1 to 14, keyed by index. Index 13 (the needle
/// gap) is absent in planar mode.
pub fn block_prep_outlines(params: &BlockPrepParams) -> BTreeMap<u8, Corners> {
    let p = params;
    let block = rectangle_vertices(0.0, 0.0, p.block_width_m, p.block_height_m);
    let (left, right) = (block[0].x, block[3].x);
    let (top, bottom) = (block[0].y, block[1].y);

    let (im, is) = (p.inner_margin_m, p.inner_pattern_size_m);
    let (om, os) = (p.outer_margin_m, p.outer_pattern_size_m);
    let (ox, oy) = (p.overlap_x, p.overlap_y);
    let half_bridge = p.bridge_width_m / 2.0;
    let trench = p.trench_height_m();
    let trench_base = top + om + 0.5 * os;

    let mut outlines = BTreeMap::new();
    // inner bottom
    outlines.insert(1, corners(left - im - ox * is, bottom - im, right + im + ox * is, bottom - im - is));
    // inner left, upper part
    outlines.insert(2, corners(left - im - is, top + im + oy * is, left - im, half_bridge));
    // inner right
    outlines.insert(3, corners(right + im, top + im + oy * is, right + im + is, bottom - im - oy * is));
    // outer right
    outlines.insert(4, corners(right + om, top + om + oy * os, right + om + os, bottom - om - oy * os));
    // outer bottom
    outlines.insert(5, corners(left - om - ox * os, bottom - om, right + om + ox * os, bottom - om - os));
    // inner top
    outlines.insert(6, corners(left - im - ox * is, top + im + is, right + im + ox * is, top + im));
    // outer left, upper part
    outlines.insert(7, corners(left - om - os, top + om + oy * os, left - om, half_bridge));
    // wedge trench above the block
    outlines.insert(8, corners(left - om - os, trench_base + trench, right + om + os, trench_base));
    // outer left, lower part
    outlines.insert(9, corners(left - om - os, -half_bridge, left - om, bottom - om - oy * os));
    // inner left, lower part
    outlines.insert(10, corners(left - im - is, -half_bridge, left - im, bottom - im - oy * is));
    // right side of the trench above the needle gap
    outlines.insert(
        11,
        corners(right + om, trench_base + trench, right + om + os, trench_base + p.needle_gap_height_m - p.needle_gap_overlap_m),
    );
    // left side of the trench
    outlines.insert(12, corners(left - om - os, trench_base + trench, left - om, trench_base));
    // needle gap
    outlines.insert(13, corners(right + om, trench_base + p.needle_gap_height_m, right + om + p.needle_gap_width_m, trench_base));
    // outer top
    outlines.insert(14, corners(left - om - ox * os, top + om + os, right + om + ox * os, top + om));

    if p.mode == BlockPrepMode::Planar {
        let inner_shift = 2.0 * im + p.block_width_m + is;
        let outer_shift = 2.0 * om + p.block_width_m + os;
        for (index, dx) in [(2, inner_shift), (10, inner_shift), (7, outer_shift), (9, outer_shift), (3, -inner_shift), (4, -outer_shift)] {
            if let Some(outline) = outlines.get_mut(&index) {
                for v in outline.iter_mut() {
                    v.x += dx;
                }
            }
        }
        if let (Some(trench_left), Some(trench_right)) = (outlines.get(&12).copied(), outlines.get_mut(&11)) {
            for (dst, src) in trench_right.iter_mut().zip(trench_left.iter()) {
                dst.y = src.y;
            }
        }
        outlines.remove(&13);
    }

    outlines
}

fn scan_direction(index: u8) -> ScanDirection {
    match index {
        1 | 5 => ScanDirection::BottomToTop,
        2 | 7 | 9 | 10 | 11 | 13 => ScanDirection::LeftToRight,
        3 | 4 | 12 => ScanDirection::RightToLeft,
        6 | 8 | 14 => ScanDirection::TopToBottom,
        _ => ScanDirection::DynamicAllDirections,
    }
}

/// One group per enabled stage, in coarse, medium, fine order.
pub fn block_prep_groups(
    params: &BlockPrepParams,
    frame: &ImageFrame,
) -> Result<Vec<PatternGroup>, ProjectError> {
    params.validate()?;
    let outlines = block_prep_outlines(params);

    let mut groups = Vec::new();
    for stage in MillingStage::ALL {
        let settings = params.stage(stage);
        if !settings.enabled {
            continue;
        }
        let mut group = PatternGroup::new(GroupColor::for_index(groups.len()));
        group.milling_current = settings.current_a;
        group.sequential_group = settings.sequential_group;

        for index in stage.pattern_indices() {
            let Some(outline) = outlines.get(index) else {
                continue;
            };
            let (center, width, height) = rectangle_properties(outline);
            let attributes = PatternAttributes {
                depth: params.block_depth_m,
                dwell_time: 1e-6,
                scan_direction: scan_direction(*index),
                scan_type: ScanType::Serpentine,
                application_file: "Si".to_string(),
                ..Default::default()
            };
            let pattern = Pattern::with_attributes(
                PatternShape::Rectangle(RectangleShape::new(center, width, height)),
                attributes,
            );
            group.insert(DisplayablePattern::new(pattern, frame));
        }
        tracing::debug!("{:?} stage: {} patterns", stage, group.len());
        groups.push(group);
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_properties_round_trip() {
        let v = rectangle_vertices(1.0, -2.0, 4.0, 6.0);
        let (center, w, h) = rectangle_properties(&v);
        assert_eq!(center, Point::new(1.0, -2.0));
        assert_eq!((w, h), (4.0, 6.0));
    }

    #[test]
    fn test_trench_height() {
        let params = BlockPrepParams::default();
        let expected = 30e-6 / 10f64.to_radians().tan() + 25e-6;
        assert!((params.trench_height_m() - expected).abs() < 1e-15);
    }

    #[test]
    fn test_planar_mode_drops_needle_gap() {
        let top_down = block_prep_outlines(&BlockPrepParams::default());
        assert_eq!(top_down.len(), 14);

        let planar = block_prep_outlines(&BlockPrepParams {
            mode: BlockPrepMode::Planar,
            ..Default::default()
        });
        assert_eq!(planar.len(), 13);
        assert!(!planar.contains_key(&13));
        assert_eq!(planar[&11][0].y, planar[&12][0].y);
        assert_eq!(planar[&11][1].y, planar[&12][1].y);
        // inner left patterns move to the right of the block
        assert!(planar[&2][0].x > 0.0);
        assert!(planar[&3][0].x < 0.0);
    }

    #[test]
    fn test_scan_directions() {
        assert_eq!(scan_direction(1), ScanDirection::BottomToTop);
        assert_eq!(scan_direction(4), ScanDirection::RightToLeft);
        assert_eq!(scan_direction(8), ScanDirection::TopToBottom);
        assert_eq!(scan_direction(13), ScanDirection::LeftToRight);
    }
}
