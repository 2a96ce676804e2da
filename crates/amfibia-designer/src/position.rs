//! Positions on the sample.

use amfibia_core::{MilledStatus, StageCoordinates};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::group::{GroupColor, PatternGroup};
use crate::reference::ReferenceImage;
use crate::transform::{rect_to_relative, ImageFrame, MetricRect, RelativeRect};

/// Summary of the milling state of all groups at a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Empty,
    Pending,
    Busy,
    Failed,
    Done,
    Mixed,
}

impl PositionStatus {
    pub fn color(&self) -> GroupColor {
        match self {
            PositionStatus::Empty => GroupColor::new(128, 128, 128),
            PositionStatus::Pending => GroupColor::new(0, 100, 255),
            PositionStatus::Busy => GroupColor::new(255, 255, 0),
            PositionStatus::Failed => GroupColor::new(255, 0, 0),
            PositionStatus::Done => GroupColor::new(0, 200, 0),
            PositionStatus::Mixed => GroupColor::new(255, 165, 0),
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PositionStatus::Empty => "empty",
            PositionStatus::Pending => "pending",
            PositionStatus::Busy => "busy",
            PositionStatus::Failed => "failed",
            PositionStatus::Done => "done",
            PositionStatus::Mixed => "mixed",
        };
        write!(f, "{}", label)
    }
}

/// A stage position with its reference image and pattern groups.
#[derive(Debug, Clone)]
pub struct Position {
    pub coordinates: StageCoordinates,
    reference_image: Option<ReferenceImage>,
    /// Rectangle of a measurement overlay, device-relative metric.
    pub measurement_rect: Option<MetricRect>,
    /// Region of the reference image used for fine alignment.
    pub tracking_area: Option<MetricRect>,
    groups: Vec<PatternGroup>,
}

impl Position {
    pub fn new(coordinates: StageCoordinates) -> Self {
        Self {
            coordinates,
            reference_image: None,
            measurement_rect: None,
            tracking_area: None,
            groups: Vec::new(),
        }
    }

    pub fn with_reference_image(mut self, image: ReferenceImage) -> Self {
        self.set_reference_image(image);
        self
    }

    pub fn reference_image(&self) -> Option<&ReferenceImage> {
        self.reference_image.as_ref()
    }

    /// Replaces the reference image and recomputes pixel outlines for the
    /// new scale.
    pub fn set_reference_image(&mut self, image: ReferenceImage) {
        let frame = image.frame();
        self.reference_image = Some(image);
        for group in &mut self.groups {
            group.refresh(&frame);
        }
    }

    pub fn frame(&self) -> Option<ImageFrame> {
        self.reference_image.as_ref().map(ReferenceImage::frame)
    }

    pub fn groups(&self) -> &[PatternGroup] {
        &self.groups
    }

    pub fn group(&self, index: usize) -> Option<&PatternGroup> {
        self.groups.get(index)
    }

    pub fn group_mut(&mut self, index: usize) -> Option<&mut PatternGroup> {
        self.groups.get_mut(index)
    }

    /// Appends an empty group coloured by its index; returns the index.
    pub fn add_group(&mut self) -> usize {
        let index = self.groups.len();
        self.groups.push(PatternGroup::new(GroupColor::for_index(index)));
        index
    }

    pub fn push_group(&mut self, group: PatternGroup) -> usize {
        self.groups.push(group);
        self.groups.len() - 1
    }

    /// Drops groups without patterns, returning how many were removed.
    pub fn prune_empty_groups(&mut self) -> usize {
        let before = self.groups.len();
        self.groups.retain(|g| !g.is_empty());
        before - self.groups.len()
    }

    /// Tracking area as fractions of the reference image, clipped to the
    /// image so the reference crop and the scanned area stay the same size.
    pub fn relative_tracking_area(&self) -> Option<RelativeRect> {
        let area = self.tracking_area.as_ref()?;
        let image = self.reference_image.as_ref()?;
        Some(rect_to_relative(area, image.fov_width_m, image.fov_height_m).clamped_to_unit())
    }

    /// The reference image cropped to the tracking area, or the whole image
    /// when no tracking area is set.
    pub fn tracking_reference(&self) -> Option<ReferenceImage> {
        let image = self.reference_image.as_ref()?;
        Some(match self.relative_tracking_area() {
            Some(rect) => image.crop_relative(&rect),
            None => image.clone(),
        })
    }

    pub fn status(&self) -> PositionStatus {
        let non_empty: Vec<MilledStatus> = self
            .groups
            .iter()
            .filter(|g| !g.is_empty())
            .map(PatternGroup::milled_status)
            .collect();
        if non_empty.is_empty() {
            return PositionStatus::Empty;
        }
        let all = |s: MilledStatus| non_empty.iter().all(|&x| x == s);
        let any = |s: MilledStatus| non_empty.contains(&s);
        if all(MilledStatus::Pending) {
            PositionStatus::Pending
        } else if any(MilledStatus::Busy) {
            PositionStatus::Busy
        } else if any(MilledStatus::Failed) {
            PositionStatus::Failed
        } else if all(MilledStatus::Done) {
            PositionStatus::Done
        } else {
            PositionStatus::Mixed
        }
    }
}
