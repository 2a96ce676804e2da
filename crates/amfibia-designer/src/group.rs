//! Pattern groups
//!
//! A group is a set of patterns milled together with one current, one delay
//! and one sequential-group number. Groups carry the milling status that
//! runs advance and operators may override.

use amfibia_core::{MilledStatus, ProjectError, UserStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::{Pattern, PatternId, Point};
use crate::transform::ImageFrame;

/// A pattern together with its outline in pixel space.
///
/// The pixel vertices are derived data: call [`refresh`](Self::refresh)
/// after changing the pattern or the image scale.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayablePattern {
    pattern: Pattern,
    pixel_vertices: Vec<Point>,
}

impl DisplayablePattern {
    pub fn new(pattern: Pattern, frame: &ImageFrame) -> Self {
        let mut displayable = Self {
            pattern,
            pixel_vertices: Vec::new(),
        };
        displayable.refresh(frame);
        displayable
    }

    pub fn id(&self) -> PatternId {
        self.pattern.id()
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Mutable access to the metric pattern. Pixel vertices go stale until
    /// the next [`refresh`](Self::refresh).
    pub fn pattern_mut(&mut self) -> &mut Pattern {
        &mut self.pattern
    }

    pub fn into_pattern(self) -> Pattern {
        self.pattern
    }

    pub fn pixel_vertices(&self) -> &[Point] {
        &self.pixel_vertices
    }

    pub fn refresh(&mut self, frame: &ImageFrame) {
        self.pixel_vertices = self
            .pattern
            .vertices()
            .into_iter()
            .map(|p| frame.to_pixel(p))
            .collect();
    }

    /// Writes an outline edited in pixel space back to the metric pattern.
    pub fn apply_pixel_vertices(&mut self, vertices: &[Point], frame: &ImageFrame) {
        let metric: Vec<Point> = vertices.iter().map(|p| frame.to_metric(*p)).collect();
        self.pattern.apply_vertices(&metric);
        self.refresh(frame);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl GroupColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Colour for the `index`-th group of a position: yellow, red, blue,
    /// orange and green, then a deterministic colour derived from the index.
    pub fn for_index(index: usize) -> Self {
        const PALETTE: [GroupColor; 5] = [
            GroupColor::new(255, 255, 0),
            GroupColor::new(255, 0, 0),
            GroupColor::new(0, 100, 255),
            GroupColor::new(255, 165, 0),
            GroupColor::new(0, 200, 0),
        ];
        if let Some(color) = PALETTE.get(index) {
            return *color;
        }
        let channel = |mul: usize| (50 + (index * mul) % 206) as u8;
        GroupColor::new(channel(97), channel(57), channel(37))
    }
}

/// Patterns milled together with shared parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternGroup {
    patterns: HashMap<PatternId, DisplayablePattern>,
    /// Milling current in amperes; zero means not set yet.
    pub milling_current: f64,
    pub color: GroupColor,
    pub sequential_group: u32,
    /// Wait before milling, in seconds.
    pub delay_s: u64,
    milled_status: MilledStatus,
}

impl PatternGroup {
    pub fn new(color: GroupColor) -> Self {
        Self {
            patterns: HashMap::new(),
            milling_current: 0.0,
            color,
            sequential_group: 0,
            delay_s: 0,
            milled_status: MilledStatus::Pending,
        }
    }

    /// Rebuilds a group from stored data.
    pub fn restore(
        patterns: Vec<DisplayablePattern>,
        milling_current: f64,
        color: GroupColor,
        sequential_group: u32,
        delay_s: u64,
        milled_status: MilledStatus,
    ) -> Self {
        Self {
            patterns: patterns.into_iter().map(|p| (p.id(), p)).collect(),
            milling_current,
            color,
            sequential_group,
            delay_s,
            milled_status,
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn insert(&mut self, pattern: DisplayablePattern) {
        self.patterns.insert(pattern.id(), pattern);
    }

    pub fn remove(&mut self, id: PatternId) -> Option<DisplayablePattern> {
        self.patterns.remove(&id)
    }

    pub fn get(&self, id: PatternId) -> Option<&DisplayablePattern> {
        self.patterns.get(&id)
    }

    pub fn get_mut(&mut self, id: PatternId) -> Option<&mut DisplayablePattern> {
        self.patterns.get_mut(&id)
    }

    pub fn contains(&self, id: PatternId) -> bool {
        self.patterns.contains_key(&id)
    }

    /// Patterns ordered by id, so iteration is stable between calls.
    pub fn patterns(&self) -> Vec<&DisplayablePattern> {
        let mut patterns: Vec<&DisplayablePattern> = self.patterns.values().collect();
        patterns.sort_by_key(|p| p.id());
        patterns
    }

    pub fn enabled_patterns(&self) -> Vec<&Pattern> {
        self.patterns()
            .into_iter()
            .map(DisplayablePattern::pattern)
            .filter(|p| p.attributes.enabled)
            .collect()
    }

    pub fn refresh(&mut self, frame: &ImageFrame) {
        for pattern in self.patterns.values_mut() {
            pattern.refresh(frame);
        }
    }

    pub fn milled_status(&self) -> MilledStatus {
        self.milled_status
    }

    /// Moves the status forward during a run.
    pub fn advance(&mut self, next: MilledStatus) -> Result<(), ProjectError> {
        if !self.milled_status.can_advance_to(next) {
            return Err(ProjectError::InvalidStatusTransition {
                from: self.milled_status,
                to: next,
            });
        }
        self.milled_status = next;
        Ok(())
    }

    /// Operator override; any of pending, done or failed may be set.
    pub fn set_user_status(&mut self, status: UserStatus) {
        self.milled_status = status.into();
    }

    pub fn is_pending(&self) -> bool {
        self.milled_status == MilledStatus::Pending
    }

    /// Copy with fresh milling state, for reuse at another position.
    /// Pattern ids are kept; they only need to be unique within a group.
    pub fn duplicate(&self, frame: &ImageFrame) -> PatternGroup {
        let mut copy = self.clone();
        copy.milled_status = MilledStatus::Pending;
        copy.refresh(frame);
        copy
    }
}
