//! Project container and editing lock
//!
//! The [`Project`] owns every position. Operator edits go through it and are
//! rejected while a run holds the [`EditLock`]. Status changes made by the
//! run itself are not gated.

use amfibia_core::{
    AppEvent, EventBus, MilledStatus, ProjectError, ProjectEvent, Resolution, StageCoordinates,
    UserStatus,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::group::{DisplayablePattern, PatternGroup};
use crate::model::{Pattern, PatternId, Point};
use crate::position::Position;
use crate::reference::ReferenceImage;
use crate::transform::{rect_to_relative, MetricRect};

/// Coarse lock shared between the project and a running job.
#[derive(Debug, Clone, Default)]
pub struct EditLock {
    locked: Arc<AtomicBool>,
}

impl EditLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Takes the lock; fails if it is already held.
    pub fn acquire(&self) -> Result<EditGuard, ProjectError> {
        self.locked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ProjectError::EditingLocked)?;
        Ok(EditGuard {
            locked: self.locked.clone(),
            events: None,
        })
    }
}

/// Releases the editing lock when dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct EditGuard {
    locked: Arc<AtomicBool>,
    events: Option<Arc<EventBus>>,
}

impl std::fmt::Debug for EditGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditGuard").finish_non_exhaustive()
    }
}

impl Drop for EditGuard {
    fn drop(&mut self) {
        self.locked.store(false, Ordering::SeqCst);
        tracing::debug!("Editing unlocked");
        if let Some(events) = &self.events {
            events.notify(AppEvent::Project(ProjectEvent::EditingLocked { locked: false }));
        }
    }
}

/// All positions of a session plus the global imaging settings.
#[derive(Debug)]
pub struct Project {
    positions: Vec<Position>,
    scanning_resolution: Resolution,
    dwell_time_s: f64,
    lock: EditLock,
    events: Option<Arc<EventBus>>,
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}

impl Project {
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
            scanning_resolution: Resolution::default(),
            dwell_time_s: 1e-6,
            lock: EditLock::new(),
            events: None,
        }
    }

    /// Report edits on `events`.
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    fn notify(&self, event: ProjectEvent) {
        if let Some(events) = &self.events {
            events.notify(AppEvent::Project(event));
        }
    }

    fn ensure_unlocked(&self) -> Result<(), ProjectError> {
        if self.lock.is_locked() {
            return Err(ProjectError::EditingLocked);
        }
        Ok(())
    }

    /// Locks editing until the returned guard is dropped.
    pub fn lock_editing(&self) -> Result<EditGuard, ProjectError> {
        let mut guard = self.lock.acquire()?;
        guard.events = self.events.clone();
        tracing::debug!("Editing locked");
        self.notify(ProjectEvent::EditingLocked { locked: true });
        Ok(guard)
    }

    pub fn is_editing_locked(&self) -> bool {
        self.lock.is_locked()
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn position(&self, index: usize) -> Result<&Position, ProjectError> {
        self.positions
            .get(index)
            .ok_or(ProjectError::PositionNotFound { index })
    }

    fn position_mut(&mut self, index: usize) -> Result<&mut Position, ProjectError> {
        self.positions
            .get_mut(index)
            .ok_or(ProjectError::PositionNotFound { index })
    }

    fn group_mut(&mut self, position: usize, group: usize) -> Result<&mut PatternGroup, ProjectError> {
        self.position_mut(position)?
            .group_mut(group)
            .ok_or(ProjectError::GroupNotFound { position, group })
    }

    pub fn scanning_resolution(&self) -> Resolution {
        self.scanning_resolution
    }

    pub fn dwell_time_s(&self) -> f64 {
        self.dwell_time_s
    }

    pub fn set_scanning_resolution(&mut self, resolution: Resolution) -> Result<(), ProjectError> {
        self.ensure_unlocked()?;
        self.scanning_resolution = resolution;
        Ok(())
    }

    pub fn set_dwell_time(&mut self, dwell_time_s: f64) -> Result<(), ProjectError> {
        self.ensure_unlocked()?;
        if !(dwell_time_s.is_finite() && dwell_time_s > 0.0) {
            return Err(ProjectError::invalid_value(
                "dwell_time",
                format!("must be positive, got {}", dwell_time_s),
            ));
        }
        self.dwell_time_s = dwell_time_s;
        Ok(())
    }

    pub fn add_position(&mut self, position: Position) -> Result<usize, ProjectError> {
        self.ensure_unlocked()?;
        self.positions.push(position);
        let index = self.positions.len() - 1;
        self.notify(ProjectEvent::PositionAdded { index });
        Ok(index)
    }

    pub fn remove_position(&mut self, index: usize) -> Result<Position, ProjectError> {
        self.ensure_unlocked()?;
        self.position(index)?;
        let removed = self.positions.remove(index);
        self.notify(ProjectEvent::PositionRemoved { index });
        Ok(removed)
    }

    /// Replaces every position, e.g. after loading a snapshot.
    pub fn replace_positions(
        &mut self,
        positions: Vec<Position>,
        scanning_resolution: Resolution,
        dwell_time_s: f64,
    ) -> Result<(), ProjectError> {
        self.ensure_unlocked()?;
        self.positions = positions;
        self.scanning_resolution = scanning_resolution;
        self.dwell_time_s = dwell_time_s;
        Ok(())
    }

    pub fn set_coordinates(
        &mut self,
        index: usize,
        coordinates: StageCoordinates,
    ) -> Result<(), ProjectError> {
        self.ensure_unlocked()?;
        self.position_mut(index)?.coordinates = coordinates;
        Ok(())
    }

    pub fn set_reference_image(
        &mut self,
        index: usize,
        image: ReferenceImage,
    ) -> Result<(), ProjectError> {
        self.ensure_unlocked()?;
        if image.is_empty() {
            return Err(ProjectError::invalid_value("reference_image", "image is empty"));
        }
        self.position_mut(index)?.set_reference_image(image);
        Ok(())
    }

    pub fn set_tracking_area(
        &mut self,
        index: usize,
        area: Option<MetricRect>,
    ) -> Result<(), ProjectError> {
        self.ensure_unlocked()?;
        if let Some(rect) = &area {
            if !rect.is_valid() {
                return Err(ProjectError::invalid_value(
                    "tracking_area",
                    "rectangle must have positive finite size",
                ));
            }
            if let Some(image) = self.position(index)?.reference_image() {
                let relative = rect_to_relative(rect, image.fov_width_m, image.fov_height_m);
                if !relative.is_within_unit() {
                    return Err(ProjectError::invalid_value(
                        "tracking_area",
                        "rectangle extends past the field of view",
                    ));
                }
            }
        }
        self.position_mut(index)?.tracking_area = area;
        Ok(())
    }

    pub fn add_group(&mut self, position: usize) -> Result<usize, ProjectError> {
        self.ensure_unlocked()?;
        let group = self.position_mut(position)?.add_group();
        self.notify(ProjectEvent::GroupsChanged { position });
        Ok(group)
    }

    /// Attaches a pattern to a group. The position needs a reference image
    /// so the pattern can be drawn.
    pub fn add_pattern(
        &mut self,
        position: usize,
        group: usize,
        pattern: Pattern,
    ) -> Result<PatternId, ProjectError> {
        self.ensure_unlocked()?;
        let frame = self
            .position(position)?
            .frame()
            .ok_or(ProjectError::NoReferenceImage { position })?;
        let displayable = DisplayablePattern::new(pattern, &frame);
        let id = displayable.id();
        self.group_mut(position, group)?.insert(displayable);
        self.notify(ProjectEvent::GroupsChanged { position });
        Ok(id)
    }

    /// Deletes patterns from every group of a position and prunes groups
    /// left empty. Returns how many patterns were removed.
    pub fn delete_patterns(
        &mut self,
        position: usize,
        ids: &[PatternId],
    ) -> Result<usize, ProjectError> {
        self.ensure_unlocked()?;
        let pos = self.position_mut(position)?;
        let mut removed = 0;
        for id in ids {
            for index in 0..pos.groups().len() {
                if let Some(group) = pos.group_mut(index) {
                    if group.remove(*id).is_some() {
                        removed += 1;
                    }
                }
            }
        }
        let pruned = pos.prune_empty_groups();
        if pruned > 0 {
            tracing::debug!("Pruned {} empty groups at position {}", pruned, position);
        }
        self.notify(ProjectEvent::GroupsChanged { position });
        Ok(removed)
    }

    /// Edits a pattern in metric space and redraws it.
    pub fn update_pattern<F>(
        &mut self,
        position: usize,
        id: PatternId,
        edit: F,
    ) -> Result<(), ProjectError>
    where
        F: FnOnce(&mut Pattern),
    {
        self.ensure_unlocked()?;
        let pos = self.position_mut(position)?;
        let frame = pos.frame().ok_or(ProjectError::NoReferenceImage { position })?;
        let pattern = find_pattern(pos, id)?;
        edit(pattern.pattern_mut());
        pattern.refresh(&frame);
        Ok(())
    }

    /// Writes an outline dragged in pixel space back to the pattern.
    pub fn move_pattern_vertices(
        &mut self,
        position: usize,
        id: PatternId,
        pixel_vertices: &[Point],
    ) -> Result<(), ProjectError> {
        self.ensure_unlocked()?;
        let pos = self.position_mut(position)?;
        let frame = pos.frame().ok_or(ProjectError::NoReferenceImage { position })?;
        find_pattern(pos, id)?.apply_pixel_vertices(pixel_vertices, &frame);
        Ok(())
    }

    pub fn set_group_current(
        &mut self,
        position: usize,
        group: usize,
        current_a: f64,
    ) -> Result<(), ProjectError> {
        self.ensure_unlocked()?;
        if !(current_a.is_finite() && current_a >= 0.0) {
            return Err(ProjectError::invalid_value(
                "milling_current",
                format!("must be zero or positive, got {}", current_a),
            ));
        }
        self.group_mut(position, group)?.milling_current = current_a;
        Ok(())
    }

    pub fn set_group_delay(
        &mut self,
        position: usize,
        group: usize,
        delay_s: u64,
    ) -> Result<(), ProjectError> {
        self.ensure_unlocked()?;
        self.group_mut(position, group)?.delay_s = delay_s;
        Ok(())
    }

    pub fn set_sequential_group(
        &mut self,
        position: usize,
        group: usize,
        sequential_group: u32,
    ) -> Result<(), ProjectError> {
        self.ensure_unlocked()?;
        self.group_mut(position, group)?.sequential_group = sequential_group;
        Ok(())
    }

    pub fn set_group_status(
        &mut self,
        position: usize,
        group: usize,
        status: UserStatus,
    ) -> Result<(), ProjectError> {
        self.ensure_unlocked()?;
        self.group_mut(position, group)?.set_user_status(status);
        Ok(())
    }

    /// Copies every group of `from` onto `to`, with pending status.
    /// Returns the number of groups copied.
    pub fn copy_groups(&mut self, from: usize, to: usize) -> Result<usize, ProjectError> {
        self.ensure_unlocked()?;
        let groups: Vec<PatternGroup> = self.position(from)?.groups().to_vec();
        let target = self.position_mut(to)?;
        let frame = target
            .frame()
            .ok_or(ProjectError::NoReferenceImage { position: to })?;
        for group in &groups {
            target.push_group(group.duplicate(&frame));
        }
        self.notify(ProjectEvent::GroupsChanged { position: to });
        Ok(groups.len())
    }

    /// Moves a group's status forward during a run. Not gated by the lock.
    pub fn advance_group_status(
        &mut self,
        position: usize,
        group: usize,
        status: MilledStatus,
    ) -> Result<(), ProjectError> {
        self.group_mut(position, group)?.advance(status)
    }
}

fn find_pattern(position: &mut Position, id: PatternId) -> Result<&mut DisplayablePattern, ProjectError> {
    let index = position
        .groups()
        .iter()
        .position(|g| g.contains(id))
        .ok_or_else(|| ProjectError::PatternNotFound { id: id.to_string() })?;
    position
        .group_mut(index)
        .and_then(|g| g.get_mut(id))
        .ok_or_else(|| ProjectError::PatternNotFound { id: id.to_string() })
}
