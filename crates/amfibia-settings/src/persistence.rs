//! State snapshot persistence
//!
//! The project is stored in the working directory as a binary snapshot,
//! `AmFIBia.state`, next to one `Position_NN` directory per position that
//! holds its reference image as TIFF:
//!
//! ```text
//! <working dir>/
//!   AmFIBia.state
//!   Position_00/20240131_154502.tif
//!   Position_01/20240131_160011.tif
//! ```
//!
//! The snapshot starts with a format version followed by the state record,
//! both encoded with bincode's standard configuration. Image paths are
//! stored relative to the working directory.
//!
//! Saving stages new images and a temporary snapshot first and swaps them
//! in only once everything was written. Old position directories are moved
//! aside during the swap and put back if any step fails, so a failed save
//! never leaves a half-written snapshot behind. Loading decodes everything
//! before the project is touched.

use amfibia_core::{
    AppEvent, EventBus, MilledStatus, PersistenceEvent, Resolution, StageCoordinates,
};
use amfibia_designer::group::{DisplayablePattern, GroupColor, PatternGroup};
use amfibia_designer::model::Pattern;
use amfibia_designer::position::Position;
use amfibia_designer::project::Project;
use amfibia_designer::reference::ReferenceImage;
use amfibia_designer::transform::{ImageFrame, MetricRect};
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{PersistenceError, PersistenceResult};

/// Snapshot file name inside the working directory.
pub const STATE_FILE_NAME: &str = "AmFIBia.state";

/// Version written at the start of every snapshot.
pub const STATE_FORMAT_VERSION: u32 = 1;

const TEMP_STATE_FILE_NAME: &str = "AmFIBia.state.tmp";
const STAGING_DIR_NAME: &str = ".AmFIBia.staging";
const RETIRED_DIR_NAME: &str = ".AmFIBia.retired";
const POSITION_DIR_PREFIX: &str = "Position_";

/// Directory name for the position at `index`, e.g. `Position_03`.
pub fn position_dir_name(index: usize) -> String {
    format!("{}{:02}", POSITION_DIR_PREFIX, index)
}

fn is_position_dir_name(name: &str) -> bool {
    name.strip_prefix(POSITION_DIR_PREFIX)
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StateRecord {
    scanning_resolution: String,
    dwell_time_s: f64,
    positions: Vec<PositionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PositionRecord {
    coordinates: StageCoordinates,
    measurement_rect: Option<MetricRect>,
    pixel_to_um: f64,
    tracking_area: Option<MetricRect>,
    image: Option<ImageRecord>,
    groups: Vec<GroupRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ImageRecord {
    /// Relative to the working directory, `/`-separated.
    path: String,
    fov_width_m: f64,
    fov_height_m: f64,
    acquired_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GroupRecord {
    patterns: Vec<Pattern>,
    milling_current: f64,
    color: GroupColor,
    sequential_group: u32,
    delay_s: u64,
    milled_status: MilledStatus,
}

impl GroupRecord {
    fn from_group(group: &PatternGroup) -> Self {
        Self {
            patterns: group
                .patterns()
                .into_iter()
                .map(|p| p.pattern().clone())
                .collect(),
            milling_current: group.milling_current,
            color: group.color,
            sequential_group: group.sequential_group,
            delay_s: group.delay_s,
            milled_status: group.milled_status(),
        }
    }

    fn into_group(self, frame: &ImageFrame) -> PatternGroup {
        let patterns = self
            .patterns
            .into_iter()
            .map(|pattern| DisplayablePattern::new(pattern, frame))
            .collect();
        PatternGroup::restore(
            patterns,
            self.milling_current,
            self.color,
            self.sequential_group,
            self.delay_s,
            self.milled_status,
        )
    }
}

/// Everything read back from a snapshot.
#[derive(Debug, Clone)]
pub struct LoadedState {
    pub positions: Vec<Position>,
    pub scanning_resolution: Resolution,
    pub dwell_time_s: f64,
}

/// Reads and writes the snapshot of one working directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    working_dir: PathBuf,
    events: Option<Arc<EventBus>>,
}

impl StateStore {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            events: None,
        }
    }

    /// Report saves and loads on `events`.
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn state_path(&self) -> PathBuf {
        self.working_dir.join(STATE_FILE_NAME)
    }

    pub fn exists(&self) -> bool {
        self.state_path().is_file()
    }

    fn notify(&self, event: PersistenceEvent) {
        if let Some(events) = &self.events {
            events.notify(AppEvent::Persistence(event));
        }
    }

    /// Writes the snapshot and reference images of `project`.
    ///
    /// The project is only read. On failure the previous snapshot, if
    /// any, is left in place and a `SaveFailed` event is published.
    pub fn save(&self, project: &Project) -> PersistenceResult<PathBuf> {
        match self.write_snapshot(project) {
            Ok(path) => {
                tracing::info!(
                    "Saved {} positions to {}",
                    project.positions().len(),
                    path.display()
                );
                self.notify(PersistenceEvent::Saved { path: path.clone() });
                Ok(path)
            }
            Err(e) => {
                tracing::error!("Failed to save state: {}", e);
                self.notify(PersistenceEvent::SaveFailed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn write_snapshot(&self, project: &Project) -> PersistenceResult<PathBuf> {
        fs::create_dir_all(&self.working_dir)?;
        let staging = self.working_dir.join(STAGING_DIR_NAME);
        let temp = self.working_dir.join(TEMP_STATE_FILE_NAME);

        let staged = self.stage(project, &staging, &temp);
        if let Err(e) = staged {
            let _ = fs::remove_dir_all(&staging);
            let _ = fs::remove_file(&temp);
            return Err(e);
        }

        self.swap_in(&staging, &temp)?;
        Ok(self.state_path())
    }

    /// Writes images into `staging` and the snapshot into `temp`.
    fn stage(&self, project: &Project, staging: &Path, temp: &Path) -> PersistenceResult<()> {
        if staging.exists() {
            fs::remove_dir_all(staging)?;
        }
        fs::create_dir_all(staging)?;

        let mut positions = Vec::with_capacity(project.positions().len());
        for (index, position) in project.positions().iter().enumerate() {
            let image = match position.reference_image() {
                Some(reference) => Some(stage_image(staging, index, reference)?),
                None => None,
            };
            positions.push(PositionRecord {
                coordinates: position.coordinates,
                measurement_rect: position.measurement_rect,
                pixel_to_um: position
                    .reference_image()
                    .map(|r| r.pixel_to_um)
                    .unwrap_or_default(),
                tracking_area: position.tracking_area,
                image,
                groups: position.groups().iter().map(GroupRecord::from_group).collect(),
            });
        }

        let state = StateRecord {
            scanning_resolution: project.scanning_resolution().to_string(),
            dwell_time_s: project.dwell_time_s(),
            positions,
        };

        let mut bytes = encode_to_vec(STATE_FORMAT_VERSION, standard())
            .map_err(|e| PersistenceError::Encode(e.to_string()))?;
        bytes.extend(
            encode_to_vec(&state, standard())
                .map_err(|e| PersistenceError::Encode(e.to_string()))?,
        );
        fs::write(temp, bytes)?;
        Ok(())
    }

    /// Replaces old position directories and the snapshot with the staged
    /// ones, restoring the old directories when a step fails.
    fn swap_in(&self, staging: &Path, temp: &Path) -> PersistenceResult<()> {
        let retired = self.working_dir.join(RETIRED_DIR_NAME);
        if retired.exists() {
            fs::remove_dir_all(&retired)?;
        }
        fs::create_dir_all(&retired)?;

        let mut moved_out = Vec::new();
        let mut moved_in = Vec::new();
        match self.exchange(staging, temp, &retired, &mut moved_out, &mut moved_in) {
            Ok(()) => {
                let _ = fs::remove_dir(staging);
                if let Err(e) = fs::remove_dir_all(&retired) {
                    tracing::warn!("Could not remove {}: {}", retired.display(), e);
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Restoring previous position directories after failed save");
                for name in &moved_in {
                    let _ = fs::remove_dir_all(self.working_dir.join(name));
                }
                for name in &moved_out {
                    if let Err(restore) = fs::rename(retired.join(name), self.working_dir.join(name)) {
                        tracing::error!("Could not restore {:?}: {}", name, restore);
                    }
                }
                let _ = fs::remove_dir_all(&retired);
                let _ = fs::remove_dir_all(staging);
                let _ = fs::remove_file(temp);
                Err(e)
            }
        }
    }

    /// Moves old position directories into `retired`, the staged ones into
    /// the working directory and finally the snapshot into place. Records
    /// what was moved so the caller can undo it.
    fn exchange(
        &self,
        staging: &Path,
        temp: &Path,
        retired: &Path,
        moved_out: &mut Vec<OsString>,
        moved_in: &mut Vec<OsString>,
    ) -> PersistenceResult<()> {
        let mut old_dirs = Vec::new();
        for entry in fs::read_dir(&self.working_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if entry.file_type()?.is_dir() && is_position_dir_name(&name.to_string_lossy()) {
                old_dirs.push(name);
            }
        }
        for name in old_dirs {
            tracing::debug!("Retiring {:?}", name);
            fs::rename(self.working_dir.join(&name), retired.join(&name))?;
            moved_out.push(name);
        }

        for entry in fs::read_dir(staging)? {
            let entry = entry?;
            let name = entry.file_name();
            fs::rename(entry.path(), self.working_dir.join(&name))?;
            moved_in.push(name);
        }
        fs::rename(temp, self.state_path())?;
        Ok(())
    }

    /// Reads the snapshot without touching any project.
    pub fn load(&self) -> PersistenceResult<LoadedState> {
        let path = self.state_path();
        if !path.is_file() {
            return Err(PersistenceError::NotFound(path));
        }
        let bytes = fs::read(&path)?;

        let (version, read): (u32, usize) = decode_from_slice(&bytes, standard())
            .map_err(|e| PersistenceError::Decode(e.to_string()))?;
        if version != STATE_FORMAT_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                found: version,
                expected: STATE_FORMAT_VERSION,
            });
        }
        let (state, _): (StateRecord, usize) = decode_from_slice(&bytes[read..], standard())
            .map_err(|e| PersistenceError::Decode(e.to_string()))?;

        let scanning_resolution: Resolution = state
            .scanning_resolution
            .parse()
            .map_err(PersistenceError::InvalidData)?;
        if !(state.dwell_time_s.is_finite() && state.dwell_time_s > 0.0) {
            return Err(PersistenceError::InvalidData(format!(
                "dwell time must be positive, got {}",
                state.dwell_time_s
            )));
        }

        let positions = state
            .positions
            .into_iter()
            .map(|record| self.restore_position(record, scanning_resolution))
            .collect::<PersistenceResult<Vec<_>>>()?;

        Ok(LoadedState {
            positions,
            scanning_resolution,
            dwell_time_s: state.dwell_time_s,
        })
    }

    /// Loads the snapshot into `project`, replacing its positions.
    ///
    /// Returns the number of positions restored. Nothing changes when the
    /// snapshot cannot be read or the project is locked.
    pub fn load_into(&self, project: &mut Project) -> PersistenceResult<usize> {
        let loaded = self.load()?;
        let count = loaded.positions.len();
        project.replace_positions(
            loaded.positions,
            loaded.scanning_resolution,
            loaded.dwell_time_s,
        )?;
        let path = self.state_path();
        tracing::info!("Loaded {} positions from {}", count, path.display());
        self.notify(PersistenceEvent::Loaded {
            path,
            positions: count,
        });
        Ok(count)
    }

    fn restore_position(
        &self,
        record: PositionRecord,
        resolution: Resolution,
    ) -> PersistenceResult<Position> {
        let reference = match &record.image {
            Some(image) => Some(self.read_image(image, record.pixel_to_um)?),
            None => None,
        };
        // Without an image, outlines use the scan frame at the stored scale.
        let frame = match &reference {
            Some(reference) => reference.frame(),
            None => ImageFrame::new(
                resolution.width,
                resolution.height,
                f64::from(resolution.width) * record.pixel_to_um * 1e-6,
                f64::from(resolution.height) * record.pixel_to_um * 1e-6,
            ),
        };

        let mut position = Position::new(record.coordinates);
        position.measurement_rect = record.measurement_rect;
        position.tracking_area = record.tracking_area;
        if let Some(reference) = reference {
            position.set_reference_image(reference);
        }
        for group in record.groups {
            position.push_group(group.into_group(&frame));
        }
        Ok(position)
    }

    fn read_image(&self, record: &ImageRecord, pixel_to_um: f64) -> PersistenceResult<ReferenceImage> {
        let path = self.working_dir.join(Path::new(&record.path));
        let raster = image::open(&path)
            .map_err(|e| PersistenceError::Image {
                path: path.clone(),
                reason: e.to_string(),
            })?
            .to_luma8();
        let acquired_at = Local
            .timestamp_millis_opt(record.acquired_at_ms)
            .single()
            .unwrap_or_else(Local::now);

        let mut reference =
            ReferenceImage::with_timestamp(raster, record.fov_width_m, record.fov_height_m, acquired_at);
        if pixel_to_um > 0.0 {
            reference.pixel_to_um = pixel_to_um;
        }
        Ok(reference)
    }
}

fn stage_image(
    staging: &Path,
    index: usize,
    reference: &ReferenceImage,
) -> PersistenceResult<ImageRecord> {
    let dir_name = position_dir_name(index);
    let dir = staging.join(&dir_name);
    fs::create_dir_all(&dir)?;

    let file_name = format!("{}.tif", reference.file_stamp());
    let path = dir.join(&file_name);
    reference
        .raster
        .save(&path)
        .map_err(|e| PersistenceError::Image {
            path: path.clone(),
            reason: e.to_string(),
        })?;

    Ok(ImageRecord {
        path: format!("{}/{}", dir_name, file_name),
        fov_width_m: reference.fov_width_m,
        fov_height_m: reference.fov_height_m,
        acquired_at_ms: reference.acquired_at.timestamp_millis(),
    })
}
