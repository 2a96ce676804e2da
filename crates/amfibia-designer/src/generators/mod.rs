//! Pattern generators for common preparation protocols.
//!
//! Generators build complete pattern groups from a handful of protocol
//! parameters. Geometry is produced in device-relative metric coordinates
//! centred on the image, so the caller only needs the image frame to draw
//! the result.

pub mod block_prep;
pub mod polishing;

pub use block_prep::{block_prep_groups, block_prep_outlines, BlockPrepMode, BlockPrepParams, MillingStage, StageSettings};
pub use polishing::{define_arc, polishing_group, polishing_patterns, PolishingParams};
