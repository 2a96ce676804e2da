//! # AmFIBia Designer
//!
//! Layout of milling jobs: where on the sample to mill, what to mill there
//! and with which parameters.
//!
//! ## Core Components
//!
//! - **Model**: closed set of pattern kinds with shared milling attributes
//! - **Transform**: device-relative metric ↔ pixel coordinates
//! - **Groups**: patterns milled together at one current, with status
//! - **Positions**: stage coordinates, reference image, tracking area
//! - **Project**: all positions plus the editing lock held by runs
//! - **Generators**: polishing and block-preparation protocols
//!
//! ## Architecture
//!
//! ```text
//! Project
//!   └── Position (stage coordinates, reference image, tracking area)
//!         └── PatternGroup (current, delay, sequential group, status)
//!               └── DisplayablePattern (Pattern + pixel outline)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use amfibia_designer::model::{Pattern, PatternShape, Point, RectangleShape};
//! use amfibia_designer::transform::ImageFrame;
//!
//! let frame = ImageFrame::new(1000, 500, 10e-6, 5e-6);
//! let rect = Pattern::new(PatternShape::Rectangle(RectangleShape::new(
//!     Point::new(0.0, 0.0),
//!     2e-6,
//!     1e-6,
//! )));
//! let outline: Vec<Point> = rect.vertices().into_iter().map(|p| frame.to_pixel(p)).collect();
//! assert!((outline[0].x - 400.0).abs() < 1e-6);
//! assert!((outline[0].y - 300.0).abs() < 1e-6);
//! ```

pub mod generators;
pub mod group;
pub mod model;
pub mod position;
pub mod project;
pub mod reference;
pub mod timing;
pub mod transform;

pub use group::{DisplayablePattern, GroupColor, PatternGroup};
pub use model::{Pattern, PatternAttributes, PatternId, PatternShape, Point};
pub use position::{Position, PositionStatus};
pub use project::{EditGuard, EditLock, Project};
pub use reference::ReferenceImage;
pub use transform::{
    metric_to_pixel, pixel_to_metric, rect_to_relative, ImageFrame, MetricRect, RelativeRect,
};
