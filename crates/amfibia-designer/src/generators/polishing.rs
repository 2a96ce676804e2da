//! Lamella polishing patterns.
//!
//! Two polygons sit above and below the lamella. Their outer edge is a
//! circular arc so the milled flank curves away from the lamella.

use amfibia_core::ProjectError;
use std::f64::consts::FRAC_PI_2;

use crate::group::{DisplayablePattern, GroupColor, PatternGroup};
use crate::model::{Pattern, PatternAttributes, PatternShape, Point, PolygonShape, ScanDirection, ScanType};
use crate::transform::ImageFrame;

#[derive(Debug, Clone, PartialEq)]
pub struct PolishingParams {
    pub lamella_thickness_m: f64,
    pub pattern_width_m: f64,
    pub pattern_height_m: f64,
    pub depth_m: f64,
    /// Arc radius as a multiple of the pattern height, at least 1.
    pub radius_ratio: f64,
    pub num_points: usize,
    pub current_a: f64,
}

impl Default for PolishingParams {
    fn default() -> Self {
        Self {
            lamella_thickness_m: 200e-9,
            pattern_width_m: 20e-6,
            pattern_height_m: 300e-9,
            depth_m: 3e-6,
            radius_ratio: 1.2,
            num_points: 10,
            current_a: 0.1e-9,
        }
    }
}

impl PolishingParams {
    pub fn validate(&self) -> Result<(), ProjectError> {
        for (field, value) in [
            ("lamella_thickness", self.lamella_thickness_m),
            ("pattern_width", self.pattern_width_m),
            ("pattern_height", self.pattern_height_m),
            ("depth", self.depth_m),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ProjectError::invalid_value(field, "must be positive"));
            }
        }
        if !(self.radius_ratio >= 1.0) {
            return Err(ProjectError::invalid_value("radius_ratio", "must be at least 1"));
        }
        if self.num_points < 2 {
            return Err(ProjectError::invalid_value("num_points", "need at least 2 points"));
        }
        if !(self.current_a.is_finite() && self.current_a >= 0.0) {
            return Err(ProjectError::invalid_value("current", "must not be negative"));
        }
        Ok(())
    }
}

/// Points of an arc of height `height` on a circle of radius
/// `height * radius_ratio` centred at `(0, R)`.
///
/// ```text
/// R  = h * ratio
/// xT = sqrt(R² - (R - h)²)
/// θ  from -π/2 to atan2(h - R, xT), n points evenly spaced
/// ```
pub fn define_arc(height: f64, radius_ratio: f64, num_points: usize) -> Vec<Point> {
    let radius = height * radius_ratio;
    let x_t = (radius * radius - (radius - height).powi(2)).sqrt();
    let theta0 = -FRAC_PI_2;
    let theta1 = (height - radius).atan2(x_t);
    let (lo, hi) = (theta0.min(theta1), theta0.max(theta1));

    let steps = num_points.saturating_sub(1).max(1) as f64;
    (0..num_points)
        .map(|i| {
            let theta = lo + (hi - lo) * i as f64 / steps;
            Point::new(radius * theta.cos(), radius * theta.sin() + radius)
        })
        .collect()
}

/// Top and bottom polishing polygons, in that order.
pub fn polishing_patterns(params: &PolishingParams) -> Result<Vec<Pattern>, ProjectError> {
    params.validate()?;

    let arc = define_arc(params.pattern_height_m, params.radius_ratio, params.num_points);
    let half_width = params.pattern_width_m / 2.0;
    let half_thickness = params.lamella_thickness_m / 2.0;

    let right = arc
        .iter()
        .map(|p| Point::new(p.x + half_width, p.y + half_thickness));
    let left = arc
        .iter()
        .rev()
        .map(|p| Point::new(-p.x - half_width, p.y + half_thickness));
    let top: Vec<Point> = right.chain(left).collect();
    let bottom: Vec<Point> = top.iter().map(|p| Point::new(p.x, -p.y)).collect();

    Ok([top, bottom]
        .into_iter()
        .map(|vertices| {
            let attributes = PatternAttributes {
                depth: params.depth_m,
                dwell_time: 1e-6,
                scan_direction: ScanDirection::BottomToTop,
                scan_type: ScanType::Serpentine,
                application_file: "Si".to_string(),
                ..Default::default()
            };
            Pattern::with_attributes(
                PatternShape::Polygon(PolygonShape::from_vertices(vertices)),
                attributes,
            )
        })
        .collect())
}

/// Polishing patterns as a single group at the polishing current.
pub fn polishing_group(
    params: &PolishingParams,
    frame: &ImageFrame,
) -> Result<PatternGroup, ProjectError> {
    let mut group = PatternGroup::new(GroupColor::for_index(0));
    group.milling_current = params.current_a;
    for pattern in polishing_patterns(params)? {
        group.insert(DisplayablePattern::new(pattern, frame));
    }
    tracing::debug!("Generated polishing group with {} patterns", group.len());
    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arc_endpoints() {
        let arc = define_arc(1.0, 1.0, 5);
        assert_eq!(arc.len(), 5);
        // Semicircle quarter: from the bottom of the circle to its side.
        assert!(arc[0].x.abs() < 1e-12 && arc[0].y.abs() < 1e-12);
        assert!((arc[4].x - 1.0).abs() < 1e-12 && (arc[4].y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_arc_reaches_pattern_height() {
        let arc = define_arc(300e-9, 1.2, 10);
        let last = arc.last().unwrap();
        assert!((last.y - 300e-9).abs() < 1e-15);
    }

    #[test]
    fn test_polishing_patterns_are_mirrored() {
        let patterns = polishing_patterns(&PolishingParams::default()).unwrap();
        assert_eq!(patterns.len(), 2);
        let top = patterns[0].vertices();
        let bottom = patterns[1].vertices();
        assert_eq!(top.len(), 20);
        for (t, b) in top.iter().zip(&bottom) {
            assert_eq!(t.x, b.x);
            assert_eq!(t.y, -b.y);
        }
        assert!(top.iter().all(|p| p.y >= 100e-9 - 1e-15));
        assert_eq!(patterns[0].attributes.scan_direction, ScanDirection::BottomToTop);
        assert_eq!(patterns[0].attributes.depth, 3e-6);
    }

    #[test]
    fn test_invalid_ratio_rejected() {
        let params = PolishingParams {
            radius_ratio: 0.5,
            ..Default::default()
        };
        assert!(polishing_patterns(&params).is_err());
    }
}
