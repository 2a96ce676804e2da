//! Unit formatting and parsing utilities
//!
//! Beam currents are handled in amperes, durations in seconds and scanning
//! resolutions as `WIDTHxHEIGHT` strings, which is the form the instrument
//! accepts.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Format a beam current (in amperes) with an appropriate unit.
///
/// A current of exactly zero means "not set" and is rendered as such.
///
/// ```
/// use amfibia_core::units::format_current;
/// assert_eq!(format_current(150e-12), "150 pA");
/// assert_eq!(format_current(1.5e-9), "1.5 nA");
/// assert_eq!(format_current(0.0), "Not set");
/// ```
pub fn format_current(current_a: f64) -> String {
    if current_a == 0.0 {
        return "Not set".to_string();
    }

    let magnitude = current_a.abs();
    let (value, unit) = if magnitude < 0.1e-9 {
        (current_a * 1e12, "pA")
    } else if magnitude <= 100e-9 {
        (current_a * 1e9, "nA")
    } else if magnitude < 10e-6 {
        (current_a * 1e6, "µA")
    } else if magnitude < 10e-3 {
        (current_a * 1e3, "mA")
    } else {
        (current_a, "A")
    };

    // Scaling by powers of ten leaves float noise behind ("150.00000000000003").
    let rounded = (value * 1e6).round() / 1e6;
    if rounded == rounded.trunc() {
        format!("{} {}", rounded as i64, unit)
    } else {
        format!("{} {}", two_significant_digits(value), unit)
    }
}

fn two_significant_digits(value: f64) -> String {
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (1 - magnitude).max(0) as usize;
    let text = format!("{:.*}", decimals, value);
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

/// Snap a requested current to the nearest current the instrument offers.
///
/// Returns `None` when no currents are available.
pub fn closest_current(target_a: f64, available_a: &[f64]) -> Option<f64> {
    available_a
        .iter()
        .copied()
        .filter(|c| c.is_finite())
        .min_by(|a, b| (a - target_a).abs().total_cmp(&(b - target_a).abs()))
}

/// Format a duration in seconds as `HHh:MMm:SSs`.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{:02}h:{:02}m:{:02}s", hours, minutes, secs)
}

/// Scanning resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(1536, 1024)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

fn device_resolution_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Width=(\d+).*?Height=(\d+)").expect("invalid resolution regex")
    })
}

impl FromStr for Resolution {
    type Err = String;

    /// Parses `"1536x1024"` or the instrument form `"{Width=1536, Height=1024}"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if let Some(caps) = device_resolution_pattern().captures(s) {
            let width = caps[1].parse::<u32>().map_err(|e| e.to_string())?;
            let height = caps[2].parse::<u32>().map_err(|e| e.to_string())?;
            return validate_resolution(width, height);
        }

        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("Invalid resolution: {}", s))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("Invalid resolution width: {}", w))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("Invalid resolution height: {}", h))?;
        validate_resolution(width, height)
    }
}

fn validate_resolution(width: u32, height: u32) -> Result<Resolution, String> {
    if width == 0 || height == 0 {
        return Err(format!("Resolution must be non-zero, got {}x{}", width, height));
    }
    Ok(Resolution::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_current_units() {
        assert_eq!(format_current(10e-12), "10 pA");
        assert_eq!(format_current(0.1e-9), "0.1 nA");
        assert_eq!(format_current(15e-9), "15 nA");
        assert_eq!(format_current(100e-9), "100 nA");
        assert_eq!(format_current(2.3e-6), "2.3 µA");
        assert_eq!(format_current(5e-3), "5 mA");
        assert_eq!(format_current(0.02), "0.02 A");
        assert_eq!(format_current(0.5), "0.5 A");
    }

    #[test]
    fn test_format_current_not_set() {
        assert_eq!(format_current(0.0), "Not set");
    }

    #[test]
    fn test_format_current_fraction() {
        assert_eq!(format_current(1.5e-9), "1.5 nA");
        assert_eq!(format_current(12.34e-9), "12 nA");
        assert_eq!(format_current(0.25e-6), "0.25 µA");
    }

    #[test]
    fn test_closest_current() {
        let available = [1e-11, 1e-10, 15e-9, 50e-9, 65e-9];
        assert_eq!(closest_current(14e-9, &available), Some(15e-9));
        assert_eq!(closest_current(60e-9, &available), Some(65e-9));
        assert_eq!(closest_current(0.0, &available), Some(1e-11));
        assert_eq!(closest_current(1e-9, &[]), None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "00h:00m:00s");
        assert_eq!(format_duration(59.9), "00h:00m:59s");
        assert_eq!(format_duration(3725.0), "01h:02m:05s");
        assert_eq!(format_duration(-5.0), "00h:00m:00s");
    }

    #[test]
    fn test_resolution_parsing() {
        assert_eq!("1536x1024".parse::<Resolution>(), Ok(Resolution::new(1536, 1024)));
        assert_eq!(" 768 X 512 ".parse::<Resolution>(), Ok(Resolution::new(768, 512)));
        assert_eq!(
            "{Width=3072, Height=2048}".parse::<Resolution>(),
            Ok(Resolution::new(3072, 2048))
        );
        assert!("1536".parse::<Resolution>().is_err());
        assert!("0x1024".parse::<Resolution>().is_err());
        assert!("axb".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_resolution_display() {
        assert_eq!(Resolution::new(6144, 4096).to_string(), "6144x4096");
        assert_eq!(Resolution::default().to_string(), "1536x1024");
    }
}
