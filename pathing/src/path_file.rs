//! # Path file reader
//!
//! Reads the JSON path documents produced by the path visualizer and
//! resolves every named end point into a robot-frame pose.
//!
//! The visualizer works in its own frame; poses are converted with the
//! fixed transform `(x, y, deg) -> (y, FIELD_SIZE - x, radians(deg - 90))`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use nalgebra::Vector2;
use serde::Deserialize;
use thiserror::Error;

use crate::chain::Pose;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Field dimension in the units used by the path documents.
pub const FIELD_SIZE: f64 = 144.0;

/// Below this displacement a segment is considered degenerate and keeps the
/// previous heading.
const MIN_SEGMENT_DELTA: f64 = 1e-6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The on-disk path document.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathFile {
    pub start_point: StartPoint,

    #[serde(default)]
    pub lines: Vec<Line>,

    /// Optional explicit ordering over the lines; absent documents are
    /// followed in line order.
    #[serde(default)]
    pub sequence: Option<Vec<SequenceItem>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPoint {
    pub x: f64,
    pub y: f64,

    #[serde(default)]
    pub start_deg: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    #[serde(default)]
    pub id: Option<String>,

    pub name: String,
    pub end_point: EndPoint,

    #[serde(default)]
    pub control_points: Vec<ControlPoint>,

    #[serde(default)]
    pub event_markers: Vec<EventMarker>,

    #[serde(default)]
    pub wait_before_ms: u64,

    #[serde(default)]
    pub wait_after_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndPoint {
    pub x: f64,
    pub y: f64,

    #[serde(default)]
    pub heading: HeadingMode,

    #[serde(default)]
    pub reverse: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMarker {
    #[serde(default)]
    pub id: Option<String>,

    pub name: String,

    /// Normalised position along the line, in [0, 1].
    pub position: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceItem {
    pub kind: String,

    #[serde(default)]
    pub line_id: Option<String>,
}

/// A parsed path document with every named end point resolved to a
/// robot-frame pose.
pub struct PathReader {
    file: PathFile,
    poses: HashMap<String, Pose>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// How the heading at a line's end point is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HeadingMode {
    /// Interpolate towards the direction of the segment.
    Linear,

    /// Face the direction of travel.
    #[default]
    Tangential,

    /// Keep the previous heading.
    Constant,
}

/// Possible path document parsing errors.
#[derive(Debug, Error)]
pub enum PathFileError {
    #[error("Could not read the path file: {0}")]
    FileReadError(std::io::Error),

    #[error("The path file contains invalid JSON: {0}")]
    JsonError(serde_json::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PathReader {
    /// Read and resolve a path document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PathFileError> {
        let json = fs::read_to_string(path).map_err(PathFileError::FileReadError)?;
        Self::from_json(&json)
    }

    /// Parse and resolve a path document from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, PathFileError> {
        let file: PathFile = serde_json::from_str(json).map_err(PathFileError::JsonError)?;

        let mut reader = Self {
            file,
            poses: HashMap::new(),
        };
        reader.load_all_points();
        Ok(reader)
    }

    /// Walk the lines, deriving the heading at each end point from its mode
    /// and converting into the robot frame. Poses are stored under the
    /// whitespace-stripped line name, plus `startPoint` for the start.
    fn load_all_points(&mut self) {
        let mut last_x = self.file.start_point.x;
        let mut last_y = self.file.start_point.y;
        let mut last_deg = self.file.start_point.start_deg;
        if last_deg.is_nan() {
            last_deg = 0.0;
        }

        self.poses.insert(
            String::from("startPoint"),
            Self::to_pose(last_x, last_y, last_deg),
        );

        for line in &self.file.lines {
            let x = line.end_point.x;
            let y = line.end_point.y;

            let heading_deg =
                Self::extract_heading(line.end_point.heading, last_x, last_y, x, y, last_deg);

            let name = stripped_name(&line.name);
            self.poses.insert(name, Self::to_pose(x, y, heading_deg));

            last_x = x;
            last_y = y;
            last_deg = heading_deg;
        }
    }

    /// The resolved pose of a line, by whitespace-stripped name.
    pub fn pose(&self, name: &str) -> Option<Pose> {
        self.poses.get(&stripped_name(name)).copied()
    }

    /// The resolved starting pose.
    pub fn start_pose(&self) -> Option<Pose> {
        self.poses.get("startPoint").copied()
    }

    pub fn file(&self) -> &PathFile {
        &self.file
    }

    /// Convert a visualizer-frame point and heading into a robot pose.
    pub fn to_pose(x: f64, y: f64, deg: f64) -> Pose {
        Pose::new(y, FIELD_SIZE - x, (deg - 90.0).to_radians())
    }

    /// Convert a visualizer-frame point into robot-frame coordinates.
    pub fn to_point(x: f64, y: f64) -> Vector2<f64> {
        Vector2::new(y, FIELD_SIZE - x)
    }

    /// End-point heading in visualizer degrees, per the heading mode.
    fn extract_heading(
        mode: HeadingMode,
        last_x: f64,
        last_y: f64,
        x: f64,
        y: f64,
        last_deg: f64,
    ) -> f64 {
        let dx = x - last_x;
        let dy = y - last_y;

        if dx.abs() < MIN_SEGMENT_DELTA && dy.abs() < MIN_SEGMENT_DELTA {
            return last_deg;
        }

        match mode {
            HeadingMode::Linear | HeadingMode::Tangential => dy.atan2(dx).to_degrees(),
            HeadingMode::Constant => last_deg,
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn stripped_name(name: &str) -> String {
    name.chars().filter(|c| !c.is_whitespace()).collect()
}
