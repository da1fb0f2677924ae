//! # Path chain model
//!
//! The minimal geometric description handed across the follower boundary.
//! The follower's own geometry library decides how to track a segment; the
//! core only describes endpoints, optional control points, and how the
//! heading should evolve along the way.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Robot pose in field coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading_rad: f64,
}

/// A single tracked segment between two poses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSegment {
    pub start: Pose,
    pub end: Pose,

    /// Intermediate control points for curved segments. Empty for a
    /// straight line.
    pub control_points: Vec<Vector2<f64>>,

    /// How the heading evolves along the segment.
    pub heading: HeadingInterpolation,

    /// True if the robot drives the segment backwards.
    pub reverse: bool,
}

/// An ordered sequence of segments followed as one continuous motion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathChain {
    segments: Vec<PathSegment>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Heading evolution along a segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HeadingInterpolation {
    /// Interpolate linearly from a start to an end heading.
    Linear { start_rad: f64, end_rad: f64 },

    /// Face the direction of travel.
    Tangential,

    /// Hold a fixed heading.
    Constant(f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose {
    pub fn new(x: f64, y: f64, heading_rad: f64) -> Self {
        Self { x, y, heading_rad }
    }

    /// Position component as a vector.
    pub fn position(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

impl PathSegment {
    /// A straight tangential segment between two poses.
    pub fn line(start: Pose, end: Pose) -> Self {
        Self {
            start,
            end,
            control_points: Vec::new(),
            heading: HeadingInterpolation::Tangential,
            reverse: false,
        }
    }

    /// Chord length of the segment.
    pub fn length(&self) -> f64 {
        (self.end.position() - self.start.position()).norm()
    }
}

impl PathChain {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segment(&self, index: usize) -> Option<&PathSegment> {
        self.segments.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathSegment> {
        self.segments.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_segment_length() {
        let seg = PathSegment::line(Pose::new(0.0, 0.0, 0.0), Pose::new(3.0, 4.0, 0.0));
        assert!((seg.length() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_chain_indexing() {
        let a = PathSegment::line(Pose::new(0.0, 0.0, 0.0), Pose::new(1.0, 0.0, 0.0));
        let b = PathSegment::line(Pose::new(1.0, 0.0, 0.0), Pose::new(2.0, 0.0, 0.0));
        let chain = PathChain::new(vec![a, b]);

        assert_eq!(chain.len(), 2);
        assert!(!chain.is_empty());
        assert!(chain.segment(1).is_some());
        assert!(chain.segment(2).is_none());
    }
}
