//! # Follower capability
//!
//! The narrow interface through which the core drives the motion-control
//! primitive. The follower owns the geometry and control maths; the host
//! loop is responsible for stepping it, so the command layer only starts,
//! polls, and stops tracking.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::chain::{PathChain, Pose};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Motion-control collaborator executing geometric paths.
pub trait Follower {
    /// Begin tracking a chain. `max_power` scales drive effort in [0, 1];
    /// `hold_end` keeps position servoed at the end of the chain.
    fn follow(&mut self, chain: &PathChain, max_power: f64, hold_end: bool);

    /// Whether the follower is still actively tracking.
    fn is_busy(&self) -> bool;

    /// Request an immediate stop of the current path or turn.
    fn break_following(&mut self);

    /// Current robot pose.
    fn pose(&self) -> Pose;

    /// Seed the localiser with a known starting pose.
    fn set_starting_pose(&mut self, _pose: Pose) {}

    /// Whether a turn-in-place operation is running.
    fn is_turning(&self) -> bool {
        false
    }

    /// Begin a turn-in-place to the target heading.
    fn turn_to(&mut self, _target_rad: f64) {}

    /// Index of the chain segment currently being tracked.
    fn chain_index(&self) -> usize {
        0
    }

    /// Parametric progress along the current segment, in [0, 1].
    fn current_t_value(&self) -> f64 {
        0.0
    }
}
