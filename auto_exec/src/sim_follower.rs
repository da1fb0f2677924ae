//! # Simulated follower
//!
//! A pure-software stand-in for the motion-control primitive, used to run
//! routines without hardware. Segments are tracked as straight chords at a
//! fixed speed; heading follows the segment's interpolation mode. Good
//! enough to exercise the command framework, the progress tracker, and the
//! live view end to end.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use cmd_core::Subsystem;
use pathing::{Follower, HeadingInterpolation, PathChain, Pose};
use util::maths::{clamp, wrap_pi};

use crate::params::SimFollowerParams;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Turns closer than this to the target are snapped to it.
const TURN_DONE_RAD: f64 = 1e-3;

/// Shortest segment length used for progress stepping.
const MIN_SEGMENT_LENGTH: f64 = 1e-9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A follower that advances the pose toward each segment end once per
/// update from the host loop.
pub struct SimFollower {
    params: SimFollowerParams,

    pose: Pose,
    chain: Option<PathChain>,
    segment_index: usize,
    t: f64,
    busy: bool,
    max_power: f64,
    turn_target_rad: Option<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimFollower {
    pub fn new(params: SimFollowerParams) -> Self {
        Self {
            params,
            pose: Pose::new(0.0, 0.0, 0.0),
            chain: None,
            segment_index: 0,
            t: 0.0,
            busy: false,
            max_power: 1.0,
            turn_target_rad: None,
        }
    }

    /// Advance the simulation by one host cycle.
    pub fn update(&mut self) {
        if let Some(target) = self.turn_target_rad {
            self.update_turn(target);
            return;
        }

        if !self.busy {
            return;
        }

        let chain = match &self.chain {
            Some(c) => c,
            None => {
                self.busy = false;
                return;
            }
        };

        let segment = match chain.segment(self.segment_index) {
            Some(s) => s,
            None => {
                self.busy = false;
                return;
            }
        };

        let length = segment.length().max(MIN_SEGMENT_LENGTH);
        let step = self.params.speed * self.max_power / length;
        self.t = (self.t + step).min(1.0);

        let start = segment.start.position();
        let end = segment.end.position();
        let position = start + (end - start) * self.t;

        let heading_rad = match segment.heading {
            HeadingInterpolation::Linear { start_rad, end_rad } => {
                start_rad + wrap_pi(end_rad - start_rad) * self.t
            }
            HeadingInterpolation::Tangential => {
                let direction = end - start;
                let mut heading = direction.y.atan2(direction.x);
                if segment.reverse {
                    heading = wrap_pi(heading + std::f64::consts::PI);
                }
                heading
            }
            HeadingInterpolation::Constant(heading_rad) => heading_rad,
        };

        self.pose = Pose::new(position.x, position.y, heading_rad);

        if self.t >= 1.0 {
            self.segment_index += 1;
            self.t = 0.0;

            if self.segment_index >= chain.len() {
                self.busy = false;
            }
        }
    }

    fn update_turn(&mut self, target_rad: f64) {
        let remaining = wrap_pi(target_rad - self.pose.heading_rad);

        if remaining.abs() <= TURN_DONE_RAD {
            self.pose.heading_rad = target_rad;
            self.turn_target_rad = None;
            self.busy = false;
            return;
        }

        let step = clamp(
            remaining,
            -self.params.turn_rate_rad,
            self.params.turn_rate_rad,
        );
        self.pose.heading_rad = wrap_pi(self.pose.heading_rad + step);
    }
}

impl Follower for SimFollower {
    fn follow(&mut self, chain: &PathChain, max_power: f64, _hold_end: bool) {
        self.chain = Some(chain.clone());
        self.segment_index = 0;
        self.t = 0.0;
        self.max_power = clamp(max_power, 0.0, 1.0);
        self.turn_target_rad = None;
        self.busy = !chain.is_empty();
    }

    fn is_busy(&self) -> bool {
        self.busy
    }

    fn break_following(&mut self) {
        self.busy = false;
        self.turn_target_rad = None;
    }

    fn pose(&self) -> Pose {
        self.pose
    }

    fn set_starting_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    fn is_turning(&self) -> bool {
        self.turn_target_rad.is_some()
    }

    fn turn_to(&mut self, target_rad: f64) {
        self.turn_target_rad = Some(target_rad);
        self.busy = true;
    }

    fn chain_index(&self) -> usize {
        self.segment_index
    }

    fn current_t_value(&self) -> f64 {
        self.t
    }
}

impl Subsystem for SimFollower {
    fn name(&self) -> &str {
        "sim_follower"
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pathing::PathSegment;

    fn params() -> SimFollowerParams {
        SimFollowerParams {
            speed: 10.0,
            turn_rate_rad: 0.5,
        }
    }

    #[test]
    fn test_tracks_chain_to_completion() {
        let mut follower = SimFollower::new(params());
        let chain = PathChain::new(vec![PathSegment::line(
            Pose::new(0.0, 0.0, 0.0),
            Pose::new(20.0, 0.0, 0.0),
        )]);

        follower.follow(&chain, 1.0, true);
        assert!(follower.is_busy());

        follower.update();
        assert!((follower.current_t_value() - 0.5).abs() < 1e-9);
        assert!((follower.pose().x - 10.0).abs() < 1e-9);

        follower.update();
        assert!(!follower.is_busy());
        assert!((follower.pose().x - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_max_power_scales_speed() {
        let mut follower = SimFollower::new(params());
        let chain = PathChain::new(vec![PathSegment::line(
            Pose::new(0.0, 0.0, 0.0),
            Pose::new(20.0, 0.0, 0.0),
        )]);

        follower.follow(&chain, 0.5, true);
        follower.update();
        assert!((follower.current_t_value() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_turn_converges_on_target() {
        let mut follower = SimFollower::new(params());
        follower.turn_to(1.2);
        assert!(follower.is_turning());

        for _ in 0..10 {
            follower.update();
        }
        assert!(!follower.is_turning());
        assert!((follower.pose().heading_rad - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_break_following_stops_tracking() {
        let mut follower = SimFollower::new(params());
        let chain = PathChain::new(vec![PathSegment::line(
            Pose::new(0.0, 0.0, 0.0),
            Pose::new(100.0, 0.0, 0.0),
        )]);

        follower.follow(&chain, 1.0, true);
        follower.update();
        follower.break_following();
        assert!(!follower.is_busy());
    }
}
