//! # Progress tracker
//!
//! Tracks a follower's traversal of a path chain, or of a turn-in-place,
//! and decides when named events should fire. Event names resolve to
//! commands through the named-command registry, which keeps routine trees
//! free of owning references to event commands.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, info};

use cmd_core::registry;
use util::maths::{clamp, wrap_pi};

use crate::chain::PathChain;
use crate::follower::Follower;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Turns smaller than this are treated as already complete.
const MIN_TURN_RAD: f64 = 1e-6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Tracks progress of a [`Follower`] along a chain or through a turn.
pub struct ProgressTracker<F> {
    follower: Rc<RefCell<F>>,

    current_chain: Option<PathChain>,
    current_path_name: String,

    /// Event trigger thresholds, in normalised progress [0, 1].
    event_positions: HashMap<String, f64>,

    /// Whether each event has fired, to prevent duplicate execution.
    event_fired: HashMap<String, bool>,

    /// Progress along the current path segment, in [0, 1].
    path_progress: f64,

    /// Progress along the whole chain, in [0, 1].
    chain_progress: f64,

    // Turn tracking
    tracking_turn: bool,
    target_heading_rad: f64,
    total_turn_rad: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<F: Follower> ProgressTracker<F> {
    pub fn new(follower: Rc<RefCell<F>>) -> Self {
        Self {
            follower,
            current_chain: None,
            current_path_name: String::new(),
            event_positions: HashMap::new(),
            event_fired: HashMap::new(),
            path_progress: 0.0,
            chain_progress: 0.0,
            tracking_turn: false,
            target_heading_rad: 0.0,
            total_turn_rad: 0.0,
        }
    }

    /// Point the tracker at a new chain, clearing all registered events.
    pub fn set_current_chain(&mut self, chain: PathChain) {
        debug!("ProgressTracker set to a chain of {} segments", chain.len());
        self.current_chain = Some(chain);
        self.tracking_turn = false;
        self.clear_events();
    }

    /// Set the name of the path currently being followed.
    pub fn set_current_path_name(&mut self, name: &str) {
        debug!("Current path: {}", name);
        self.current_path_name = name.to_string();
    }

    /// The name of the path currently being followed.
    pub fn current_path_name(&self) -> &str {
        &self.current_path_name
    }

    /// Register an event to fire once progress reaches the threshold.
    pub fn register_event(&mut self, event_name: &str, position: f64) {
        self.event_positions
            .insert(event_name.to_string(), position);
        self.event_fired.insert(event_name.to_string(), false);
    }

    /// Clear all registered events and their fired flags.
    pub fn clear_events(&mut self) {
        self.event_positions.clear();
        self.event_fired.clear();
    }

    /// True if the event has already fired.
    pub fn is_event_triggered(&self, event_name: &str) -> bool {
        self.event_fired.get(event_name).copied().unwrap_or(false)
    }

    /// True the first cycle progress reaches the event's threshold, while
    /// the event has not yet fired. Does not mark the event fired.
    pub fn should_trigger(&mut self, event_name: &str) -> bool {
        if !self.event_positions.contains_key(event_name) || self.is_event_triggered(event_name) {
            return false;
        }

        self.update_progress();
        let threshold = self.event_positions[event_name];
        self.path_progress >= threshold
    }

    /// Fire an event by name, if it has not fired yet.
    ///
    /// Marks the event fired and schedules the registered command of the
    /// same name, where one exists.
    pub fn execute_event(&mut self, event_name: &str) {
        if self.is_event_triggered(event_name) || !self.event_fired.contains_key(event_name) {
            return;
        }

        self.event_fired.insert(event_name.to_string(), true);
        info!("Event triggered: {}", event_name);

        registry::with(|r| {
            if r.has(event_name) {
                r.get(event_name).schedule();
            }
        });
    }

    /// Begin a turn-in-place and register one event to fire during it.
    ///
    /// The follower is commanded to turn; progress becomes normalised
    /// angular progress against the signed shortest delta from the start
    /// heading, completing when the follower reports the turn is done.
    pub fn turn(&mut self, target_rad: f64, event_name: &str, event_threshold: f64) {
        let start_heading_rad = {
            let mut follower = self.follower.borrow_mut();
            follower.turn_to(target_rad);
            follower.pose().heading_rad
        };

        self.target_heading_rad = target_rad;
        self.total_turn_rad = wrap_pi(target_rad - start_heading_rad).abs();
        self.tracking_turn = true;

        self.clear_events();
        self.register_event(event_name, event_threshold);
    }

    /// Progress along the current path segment, in [0, 1].
    pub fn path_progress(&mut self) -> f64 {
        self.update_progress();
        self.path_progress
    }

    /// Progress along the whole chain, in [0, 1].
    pub fn chain_progress(&mut self) -> f64 {
        self.update_progress();
        self.chain_progress
    }

    /// Delegates to [`Follower::is_busy`].
    pub fn is_busy(&self) -> bool {
        self.follower.borrow().is_busy()
    }

    /// Delegates to [`Follower::break_following`].
    pub fn break_following(&mut self) {
        self.follower.borrow_mut().break_following()
    }

    /// Recompute path and chain progress from the follower's state.
    fn update_progress(&mut self) {
        if self.tracking_turn {
            let follower = self.follower.borrow();
            if follower.is_turning() {
                let remaining_rad =
                    wrap_pi(self.target_heading_rad - follower.pose().heading_rad).abs();

                let progress = if self.total_turn_rad < MIN_TURN_RAD {
                    1.0
                } else {
                    1.0 - remaining_rad / self.total_turn_rad
                };

                self.path_progress = clamp(progress, 0.0, 1.0);
                // For a turn, chain progress mirrors turn progress
                self.chain_progress = self.path_progress;
            } else {
                drop(follower);
                self.tracking_turn = false;
                self.path_progress = 1.0;
                self.chain_progress = 1.0;
            }
        } else if let Some(chain) = &self.current_chain {
            if chain.is_empty() {
                return;
            }

            let follower = self.follower.borrow();
            self.path_progress = clamp(follower.current_t_value(), 0.0, 1.0);

            let completed = follower.chain_index().min(chain.len()) as f64;
            self.chain_progress =
                clamp((completed + self.path_progress) / chain.len() as f64, 0.0, 1.0);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chain::{PathSegment, Pose};

    struct FakeFollower {
        pose: Pose,
        busy: bool,
        turning: bool,
        chain_index: usize,
        t_value: f64,
        turn_target: Option<f64>,
    }

    impl FakeFollower {
        fn new() -> Rc<RefCell<Self>> {
            Rc::new(RefCell::new(Self {
                pose: Pose::new(0.0, 0.0, 0.0),
                busy: false,
                turning: false,
                chain_index: 0,
                t_value: 0.0,
                turn_target: None,
            }))
        }
    }

    impl Follower for FakeFollower {
        fn follow(&mut self, _chain: &PathChain, _max_power: f64, _hold_end: bool) {
            self.busy = true;
        }

        fn is_busy(&self) -> bool {
            self.busy
        }

        fn break_following(&mut self) {
            self.busy = false;
        }

        fn pose(&self) -> Pose {
            self.pose
        }

        fn is_turning(&self) -> bool {
            self.turning
        }

        fn turn_to(&mut self, target_rad: f64) {
            self.turn_target = Some(target_rad);
            self.turning = true;
        }

        fn chain_index(&self) -> usize {
            self.chain_index
        }

        fn current_t_value(&self) -> f64 {
            self.t_value
        }
    }

    fn chain_of(n: usize) -> PathChain {
        let seg = PathSegment::line(Pose::new(0.0, 0.0, 0.0), Pose::new(1.0, 0.0, 0.0));
        PathChain::new(vec![seg; n])
    }

    #[test]
    fn test_chain_progress_over_segments() {
        let follower = FakeFollower::new();
        let mut tracker = ProgressTracker::new(follower.clone());
        tracker.set_current_chain(chain_of(2));

        follower.borrow_mut().t_value = 0.5;
        assert!((tracker.path_progress() - 0.5).abs() < 1e-12);
        assert!((tracker.chain_progress() - 0.25).abs() < 1e-12);

        // Second segment half done: three quarters of the chain
        follower.borrow_mut().chain_index = 1;
        assert!((tracker.chain_progress() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_should_trigger_once_threshold_reached() {
        let follower = FakeFollower::new();
        let mut tracker = ProgressTracker::new(follower.clone());
        tracker.set_current_chain(chain_of(1));
        tracker.register_event("Score", 0.6);

        follower.borrow_mut().t_value = 0.5;
        assert!(!tracker.should_trigger("Score"));

        follower.borrow_mut().t_value = 0.7;
        assert!(tracker.should_trigger("Score"));

        tracker.execute_event("Score");
        assert!(tracker.is_event_triggered("Score"));
        assert!(!tracker.should_trigger("Score"));
    }

    #[test]
    fn test_unknown_event_never_triggers() {
        let follower = FakeFollower::new();
        let mut tracker = ProgressTracker::new(follower);
        assert!(!tracker.should_trigger("NotRegistered"));
        // Executing an unregistered event is a no-op
        tracker.execute_event("NotRegistered");
        assert!(!tracker.is_event_triggered("NotRegistered"));
    }

    #[test]
    fn test_set_chain_clears_events() {
        let follower = FakeFollower::new();
        let mut tracker = ProgressTracker::new(follower.clone());
        tracker.set_current_chain(chain_of(1));
        tracker.register_event("Score", 0.1);

        follower.borrow_mut().t_value = 1.0;
        assert!(tracker.should_trigger("Score"));

        tracker.set_current_chain(chain_of(1));
        assert!(!tracker.should_trigger("Score"));
    }

    #[test]
    fn test_turn_progress() {
        let follower = FakeFollower::new();
        follower.borrow_mut().pose.heading_rad = 0.0;

        let mut tracker = ProgressTracker::new(follower.clone());
        tracker.turn(1.0, "MidTurn", 0.5);
        assert_eq!(follower.borrow().turn_target, Some(1.0));

        // Quarter of the way round
        follower.borrow_mut().pose.heading_rad = 0.25;
        assert!(!tracker.should_trigger("MidTurn"));

        follower.borrow_mut().pose.heading_rad = 0.6;
        assert!(tracker.should_trigger("MidTurn"));

        // Follower reports the turn done: progress completes
        follower.borrow_mut().turning = false;
        assert!((tracker.path_progress() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_turn_wraps_angles() {
        let follower = FakeFollower::new();
        follower.borrow_mut().pose.heading_rad = 3.0;

        let mut tracker = ProgressTracker::new(follower.clone());
        // Shortest way from 3.0 rad to -3.0 rad is through pi
        tracker.turn(-3.0, "Event", 0.9);

        follower.borrow_mut().pose.heading_rad = -3.02;
        assert!(tracker.should_trigger("Event"));
    }
}
