//! # Follow-path command
//!
//! Adapts a [`Follower`] into the command model. The command starts the
//! follower on `initialize`, lets the host loop do the actual tracking,
//! reports finished when the follower goes idle, and breaks following if it
//! is interrupted.
//!
//! Two modes of construction:
//!
//! 1. Pre-built: pass an existing [`PathChain`].
//! 2. Fluent builder: create with [`FollowPathCommand::builder`] and add
//!    segment operations; the chain is materialised lazily on the first
//!    `initialize`, after which further mutation fails with
//!    [`PathCmdError::BuilderFrozen`].

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::cell::RefCell;
use std::rc::Rc;

use nalgebra::Vector2;
use thiserror::Error;

use cmd_core::{Command, RequirementSet, Subsystem, SubsystemHandle};
use util::raise_error;

use crate::chain::{HeadingInterpolation, PathChain, PathSegment, Pose};
use crate::follower::Follower;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A command that drives a follower along a path chain.
///
/// Requires the follower's subsystem, so scheduling a second motion command
/// interrupts the one in progress.
pub struct FollowPathCommand<F> {
    follower: Rc<RefCell<F>>,
    requirements: RequirementSet,
    chain: ChainSource,
    hold_end: bool,
    max_power: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised by the fluent chain builder.
#[derive(Debug, Error)]
pub enum PathCmdError {
    #[error("The path chain is already built, the builder is frozen")]
    BuilderFrozen,

    #[error("A heading interpolation requires at least one segment")]
    NoSegment,
}

/// Where the chain comes from: built up-front, or accumulated by the
/// builder until first initialise.
enum ChainSource {
    Built(PathChain),
    Building(Vec<PathSegment>),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<F: Follower + Subsystem + 'static> FollowPathCommand<F> {
    /// Create a command for a pre-built chain. The builder surface is
    /// frozen from the start.
    pub fn new(follower: Rc<RefCell<F>>, chain: PathChain) -> Self {
        let requirements = RequirementSet::of(&[SubsystemHandle::of(follower.clone())]);
        Self {
            follower,
            requirements,
            chain: ChainSource::Built(chain),
            hold_end: true,
            max_power: 1.0,
        }
    }

    /// Create a command in builder mode. Segment operations accumulate
    /// until the first initialise materialises the chain.
    pub fn builder(follower: Rc<RefCell<F>>) -> Self {
        let requirements = RequirementSet::of(&[SubsystemHandle::of(follower.clone())]);
        Self {
            follower,
            requirements,
            chain: ChainSource::Building(Vec::new()),
            hold_end: true,
            max_power: 1.0,
        }
    }

    /// Whether to hold position at the end of the chain. Defaults to true.
    pub fn with_hold_end(mut self, hold_end: bool) -> Self {
        self.hold_end = hold_end;
        self
    }

    /// Maximum power scaling, clamped into [0, 1]. Defaults to 1.
    pub fn with_max_power(mut self, max_power: f64) -> Self {
        self.max_power = util::maths::clamp(max_power, 0.0, 1.0);
        self
    }

    /// Append a straight segment to the chain being built.
    pub fn line_to(&mut self, start: Pose, end: Pose) -> Result<&mut Self, PathCmdError> {
        let segments = self.building()?;
        segments.push(PathSegment::line(start, end));
        Ok(self)
    }

    /// Append a curved segment through the given control points.
    pub fn curve_to(
        &mut self,
        start: Pose,
        control_points: Vec<Vector2<f64>>,
        end: Pose,
    ) -> Result<&mut Self, PathCmdError> {
        let segments = self.building()?;
        segments.push(PathSegment {
            start,
            end,
            control_points,
            heading: HeadingInterpolation::Tangential,
            reverse: false,
        });
        Ok(self)
    }

    /// Set linear heading interpolation on the segment added last.
    pub fn linear_heading(
        &mut self,
        start_rad: f64,
        end_rad: f64,
    ) -> Result<&mut Self, PathCmdError> {
        self.last_segment()?.heading = HeadingInterpolation::Linear { start_rad, end_rad };
        Ok(self)
    }

    /// Set tangential heading interpolation on the segment added last.
    pub fn tangential_heading(&mut self) -> Result<&mut Self, PathCmdError> {
        self.last_segment()?.heading = HeadingInterpolation::Tangential;
        Ok(self)
    }

    /// Set constant heading interpolation on the segment added last.
    pub fn constant_heading(&mut self, heading_rad: f64) -> Result<&mut Self, PathCmdError> {
        self.last_segment()?.heading = HeadingInterpolation::Constant(heading_rad);
        Ok(self)
    }

    /// Mark the segment added last as driven in reverse.
    pub fn reversed(&mut self) -> Result<&mut Self, PathCmdError> {
        self.last_segment()?.reverse = true;
        Ok(self)
    }

    fn building(&mut self) -> Result<&mut Vec<PathSegment>, PathCmdError> {
        match &mut self.chain {
            ChainSource::Building(segments) => Ok(segments),
            ChainSource::Built(_) => Err(PathCmdError::BuilderFrozen),
        }
    }

    fn last_segment(&mut self) -> Result<&mut PathSegment, PathCmdError> {
        self.building()?.last_mut().ok_or(PathCmdError::NoSegment)
    }
}

impl<F: Follower + Subsystem + 'static> Command for FollowPathCommand<F> {
    fn initialize(&mut self) {
        // Materialise a built chain on the first run; the builder is frozen
        // from here on
        if let ChainSource::Building(segments) = &mut self.chain {
            if segments.is_empty() {
                raise_error!("FollowPathCommand initialised with no path chain built");
            }
            let built = PathChain::new(std::mem::take(segments));
            self.chain = ChainSource::Built(built);
        }

        let chain = match &self.chain {
            ChainSource::Built(chain) => chain,
            ChainSource::Building(_) => unreachable!(),
        };

        self.follower
            .borrow_mut()
            .follow(chain, self.max_power, self.hold_end);
    }

    fn execute(&mut self) {
        // The host loop steps the follower
    }

    fn is_finished(&mut self) -> bool {
        !self.follower.borrow().is_busy()
    }

    fn end(&mut self, interrupted: bool) {
        if interrupted {
            self.follower.borrow_mut().break_following();
        }
    }

    fn requirements(&self) -> RequirementSet {
        self.requirements.clone()
    }

    fn name(&self) -> &str {
        "follow_path"
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default)]
    struct FakeFollower {
        followed: Vec<(usize, f64, bool)>,
        busy: bool,
        broken: bool,
    }

    impl Follower for FakeFollower {
        fn follow(&mut self, chain: &PathChain, max_power: f64, hold_end: bool) {
            self.followed.push((chain.len(), max_power, hold_end));
            self.busy = true;
        }

        fn is_busy(&self) -> bool {
            self.busy
        }

        fn break_following(&mut self) {
            self.broken = true;
            self.busy = false;
        }

        fn pose(&self) -> Pose {
            Pose::new(0.0, 0.0, 0.0)
        }
    }

    impl Subsystem for FakeFollower {
        fn name(&self) -> &str {
            "fake_follower"
        }
    }

    fn chain_of(n: usize) -> PathChain {
        let seg = PathSegment::line(Pose::new(0.0, 0.0, 0.0), Pose::new(1.0, 0.0, 0.0));
        PathChain::new(vec![seg; n])
    }

    #[test]
    fn test_prebuilt_chain_lifecycle() {
        let follower = Rc::new(RefCell::new(FakeFollower::default()));
        let mut cmd = FollowPathCommand::new(follower.clone(), chain_of(2))
            .with_max_power(0.5)
            .with_hold_end(false);

        assert!(cmd.is_finished());
        cmd.initialize();
        assert_eq!(follower.borrow().followed, vec![(2, 0.5, false)]);
        assert!(!cmd.is_finished());

        follower.borrow_mut().busy = false;
        assert!(cmd.is_finished());
        cmd.end(false);
        assert!(!follower.borrow().broken);
    }

    #[test]
    fn test_interrupt_breaks_following() {
        let follower = Rc::new(RefCell::new(FakeFollower::default()));
        let mut cmd = FollowPathCommand::new(follower.clone(), chain_of(1));

        cmd.initialize();
        cmd.end(true);
        assert!(follower.borrow().broken);
    }

    #[test]
    fn test_builder_materialises_on_initialize() {
        let follower = Rc::new(RefCell::new(FakeFollower::default()));
        let mut cmd = FollowPathCommand::builder(follower.clone());

        let a = Pose::new(0.0, 0.0, 0.0);
        let b = Pose::new(10.0, 0.0, 0.0);
        let c = Pose::new(10.0, 10.0, 0.0);
        cmd.line_to(a, b)
            .unwrap()
            .line_to(b, c)
            .unwrap()
            .constant_heading(1.0)
            .unwrap();

        cmd.initialize();
        assert_eq!(follower.borrow().followed, vec![(2, 1.0, true)]);

        // Frozen after materialisation
        assert!(matches!(
            cmd.line_to(a, b),
            Err(PathCmdError::BuilderFrozen)
        ));
    }

    #[test]
    fn test_prebuilt_is_frozen_from_the_start() {
        let follower = Rc::new(RefCell::new(FakeFollower::default()));
        let mut cmd = FollowPathCommand::new(follower, chain_of(1));

        let a = Pose::new(0.0, 0.0, 0.0);
        assert!(matches!(
            cmd.line_to(a, a),
            Err(PathCmdError::BuilderFrozen)
        ));
    }

    #[test]
    fn test_heading_setter_needs_a_segment() {
        let follower = Rc::new(RefCell::new(FakeFollower::default()));
        let mut cmd = FollowPathCommand::builder(follower);

        assert!(matches!(
            cmd.tangential_heading(),
            Err(PathCmdError::NoSegment)
        ));
    }

    #[test]
    #[should_panic]
    fn test_empty_builder_raises_on_initialize() {
        let follower = Rc::new(RefCell::new(FakeFollower::default()));
        let mut cmd = FollowPathCommand::builder(follower);
        cmd.initialize();
    }
}
