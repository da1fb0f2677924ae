//! # Leaf commands
//!
//! The primitive commands from which routines are composed: run a closure
//! once, run a closure every cycle, wait for a duration, wait for a
//! predicate.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::time::{Duration, Instant};

use crate::command::Command;
use crate::subsystem::RequirementSet;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A command that runs a closure once on `initialize` and finishes
/// immediately.
pub struct InstantCommand {
    action: Box<dyn FnMut()>,
    requirements: RequirementSet,
}

/// A command that runs a closure every cycle and never finishes on its own.
/// It must be cancelled externally, or raced against another command.
pub struct RunCommand {
    action: Box<dyn FnMut()>,
    requirements: RequirementSet,
}

/// A command that waits for a duration on the monotonic clock.
///
/// The start timestamp is recorded on `initialize`; an instance that has
/// not yet been initialised reports not finished. A zero duration finishes
/// on the first poll.
pub struct WaitCommand {
    duration: Duration,
    start: Option<Instant>,
}

/// A command that waits until a predicate returns true.
///
/// The predicate is evaluated on every poll; there is no initialisation
/// state.
pub struct WaitUntilCommand {
    condition: Box<dyn FnMut() -> bool>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl InstantCommand {
    pub fn new(action: impl FnMut() + 'static) -> Self {
        Self {
            action: Box::new(action),
            requirements: RequirementSet::new(),
        }
    }

    pub fn with_requirements(action: impl FnMut() + 'static, requirements: RequirementSet) -> Self {
        Self {
            action: Box::new(action),
            requirements,
        }
    }

    pub(crate) fn from_boxed(action: Box<dyn FnMut()>) -> Self {
        Self {
            action,
            requirements: RequirementSet::new(),
        }
    }
}

impl Command for InstantCommand {
    fn initialize(&mut self) {
        (self.action)()
    }

    fn is_finished(&mut self) -> bool {
        true
    }

    fn requirements(&self) -> RequirementSet {
        self.requirements.clone()
    }

    fn name(&self) -> &str {
        "instant"
    }
}

impl RunCommand {
    pub fn new(action: impl FnMut() + 'static, requirements: RequirementSet) -> Self {
        Self {
            action: Box::new(action),
            requirements,
        }
    }
}

impl Command for RunCommand {
    fn execute(&mut self) {
        (self.action)()
    }

    fn requirements(&self) -> RequirementSet {
        self.requirements.clone()
    }

    fn name(&self) -> &str {
        "run"
    }
}

impl WaitCommand {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            start: None,
        }
    }

    pub fn from_ms(duration_ms: u64) -> Self {
        Self::new(Duration::from_millis(duration_ms))
    }
}

impl Command for WaitCommand {
    fn initialize(&mut self) {
        self.start = Some(Instant::now());
    }

    fn is_finished(&mut self) -> bool {
        if self.duration.is_zero() {
            return true;
        }

        // Not yet initialised, treat as not finished until initialised
        match self.start {
            Some(start) => start.elapsed() >= self.duration,
            None => false,
        }
    }

    fn name(&self) -> &str {
        "wait"
    }
}

impl WaitUntilCommand {
    pub fn new(condition: impl FnMut() -> bool + 'static) -> Self {
        Self {
            condition: Box::new(condition),
        }
    }
}

impl Command for WaitUntilCommand {
    fn is_finished(&mut self) -> bool {
        (self.condition)()
    }

    fn name(&self) -> &str {
        "wait_until"
    }
}
