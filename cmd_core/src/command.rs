//! # Command contract
//!
//! A command is a state machine representing a complete action performed by
//! the robot. Commands are scheduled on the [`Scheduler`], stepped once per
//! cycle, and may be composed into groups.
//!
//! [`Scheduler`]: crate::scheduler::Scheduler

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::scheduler;
use crate::subsystem::RequirementSet;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A state machine action with a five-operation lifecycle.
///
/// The lifecycle is `initialize -> execute* -> is_finished? -> end`:
///
/// 1. [`Command::initialize`] - called once when the command is admitted to
///    the running set.
/// 2. [`Command::execute`] - called once per cycle while running.
/// 3. [`Command::is_finished`] - polled after every `execute`.
/// 4. [`Command::end`] - called exactly once when the command leaves the
///    running set, with `interrupted = true` if it did not finish on its own.
///
/// The requirement set is fixed for the lifetime of the command. A command
/// may be re-scheduled after ending, which starts a fresh lifecycle on the
/// same instance.
pub trait Command {
    /// Called once when the command is scheduled.
    fn initialize(&mut self) {}

    /// Called once per cycle while the command is scheduled.
    fn execute(&mut self) {}

    /// Polled after every `execute` to decide whether the command is done.
    fn is_finished(&mut self) -> bool {
        false
    }

    /// Called exactly once when the command ends or is interrupted.
    fn end(&mut self, _interrupted: bool) {}

    /// The set of subsystems this command needs. At most one command may
    /// hold a subsystem at a time; scheduling a command whose requirement
    /// is held interrupts the current holder.
    fn requirements(&self) -> RequirementSet {
        RequirementSet::new()
    }

    /// Short name used in log and fault messages.
    fn name(&self) -> &str {
        "command"
    }
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A shared handle to a command.
///
/// Handle identity is pointer identity: two handles are equal iff they refer
/// to the same command instance. The scheduler, the registry, and
/// application code share ownership of commands through these handles;
/// composition groups instead own their children exclusively.
#[derive(Clone)]
pub struct CommandHandle(Rc<RefCell<dyn Command>>);

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CommandHandle {
    /// Wrap a command into a new shared handle.
    pub fn new<C: Command + 'static>(command: C) -> Self {
        Self(Rc::new(RefCell::new(command)))
    }

    /// True if both handles refer to the same command instance.
    pub fn ptr_eq(&self, other: &CommandHandle) -> bool {
        std::ptr::eq(
            Rc::as_ptr(&self.0) as *const (),
            Rc::as_ptr(&other.0) as *const (),
        )
    }

    /// The command's name, for log and fault messages.
    pub fn name(&self) -> String {
        match self.0.try_borrow() {
            Ok(c) => c.name().to_string(),
            Err(_) => String::from("command"),
        }
    }

    /// The command's requirement set.
    pub fn requirements(&self) -> RequirementSet {
        self.0.borrow().requirements()
    }

    /// Schedule this command on the control thread's scheduler.
    pub fn schedule(&self) {
        scheduler::with(|s| s.schedule(self))
    }

    /// Cancel this command on the control thread's scheduler.
    pub fn cancel(&self) {
        scheduler::with(|s| s.cancel(self))
    }

    pub(crate) fn raw_initialize(&self) {
        self.0.borrow_mut().initialize()
    }

    pub(crate) fn raw_execute(&self) {
        self.0.borrow_mut().execute()
    }

    pub(crate) fn raw_is_finished(&self) -> bool {
        self.0.borrow_mut().is_finished()
    }

    pub(crate) fn raw_end(&self, interrupted: bool) {
        self.0.borrow_mut().end(interrupted)
    }
}

impl PartialEq for CommandHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for CommandHandle {}

impl fmt::Debug for CommandHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandHandle({})", self.name())
    }
}
