//! # Scheduler
//!
//! The cooperative executor at the centre of the framework. The scheduler
//! owns the set of currently running commands, arbitrates subsystem
//! ownership, runs subsystem periodic callbacks, re-seeds default commands
//! for idle subsystems, and defers structural mutations that occur while it
//! is iterating.
//!
//! The host calls [`Scheduler::tick`] once per control cycle. One tick:
//!
//! 1. Run the `periodic` callback of every registered subsystem.
//! 2. Step every scheduled command in insertion order, closing those that
//!    report finished.
//! 3. Drain the deferred schedule buffer, then the deferred cancel buffer.
//! 4. Schedule the default command of every idle subsystem (it initialises
//!    now but does not execute until the next tick).
//!
//! All state lives behind interior mutability so a command may call
//! [`Scheduler::schedule`] or [`Scheduler::cancel`] from inside its own
//! lifecycle callbacks; mid-tick calls land in the deferred buffers. No
//! borrow is held across a user callback.
//!
//! A panic inside a lifecycle or periodic callback does not corrupt the
//! scheduler: the offending command is ended as interrupted (unless the
//! failure was in `initialize` or `end` itself) and evicted, its ownership
//! entries are released, a [`Fault`] is delivered to the configured sink
//! (logging by default), and the tick continues with the remaining
//! commands.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use log::{debug, error};
use thiserror::Error;

use crate::command::CommandHandle;
use crate::subsystem::SubsystemHandle;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

thread_local! {
    static SCHEDULER: Scheduler = Scheduler::new();
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The cooperative command executor.
///
/// An explicit value; the control thread's shared instance is reached
/// through [`with`]. Tests construct their own with [`Scheduler::new`].
pub struct Scheduler {
    /// Registered subsystems, in registration order.
    subsystems: RefCell<Vec<SubsystemHandle>>,

    /// Default command per subsystem. Re-scheduled whenever the subsystem
    /// becomes idle.
    defaults: RefCell<Vec<(SubsystemHandle, CommandHandle)>>,

    /// Current holder per subsystem. At most one holder; cleared on command
    /// exit.
    ownership: RefCell<Vec<(SubsystemHandle, CommandHandle)>>,

    /// Currently running commands, in admission order.
    scheduled: RefCell<Vec<CommandHandle>>,

    /// Commands whose admission was requested mid-tick.
    to_schedule: RefCell<Vec<CommandHandle>>,

    /// Commands whose cancellation was requested mid-tick.
    to_cancel: RefCell<Vec<CommandHandle>>,

    /// True while tick() is iterating the scheduled set.
    in_tick: Cell<bool>,

    /// Receives faults raised by panicking callbacks.
    fault_sink: RefCell<Box<dyn FnMut(&Fault)>>,
}

/// A contained failure from a command or subsystem callback.
pub struct Fault {
    /// Which lifecycle operation failed.
    pub phase: LifecyclePhase,

    /// Name of the offending command or subsystem.
    pub source: String,

    /// The panic message, where one could be recovered.
    pub message: String,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The lifecycle operation a fault occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Initialize,
    Execute,
    IsFinished,
    End,
    Periodic,
}

/// Errors raised by scheduler configuration operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("The default command for subsystem '{0}' does not require it")]
    DefaultRequirementMismatch(String),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Run a closure against the control thread's scheduler instance.
///
/// This is the ergonomic accessor used at the system boundary (e.g.
/// [`CommandHandle::schedule`]); library code and tests should prefer an
/// explicit [`Scheduler`] value.
pub fn with<R>(f: impl FnOnce(&Scheduler) -> R) -> R {
    SCHEDULER.with(|s| f(s))
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Scheduler {
    /// Create a new scheduler with no registered subsystems and an empty
    /// running set. Faults are logged.
    pub fn new() -> Self {
        Self {
            subsystems: RefCell::new(Vec::new()),
            defaults: RefCell::new(Vec::new()),
            ownership: RefCell::new(Vec::new()),
            scheduled: RefCell::new(Vec::new()),
            to_schedule: RefCell::new(Vec::new()),
            to_cancel: RefCell::new(Vec::new()),
            in_tick: Cell::new(false),
            fault_sink: RefCell::new(Box::new(|fault: &Fault| {
                error!("{}", fault);
            })),
        }
    }

    /// Replace the fault sink. The default sink logs at error level.
    pub fn set_fault_sink(&self, sink: impl FnMut(&Fault) + 'static) {
        *self.fault_sink.borrow_mut() = Box::new(sink);
    }

    /// Register a subsystem for periodic updates. Idempotent.
    pub fn register_subsystem(&self, subsystem: &SubsystemHandle) {
        let mut subsystems = self.subsystems.borrow_mut();
        if !subsystems.contains(subsystem) {
            subsystems.push(subsystem.clone());
        }
    }

    /// Set the default command for a subsystem, replacing any prior default.
    ///
    /// The default command is scheduled automatically at the end of any tick
    /// which leaves the subsystem idle. It must require the subsystem.
    pub fn set_default_command(
        &self,
        subsystem: &SubsystemHandle,
        command: CommandHandle,
    ) -> Result<(), SchedulerError> {
        if !command.requirements().contains(subsystem) {
            return Err(SchedulerError::DefaultRequirementMismatch(
                subsystem.name(),
            ));
        }

        let mut defaults = self.defaults.borrow_mut();
        defaults.retain(|(s, _)| s != subsystem);
        defaults.push((subsystem.clone(), command));
        Ok(())
    }

    /// Schedule a command for execution.
    ///
    /// If a required subsystem is held by another command, the holder is
    /// interrupted first; its `end(true)` runs before this command's
    /// `initialize`. Scheduling an already running command is a no-op.
    /// Mid-tick calls are deferred to the end of the tick.
    pub fn schedule(&self, command: &CommandHandle) {
        if self.in_tick.get() {
            self.to_schedule.borrow_mut().push(command.clone());
            return;
        }

        if self.is_scheduled(command) {
            return;
        }

        let requirements = command.requirements();

        // Interrupt the current holder of each required subsystem
        for subsystem in requirements.iter() {
            if let Some(holder) = self.holder_of(subsystem) {
                if !holder.ptr_eq(command) {
                    debug!(
                        "Command '{}' interrupted by '{}' over subsystem '{}'",
                        holder.name(),
                        command.name(),
                        subsystem.name()
                    );
                    self.cancel(&holder);
                }
            }
        }

        // Admit the command and claim its subsystems
        self.scheduled.borrow_mut().push(command.clone());
        {
            let mut ownership = self.ownership.borrow_mut();
            for subsystem in requirements.iter() {
                ownership.retain(|(s, _)| s != subsystem);
                ownership.push((subsystem.clone(), command.clone()));
            }
        }

        // Initialise last, with no borrows held, so the command may
        // reentrantly schedule or cancel
        if !self.guarded(command, LifecyclePhase::Initialize) {
            // A failed initialise never gets an end call
            self.evict(command);
        }
    }

    /// Cancel a running command, ending it with `interrupted = true`.
    ///
    /// Cancelling a command that is not scheduled is a no-op. Mid-tick
    /// calls are deferred to the end of the tick.
    pub fn cancel(&self, command: &CommandHandle) {
        if self.in_tick.get() {
            self.to_cancel.borrow_mut().push(command.clone());
            return;
        }

        if !self.is_scheduled(command) {
            return;
        }

        self.guarded_end(command, true);
        self.evict(command);
    }

    /// True if the command is currently in the running set.
    pub fn is_scheduled(&self, command: &CommandHandle) -> bool {
        self.scheduled
            .borrow()
            .iter()
            .any(|c| c.ptr_eq(command))
    }

    /// Advance the world by one control cycle.
    pub fn tick(&self) {
        self.in_tick.set(true);

        // Subsystem periodic callbacks precede command execution
        let subsystems: Vec<SubsystemHandle> = self.subsystems.borrow().clone();
        for subsystem in &subsystems {
            if let Err(payload) =
                catch_unwind(AssertUnwindSafe(|| subsystem.periodic()))
            {
                self.report(LifecyclePhase::Periodic, subsystem.name(), payload);
            }
        }

        // Step every scheduled command in admission order. The index walk
        // is safe because structural mutation is deferred while in_tick is
        // set; only this loop removes entries.
        let mut index = 0;
        loop {
            let command = match self.scheduled.borrow().get(index) {
                Some(c) => c.clone(),
                None => break,
            };

            if !self.guarded(&command, LifecyclePhase::Execute) {
                // The command initialised successfully, so it is still owed
                // its end call; it did not finish on its own
                self.guarded_end(&command, true);
                self.evict(&command);
                continue;
            }

            match self.guarded_is_finished(&command) {
                None => {
                    self.guarded_end(&command, true);
                    self.evict(&command);
                }
                Some(true) => {
                    self.guarded_end(&command, false);
                    self.evict(&command);
                }
                Some(false) => {
                    index += 1;
                }
            }
        }

        self.in_tick.set(false);

        // Drain deferred admissions. A command that was both scheduled and
        // cancelled during the tick is admitted by neither drain: skipping
        // it here leaves the cancel drain a no-op, so neither initialize
        // nor end runs for it.
        let pending = self.to_schedule.replace(Vec::new());
        for command in pending {
            let also_cancelled = self
                .to_cancel
                .borrow()
                .iter()
                .any(|c| c.ptr_eq(&command));
            if also_cancelled {
                continue;
            }
            self.schedule(&command);
        }

        let pending = self.to_cancel.replace(Vec::new());
        for command in pending {
            self.cancel(&command);
        }

        // Re-seed default commands for idle subsystems. These initialise
        // now and execute from the next tick.
        let subsystems: Vec<SubsystemHandle> = self.subsystems.borrow().clone();
        for subsystem in &subsystems {
            if self.holder_of(subsystem).is_some() {
                continue;
            }

            let default = self
                .defaults
                .borrow()
                .iter()
                .find(|(s, _)| s == subsystem)
                .map(|(_, c)| c.clone());

            if let Some(command) = default {
                self.schedule(&command);
            }
        }
    }

    /// Clear all scheduler state: running commands, subsystems, defaults,
    /// ownership, and the deferred buffers. Running commands do not receive
    /// an end call; use this between test cases or operating modes.
    pub fn reset(&self) {
        self.scheduled.borrow_mut().clear();
        self.ownership.borrow_mut().clear();
        self.subsystems.borrow_mut().clear();
        self.defaults.borrow_mut().clear();
        self.to_schedule.borrow_mut().clear();
        self.to_cancel.borrow_mut().clear();
        self.in_tick.set(false);
    }

    /// The command currently holding the given subsystem, if any.
    pub fn holder_of(&self, subsystem: &SubsystemHandle) -> Option<CommandHandle> {
        self.ownership
            .borrow()
            .iter()
            .find(|(s, _)| s == subsystem)
            .map(|(_, c)| c.clone())
    }

    /// Number of commands in the running set.
    pub fn scheduled_count(&self) -> usize {
        self.scheduled.borrow().len()
    }

    // -----------------------------------------------------------------------
    // Guarded lifecycle dispatch
    // -----------------------------------------------------------------------

    /// Run `initialize` or `execute`, reporting a fault on panic. Returns
    /// false if the callback panicked.
    fn guarded(&self, command: &CommandHandle, phase: LifecyclePhase) -> bool {
        let result = catch_unwind(AssertUnwindSafe(|| match phase {
            LifecyclePhase::Initialize => command.raw_initialize(),
            LifecyclePhase::Execute => command.raw_execute(),
            _ => unreachable!("guarded() only dispatches initialize/execute"),
        }));

        match result {
            Ok(()) => true,
            Err(payload) => {
                self.report(phase, command.name(), payload);
                false
            }
        }
    }

    /// Poll `is_finished`, reporting a fault on panic. `None` means the
    /// poll panicked and the command must be evicted.
    fn guarded_is_finished(&self, command: &CommandHandle) -> Option<bool> {
        match catch_unwind(AssertUnwindSafe(|| command.raw_is_finished())) {
            Ok(finished) => Some(finished),
            Err(payload) => {
                self.report(LifecyclePhase::IsFinished, command.name(), payload);
                None
            }
        }
    }

    /// Run `end`, reporting a fault on panic. A command whose end panics is
    /// not ended a second time.
    fn guarded_end(&self, command: &CommandHandle, interrupted: bool) {
        if let Err(payload) =
            catch_unwind(AssertUnwindSafe(|| command.raw_end(interrupted)))
        {
            self.report(LifecyclePhase::End, command.name(), payload);
        }
    }

    /// Remove a command from the running set and release every ownership
    /// entry pointing at it.
    fn evict(&self, command: &CommandHandle) {
        self.scheduled.borrow_mut().retain(|c| !c.ptr_eq(command));
        self.ownership
            .borrow_mut()
            .retain(|(_, c)| !c.ptr_eq(command));
    }

    /// Deliver a fault to the sink.
    fn report(&self, phase: LifecyclePhase, source: String, payload: Box<dyn Any + Send>) {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            String::from("unknown panic payload")
        };

        let fault = Fault {
            phase,
            source,
            message,
        };
        (self.fault_sink.borrow_mut())(&fault);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecyclePhase::Initialize => write!(f, "initialize"),
            LifecyclePhase::Execute => write!(f, "execute"),
            LifecyclePhase::IsFinished => write!(f, "is_finished"),
            LifecyclePhase::End => write!(f, "end"),
            LifecyclePhase::Periodic => write!(f, "periodic"),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fault in {} of '{}': {}",
            self.phase, self.source, self.message
        )
    }
}
