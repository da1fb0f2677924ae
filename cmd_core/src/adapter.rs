//! # Adapter layer
//!
//! Admits foreign objects into the command model. Foreign command libraries
//! rarely implement [`Command`] directly, but most expose some subset of the
//! conventional lifecycle operations. The adapter captures whatever the
//! caller can provide at registration time as a tagged capability and
//! synthesises a command that dispatches through it; anything missing is a
//! no-op, with `is_finished` defaulting to false.
//!
//! Lifecycle dispatch never probes the foreign object at tick time: every
//! entry point is a closure captured up front.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::panic::{catch_unwind, AssertUnwindSafe};

use log::error;

use crate::command::{Command, CommandHandle};
use crate::leaf::InstantCommand;
use crate::subsystem::RequirementSet;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Something that can be admitted into the command model.
pub enum Adaptable {
    /// Already a command; passed through untouched.
    Native(CommandHandle),

    /// A bare closure; wrapped in an instant command with no requirements.
    Closure(Box<dyn FnMut()>),

    /// A foreign object's lifecycle entry points, captured at registration.
    Foreign(ForeignVtable),

    /// A foreign object whose lifecycle is opaque but which can schedule
    /// itself; wrapped in an instant command whose `initialize` invokes the
    /// schedule entry point.
    Schedulable(Box<dyn FnMut()>),
}

/// The lifecycle entry points of a foreign command, discovered at
/// registration time. Every slot is optional.
#[derive(Default)]
pub struct ForeignVtable {
    pub initialize: Option<Box<dyn FnMut()>>,
    pub execute: Option<Box<dyn FnMut()>>,
    pub is_finished: Option<Box<dyn FnMut() -> bool>>,
    /// Preferred over `end_no_arg` when both are present.
    pub end: Option<Box<dyn FnMut(bool)>>,
    pub end_no_arg: Option<Box<dyn FnMut()>>,
    pub requirements: Option<Box<dyn Fn() -> RequirementSet>>,
}

/// A command dispatching through a [`ForeignVtable`].
///
/// A panic inside a vtable slot is caught here, logged as an adapter
/// failure, and treated as a no-op for that cycle, so a misbehaving foreign
/// object cannot take down the tick or get its host command evicted.
struct ForeignCommand {
    label: String,
    vtable: ForeignVtable,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert an [`Adaptable`] into a command handle.
pub fn adapt(source: Adaptable) -> CommandHandle {
    match source {
        Adaptable::Native(handle) => handle,
        Adaptable::Closure(action) => CommandHandle::new(InstantCommand::from_boxed(action)),
        Adaptable::Foreign(vtable) => CommandHandle::new(ForeignCommand {
            label: String::from("foreign"),
            vtable,
        }),
        Adaptable::Schedulable(action) => CommandHandle::new(InstantCommand::from_boxed(action)),
    }
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Adaptable {
    /// Admit a command type directly.
    pub fn command(command: impl Command + 'static) -> Self {
        Adaptable::Native(CommandHandle::new(command))
    }

    /// Admit a bare closure.
    pub fn closure(action: impl FnMut() + 'static) -> Self {
        Adaptable::Closure(Box::new(action))
    }

    /// Admit a foreign object with an opaque lifecycle through its schedule
    /// entry point.
    pub fn schedulable(schedule: impl FnMut() + 'static) -> Self {
        Adaptable::Schedulable(Box::new(schedule))
    }
}

impl From<CommandHandle> for Adaptable {
    fn from(handle: CommandHandle) -> Self {
        Adaptable::Native(handle)
    }
}

impl ForeignCommand {
    fn invoke(label: &str, op: &str, slot: &mut Option<Box<dyn FnMut()>>) {
        if let Some(f) = slot {
            if catch_unwind(AssertUnwindSafe(f)).is_err() {
                error!("Adapter failure in '{}' during {}", label, op);
            }
        }
    }
}

impl Command for ForeignCommand {
    fn initialize(&mut self) {
        Self::invoke(&self.label, "initialize", &mut self.vtable.initialize);
    }

    fn execute(&mut self) {
        Self::invoke(&self.label, "execute", &mut self.vtable.execute);
    }

    fn is_finished(&mut self) -> bool {
        match &mut self.vtable.is_finished {
            Some(f) => match catch_unwind(AssertUnwindSafe(f)) {
                Ok(finished) => finished,
                Err(_) => {
                    error!("Adapter failure in '{}' during is_finished", self.label);
                    false
                }
            },
            None => false,
        }
    }

    fn end(&mut self, interrupted: bool) {
        if let Some(f) = &mut self.vtable.end {
            if catch_unwind(AssertUnwindSafe(|| f(interrupted))).is_err() {
                error!("Adapter failure in '{}' during end", self.label);
            }
        } else {
            Self::invoke(&self.label, "end", &mut self.vtable.end_no_arg);
        }
    }

    fn requirements(&self) -> RequirementSet {
        match &self.vtable.requirements {
            Some(f) => f(),
            None => RequirementSet::new(),
        }
    }

    fn name(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::subsystem::{Subsystem, SubsystemHandle};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Dummy;
    impl Subsystem for Dummy {}

    #[test]
    fn test_closure_becomes_instant() {
        let count = Rc::new(RefCell::new(0u32));
        let c = count.clone();
        let handle = adapt(Adaptable::closure(move || *c.borrow_mut() += 1));

        handle.raw_initialize();
        assert!(handle.raw_is_finished());
        assert_eq!(*count.borrow(), 1);
        assert!(handle.requirements().is_empty());
    }

    #[test]
    fn test_foreign_dispatches_captured_slots() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sub = SubsystemHandle::new(Dummy);

        let l = log.clone();
        let init = move || l.borrow_mut().push("init");
        let l = log.clone();
        let exec = move || l.borrow_mut().push("exec");
        let l = log.clone();
        let end = move |interrupted: bool| {
            l.borrow_mut()
                .push(if interrupted { "end(true)" } else { "end(false)" })
        };
        let reqs = RequirementSet::of(&[sub.clone()]);

        let handle = adapt(Adaptable::Foreign(ForeignVtable {
            initialize: Some(Box::new(init)),
            execute: Some(Box::new(exec)),
            is_finished: Some(Box::new(|| true)),
            end: Some(Box::new(end)),
            end_no_arg: None,
            requirements: Some(Box::new(move || reqs.clone())),
        }));

        handle.raw_initialize();
        handle.raw_execute();
        assert!(handle.raw_is_finished());
        handle.raw_end(false);

        assert_eq!(*log.borrow(), vec!["init", "exec", "end(false)"]);
        assert!(handle.requirements().contains(&sub));
    }

    #[test]
    fn test_foreign_missing_slots_are_noops() {
        let handle = adapt(Adaptable::Foreign(ForeignVtable::default()));

        handle.raw_initialize();
        handle.raw_execute();
        assert!(!handle.raw_is_finished());
        handle.raw_end(true);
        assert!(handle.requirements().is_empty());
    }

    #[test]
    fn test_foreign_prefers_end_with_flag() {
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = log.clone();
        let end = move |_: bool| l.borrow_mut().push("flag");
        let l = log.clone();
        let end_no_arg = move || l.borrow_mut().push("no_arg");

        let handle = adapt(Adaptable::Foreign(ForeignVtable {
            end: Some(Box::new(end)),
            end_no_arg: Some(Box::new(end_no_arg)),
            ..Default::default()
        }));

        handle.raw_end(true);
        assert_eq!(*log.borrow(), vec!["flag"]);
    }

    #[test]
    fn test_foreign_panic_is_contained() {
        let handle = adapt(Adaptable::Foreign(ForeignVtable {
            execute: Some(Box::new(|| panic!("misbehaving foreign object"))),
            is_finished: Some(Box::new(|| panic!("also broken"))),
            ..Default::default()
        }));

        // Neither call propagates the panic; is_finished falls back to false
        handle.raw_execute();
        assert!(!handle.raw_is_finished());
    }
}
