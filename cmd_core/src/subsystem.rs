//! # Subsystem identity and requirement sets
//!
//! A subsystem is a part of the robot, such as a drivetrain, arm, or claw.
//! Subsystems are used to specify requirements for commands, ensuring that
//! multiple commands do not try to control the same hardware at the same
//! time.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A shared hardware resource arbitrated by the scheduler.
pub trait Subsystem {
    /// Called once per cycle by the scheduler while the subsystem is
    /// registered. Use this for updating subsystem state and sensors.
    fn periodic(&mut self) {}

    /// Short name used in log and fault messages.
    fn name(&self) -> &str {
        "subsystem"
    }
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An opaque identity handle to a subsystem.
///
/// Equality is pointer identity, not structural: two handles compare equal
/// iff they refer to the same subsystem instance.
#[derive(Clone)]
pub struct SubsystemHandle(Rc<RefCell<dyn Subsystem>>);

/// The set of subsystems a command needs.
///
/// Insertion ordered and deduplicated. Subsystem counts are small, so the
/// set is a plain vector scanned linearly.
#[derive(Clone, Default)]
pub struct RequirementSet(Vec<SubsystemHandle>);

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SubsystemHandle {
    /// Wrap a subsystem into a new handle.
    pub fn new<S: Subsystem + 'static>(subsystem: S) -> Self {
        Self(Rc::new(RefCell::new(subsystem)))
    }

    /// Create a handle over an already shared subsystem.
    ///
    /// Use this when application code needs to keep its own reference to
    /// the concrete subsystem, for example a follower which is both driven
    /// directly and claimed as a requirement.
    pub fn of<S: Subsystem + 'static>(subsystem: Rc<RefCell<S>>) -> Self {
        Self(subsystem)
    }

    /// The subsystem's name, for log and fault messages.
    pub fn name(&self) -> String {
        match self.0.try_borrow() {
            Ok(s) => s.name().to_string(),
            Err(_) => String::from("subsystem"),
        }
    }

    pub(crate) fn periodic(&self) {
        self.0.borrow_mut().periodic()
    }

    fn data_ptr(&self) -> *const () {
        Rc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for SubsystemHandle {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.data_ptr(), other.data_ptr())
    }
}

impl Eq for SubsystemHandle {}

impl fmt::Debug for SubsystemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubsystemHandle({})", self.name())
    }
}

impl RequirementSet {
    /// Create a new empty set.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Create a set from a slice of handles, deduplicating.
    pub fn of(handles: &[SubsystemHandle]) -> Self {
        let mut set = Self::new();
        for h in handles {
            set.insert(h.clone());
        }
        set
    }

    /// Insert a handle, returning false if it was already present.
    pub fn insert(&mut self, handle: SubsystemHandle) -> bool {
        if self.contains(&handle) {
            false
        } else {
            self.0.push(handle);
            true
        }
    }

    pub fn contains(&self, handle: &SubsystemHandle) -> bool {
        self.0.iter().any(|h| h == handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubsystemHandle> {
        self.0.iter()
    }

    /// Add every handle of `other` to this set.
    pub fn union(&mut self, other: &RequirementSet) {
        for h in other.iter() {
            self.insert(h.clone());
        }
    }

    /// True if no handle is shared between the two sets.
    pub fn is_disjoint(&self, other: &RequirementSet) -> bool {
        self.0.iter().all(|h| !other.contains(h))
    }

    /// First handle shared between the two sets, if any.
    pub fn first_overlap(&self, other: &RequirementSet) -> Option<&SubsystemHandle> {
        self.0.iter().find(|h| other.contains(h))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for RequirementSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}
