//! # Composition groups
//!
//! Groups are commands whose children are themselves commands. A group owns
//! its children exclusively; a child never outlives its parent. The group's
//! requirement set is the union of its children's sets, computed at
//! construction.
//!
//! Groups which run children concurrently refuse construction when two
//! children share a requirement, since both would then hold the same
//! subsystem inside one scheduler slot. Sequential groups are exempt because
//! their children never overlap in time.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use thiserror::Error;

use crate::command::Command;
use crate::subsystem::RequirementSet;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Runs children one at a time, in order. Finishes when the last child
/// finishes; interruption is forwarded to the active child.
pub struct SequentialGroup {
    children: Vec<Box<dyn Command>>,
    /// Index of the active child. `None` while the group is not running;
    /// equal to the child count once the sequence has completed.
    current: Option<usize>,
    requirements: RequirementSet,
}

/// Runs all children concurrently. Finishes when every child has finished;
/// interruption is forwarded to each still-running child.
pub struct ParallelGroup {
    children: Vec<ChildSlot>,
    requirements: RequirementSet,
}

/// Runs all children concurrently until the first finishes. The winners of
/// the cycle get `end(false)`; every other still-running child is
/// interrupted.
pub struct ParallelRaceGroup {
    children: Vec<ChildSlot>,
    finished: bool,
    requirements: RequirementSet,
}

/// Runs a deadline child plus companions. The group finishes with the
/// deadline; still-running companions are then interrupted.
pub struct ParallelDeadlineGroup {
    deadline: ChildSlot,
    deadline_done: bool,
    companions: Vec<ChildSlot>,
    requirements: RequirementSet,
}

/// A child command together with its running flag.
///
/// The flag is the single source of truth for whether the child still owes
/// an `end` call, so no child can be ended twice even when several finish
/// in the same cycle.
struct ChildSlot {
    command: Box<dyn Command>,
    running: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised while constructing a group.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error("Concurrent children both require the subsystem '{0}'")]
    RequirementConflict(String),
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Union of the children's requirement sets.
fn union_of(children: &[Box<dyn Command>]) -> RequirementSet {
    let mut set = RequirementSet::new();
    for child in children {
        set.union(&child.requirements());
    }
    set
}

/// Union of the children's requirement sets, failing if any two overlap.
fn disjoint_union_of(children: &[Box<dyn Command>]) -> Result<RequirementSet, GroupError> {
    let mut set = RequirementSet::new();
    for child in children {
        let reqs = child.requirements();
        if let Some(shared) = set.first_overlap(&reqs) {
            return Err(GroupError::RequirementConflict(shared.name()));
        }
        set.union(&reqs);
    }
    Ok(set)
}

fn into_slots(children: Vec<Box<dyn Command>>) -> Vec<ChildSlot> {
    children
        .into_iter()
        .map(|command| ChildSlot {
            command,
            running: false,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SequentialGroup {
    pub fn new(children: Vec<Box<dyn Command>>) -> Self {
        let requirements = union_of(&children);
        Self {
            children,
            current: None,
            requirements,
        }
    }
}

impl Command for SequentialGroup {
    fn initialize(&mut self) {
        self.current = Some(0);
        if let Some(first) = self.children.first_mut() {
            first.initialize();
        }
    }

    fn execute(&mut self) {
        let index = match self.current {
            Some(i) if i < self.children.len() => i,
            _ => return,
        };

        let child = &mut self.children[index];
        child.execute();

        if child.is_finished() {
            child.end(false);

            let next = index + 1;
            self.current = Some(next);
            if let Some(child) = self.children.get_mut(next) {
                child.initialize();
            }
        }
    }

    fn is_finished(&mut self) -> bool {
        matches!(self.current, Some(i) if i >= self.children.len())
    }

    fn end(&mut self, interrupted: bool) {
        if interrupted {
            if let Some(index) = self.current {
                if let Some(child) = self.children.get_mut(index) {
                    child.end(true);
                }
            }
        }
        self.current = None;
    }

    fn requirements(&self) -> RequirementSet {
        self.requirements.clone()
    }

    fn name(&self) -> &str {
        "sequential"
    }
}

impl ParallelGroup {
    pub fn new(children: Vec<Box<dyn Command>>) -> Result<Self, GroupError> {
        let requirements = disjoint_union_of(&children)?;
        Ok(Self {
            children: into_slots(children),
            requirements,
        })
    }
}

impl Command for ParallelGroup {
    fn initialize(&mut self) {
        for slot in &mut self.children {
            slot.command.initialize();
            slot.running = true;
        }
    }

    fn execute(&mut self) {
        for slot in &mut self.children {
            if !slot.running {
                continue;
            }

            slot.command.execute();
            if slot.command.is_finished() {
                slot.command.end(false);
                slot.running = false;
            }
        }
    }

    fn is_finished(&mut self) -> bool {
        self.children.iter().all(|slot| !slot.running)
    }

    fn end(&mut self, interrupted: bool) {
        if interrupted {
            for slot in &mut self.children {
                if slot.running {
                    slot.command.end(true);
                }
            }
        }
        for slot in &mut self.children {
            slot.running = false;
        }
    }

    fn requirements(&self) -> RequirementSet {
        self.requirements.clone()
    }

    fn name(&self) -> &str {
        "parallel"
    }
}

impl ParallelRaceGroup {
    pub fn new(children: Vec<Box<dyn Command>>) -> Result<Self, GroupError> {
        let requirements = disjoint_union_of(&children)?;
        Ok(Self {
            children: into_slots(children),
            finished: false,
            requirements,
        })
    }
}

impl Command for ParallelRaceGroup {
    fn initialize(&mut self) {
        // An empty race finishes immediately without initialising anything
        self.finished = self.children.is_empty();
        for slot in &mut self.children {
            slot.command.initialize();
            slot.running = true;
        }
    }

    fn execute(&mut self) {
        if self.finished {
            return;
        }

        // Every child still gets its step this cycle, so several children
        // may win a tie; each winner is closed naturally, the rest are
        // interrupted in end().
        for slot in &mut self.children {
            if !slot.running {
                continue;
            }

            slot.command.execute();
            if slot.command.is_finished() {
                slot.command.end(false);
                slot.running = false;
                self.finished = true;
            }
        }
    }

    fn is_finished(&mut self) -> bool {
        self.finished
    }

    fn end(&mut self, _interrupted: bool) {
        for slot in &mut self.children {
            if slot.running {
                slot.command.end(true);
                slot.running = false;
            }
        }
    }

    fn requirements(&self) -> RequirementSet {
        self.requirements.clone()
    }

    fn name(&self) -> &str {
        "parallel_race"
    }
}

impl ParallelDeadlineGroup {
    pub fn new(
        deadline: Box<dyn Command>,
        companions: Vec<Box<dyn Command>>,
    ) -> Result<Self, GroupError> {
        let mut all = companions;
        all.insert(0, deadline);
        let requirements = disjoint_union_of(&all)?;
        let deadline = all.remove(0);

        Ok(Self {
            deadline: ChildSlot {
                command: deadline,
                running: false,
            },
            deadline_done: false,
            companions: into_slots(all),
            requirements,
        })
    }
}

impl Command for ParallelDeadlineGroup {
    fn initialize(&mut self) {
        self.deadline_done = false;
        self.deadline.command.initialize();
        self.deadline.running = true;

        for slot in &mut self.companions {
            slot.command.initialize();
            slot.running = true;
        }
    }

    fn execute(&mut self) {
        if self.deadline_done {
            return;
        }

        self.deadline.command.execute();

        // Companions run even on the deadline's final cycle, so events
        // landing on the same cycle as completion still fire
        for slot in &mut self.companions {
            if !slot.running {
                continue;
            }

            slot.command.execute();
            if slot.command.is_finished() {
                slot.command.end(false);
                slot.running = false;
            }
        }

        if self.deadline.command.is_finished() {
            self.deadline_done = true;
        }
    }

    fn is_finished(&mut self) -> bool {
        self.deadline_done
    }

    fn end(&mut self, interrupted: bool) {
        if self.deadline.running {
            self.deadline.command.end(interrupted);
            self.deadline.running = false;
        }

        for slot in &mut self.companions {
            if slot.running {
                slot.command.end(true);
                slot.running = false;
            }
        }
    }

    fn requirements(&self) -> RequirementSet {
        self.requirements.clone()
    }

    fn name(&self) -> &str {
        "parallel_deadline"
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

    #[derive(Default)]
    struct ProbeState {
        init_count: u32,
        exec_count: u32,
        end_natural: u32,
        end_interrupted: u32,
    }

    /// Records lifecycle calls and finishes after a set number of executes
    /// (`None` never finishes on its own).
    struct Probe {
        state: Rc<RefCell<ProbeState>>,
        finish_after: Option<u32>,
        requirements: RequirementSet,
    }

    impl Probe {
        fn new(finish_after: Option<u32>) -> (Box<dyn Command>, Rc<RefCell<ProbeState>>) {
            Self::with_requirements(finish_after, RequirementSet::new())
        }

        fn with_requirements(
            finish_after: Option<u32>,
            requirements: RequirementSet,
        ) -> (Box<dyn Command>, Rc<RefCell<ProbeState>>) {
            let state = Rc::new(RefCell::new(ProbeState::default()));
            let probe = Box::new(Probe {
                state: state.clone(),
                finish_after,
                requirements,
            });
            (probe, state)
        }
    }

    impl Command for Probe {
        fn initialize(&mut self) {
            self.state.borrow_mut().init_count += 1;
        }

        fn execute(&mut self) {
            self.state.borrow_mut().exec_count += 1;
        }

        fn is_finished(&mut self) -> bool {
            match self.finish_after {
                Some(n) => self.state.borrow().exec_count >= n,
                None => false,
            }
        }

        fn end(&mut self, interrupted: bool) {
            let mut state = self.state.borrow_mut();
            if interrupted {
                state.end_interrupted += 1;
            } else {
                state.end_natural += 1;
            }
        }

        fn requirements(&self) -> RequirementSet {
            self.requirements.clone()
        }
    }

    #[test]
    fn test_sequential_advances_through_children() {
        let (a, a_state) = Probe::new(Some(1));
        let (b, b_state) = Probe::new(Some(2));
        let mut group = SequentialGroup::new(vec![a, b]);

        group.initialize();
        assert_eq!(a_state.borrow().init_count, 1);
        assert_eq!(b_state.borrow().init_count, 0);

        // First cycle closes a and initialises b
        group.execute();
        assert!(!group.is_finished());
        assert_eq!(a_state.borrow().end_natural, 1);
        assert_eq!(b_state.borrow().init_count, 1);

        // b needs two executes
        group.execute();
        assert!(!group.is_finished());
        group.execute();
        assert!(group.is_finished());
        assert_eq!(b_state.borrow().end_natural, 1);
    }

    #[test]
    fn test_sequential_interrupt_forwards_to_active_child() {
        let (a, a_state) = Probe::new(Some(1));
        let (b, b_state) = Probe::new(None);
        let mut group = SequentialGroup::new(vec![a, b]);

        group.initialize();
        group.execute();
        group.end(true);

        assert_eq!(a_state.borrow().end_interrupted, 0);
        assert_eq!(b_state.borrow().end_interrupted, 1);
    }

    #[test]
    fn test_sequential_empty_finishes_on_first_poll() {
        let mut group = SequentialGroup::new(Vec::new());
        assert!(!group.is_finished());
        group.initialize();
        group.execute();
        assert!(group.is_finished());
    }

    #[test]
    fn test_parallel_waits_for_all() {
        let (a, a_state) = Probe::new(Some(1));
        let (b, b_state) = Probe::new(Some(3));
        let mut group = ParallelGroup::new(vec![a, b]).unwrap();

        group.initialize();
        group.execute();
        assert!(!group.is_finished());
        assert_eq!(a_state.borrow().end_natural, 1);

        group.execute();
        group.execute();
        assert!(group.is_finished());
        assert_eq!(b_state.borrow().end_natural, 1);
        // A finished child is not executed again
        assert_eq!(a_state.borrow().exec_count, 1);
    }

    #[test]
    fn test_parallel_interrupt_hits_only_running_children() {
        let (a, a_state) = Probe::new(Some(1));
        let (b, b_state) = Probe::new(None);
        let mut group = ParallelGroup::new(vec![a, b]).unwrap();

        group.initialize();
        group.execute();
        group.end(true);

        assert_eq!(a_state.borrow().end_natural, 1);
        assert_eq!(a_state.borrow().end_interrupted, 0);
        assert_eq!(b_state.borrow().end_interrupted, 1);
    }

    #[test]
    fn test_race_winner_and_losers() {
        let (fast, fast_state) = Probe::new(Some(1));
        let (slow, slow_state) = Probe::new(None);
        let mut group = ParallelRaceGroup::new(vec![fast, slow]).unwrap();

        group.initialize();
        group.execute();
        assert!(group.is_finished());

        group.end(false);
        assert_eq!(fast_state.borrow().end_natural, 1);
        assert_eq!(fast_state.borrow().end_interrupted, 0);
        assert_eq!(slow_state.borrow().end_interrupted, 1);
    }

    #[test]
    fn test_race_tie_closes_all_winners_naturally() {
        let (a, a_state) = Probe::new(Some(1));
        let (b, b_state) = Probe::new(Some(1));
        let (c, c_state) = Probe::new(None);
        let mut group = ParallelRaceGroup::new(vec![a, b, c]).unwrap();

        group.initialize();
        group.execute();
        group.end(false);

        assert_eq!(a_state.borrow().end_natural, 1);
        assert_eq!(b_state.borrow().end_natural, 1);
        assert_eq!(c_state.borrow().end_interrupted, 1);
        // Nobody ended twice
        assert_eq!(a_state.borrow().end_interrupted, 0);
        assert_eq!(b_state.borrow().end_interrupted, 0);
    }

    #[test]
    fn test_race_empty_finishes_without_initialising() {
        let mut group = ParallelRaceGroup::new(Vec::new()).unwrap();
        group.initialize();
        assert!(group.is_finished());
    }

    #[test]
    fn test_deadline_ends_companions_when_deadline_finishes() {
        let (deadline, deadline_state) = Probe::new(Some(2));
        let (companion, companion_state) = Probe::new(None);
        let mut group = ParallelDeadlineGroup::new(deadline, vec![companion]).unwrap();

        group.initialize();
        group.execute();
        assert!(!group.is_finished());
        group.execute();
        assert!(group.is_finished());

        group.end(false);
        assert_eq!(deadline_state.borrow().end_natural, 1);
        assert_eq!(companion_state.borrow().end_interrupted, 1);
        // Companions ran on the deadline's final cycle too
        assert_eq!(companion_state.borrow().exec_count, 2);
    }

    #[test]
    fn test_concurrent_requirement_conflict_rejected() {
        let sub = SubsystemHandle::new(Dummy);
        let reqs = RequirementSet::of(&[sub.clone()]);

        let (a, _) = Probe::with_requirements(None, reqs.clone());
        let (b, _) = Probe::with_requirements(None, reqs.clone());
        assert!(matches!(
            ParallelGroup::new(vec![a, b]),
            Err(GroupError::RequirementConflict(_))
        ));

        let (a, _) = Probe::with_requirements(None, reqs.clone());
        let (b, _) = Probe::with_requirements(None, reqs.clone());
        assert!(ParallelRaceGroup::new(vec![a, b]).is_err());

        let (a, _) = Probe::with_requirements(None, reqs.clone());
        let (b, _) = Probe::with_requirements(None, reqs.clone());
        assert!(ParallelDeadlineGroup::new(a, vec![b]).is_err());

        // Sequential children never overlap in time, overlap is fine
        let (a, _) = Probe::with_requirements(None, reqs.clone());
        let (b, _) = Probe::with_requirements(None, reqs);
        let group = SequentialGroup::new(vec![a, b]);
        assert_eq!(group.requirements().len(), 1);
    }
}
