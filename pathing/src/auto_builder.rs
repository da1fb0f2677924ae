//! # Auto-routine builder
//!
//! Turns a path document into a runnable command tree. Consecutive lines
//! accumulate into one chain; waits break the chain into separate follow
//! commands. Each chain is followed inside a parallel-deadline group whose
//! companions watch follower progress: one updates the progress tracker's
//! path name per segment, and one per event marker schedules the registered
//! command of the same name when the marker position is reached.
//!
//! Event markers refer to commands by string through the named-command
//! registry, so routine trees never hold owning references to event
//! commands.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;
use std::path::Path;
use std::rc::Rc;

use log::warn;
use thiserror::Error;

use cmd_core::registry;
use cmd_core::{
    Command, CommandHandle, GroupError, InstantCommand, ParallelDeadlineGroup, SequentialGroup,
    Subsystem, WaitCommand, WaitUntilCommand,
};

use crate::chain::{HeadingInterpolation, PathChain, PathSegment, Pose};
use crate::follow_path::FollowPathCommand;
use crate::follower::Follower;
use crate::path_file::{HeadingMode, Line, PathFileError, PathReader};
use crate::progress::ProgressTracker;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors while composing a routine from a path document.
#[derive(Debug, Error)]
pub enum AutoBuildError {
    #[error("Failed to read the path document: {0}")]
    FileError(#[from] PathFileError),

    #[error("The path document has no start point")]
    MissingStartPose,

    #[error("Failed to compose the routine: {0}")]
    GroupError(#[from] GroupError),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Build the command tree for a path document on disk.
pub fn build_auto<F: Follower + Subsystem + 'static>(
    path: impl AsRef<Path>,
    follower: Rc<RefCell<F>>,
) -> Result<CommandHandle, AutoBuildError> {
    let reader = PathReader::from_path(path)?;
    build_from_reader(&reader, follower)
}

/// Build the command tree for an already parsed path document.
pub fn build_from_reader<F: Follower + Subsystem + 'static>(
    reader: &PathReader,
    follower: Rc<RefCell<F>>,
) -> Result<CommandHandle, AutoBuildError> {
    let tracker = Rc::new(RefCell::new(ProgressTracker::new(follower.clone())));
    let mut root: Vec<Box<dyn Command>> = Vec::new();

    // Seed the localiser first
    let start_pose = reader.start_pose().ok_or(AutoBuildError::MissingStartPose)?;
    {
        let f = follower.clone();
        root.push(Box::new(InstantCommand::new(move || {
            f.borrow_mut().set_starting_pose(start_pose)
        })));
    }

    let mut pending = PendingChain::new();
    let mut current_pose = start_pose;

    for line in ordered_lines(reader) {
        if line.wait_before_ms > 0 {
            pending.flush(&mut root, &follower, &tracker)?;
            root.push(Box::new(WaitCommand::from_ms(line.wait_before_ms)));
        }

        // The reader resolves heading modes into end poses; fall back to a
        // zero heading for lines it could not resolve
        let end_pose = reader.pose(&line.name).unwrap_or_else(|| {
            warn!("No resolved pose for line '{}'", line.name);
            PathReader::to_pose(line.end_point.x, line.end_point.y, 0.0)
        });

        add_segment(&mut pending, line, current_pose, end_pose, &follower, &tracker);
        current_pose = end_pose;

        if line.wait_after_ms > 0 {
            pending.flush(&mut root, &follower, &tracker)?;
            root.push(Box::new(WaitCommand::from_ms(line.wait_after_ms)));
        }
    }

    pending.flush(&mut root, &follower, &tracker)?;

    Ok(CommandHandle::new(SequentialGroup::new(root)))
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Lines in execution order: the explicit sequence where the document has
/// one, natural line order otherwise.
fn ordered_lines(reader: &PathReader) -> Vec<&Line> {
    let file = reader.file();

    let sequence = match &file.sequence {
        Some(seq) => seq,
        None => return file.lines.iter().collect(),
    };

    let by_id: HashMap<&str, &Line> = file
        .lines
        .iter()
        .filter_map(|line| line.id.as_deref().map(|id| (id, line)))
        .collect();

    let mut ordered = Vec::new();
    for item in sequence {
        if item.kind != "path" {
            continue;
        }

        match item.line_id.as_deref().and_then(|id| by_id.get(id)) {
            Some(line) => ordered.push(*line),
            None => warn!(
                "Sequence references unknown line id {:?}, skipping",
                item.line_id
            ),
        }
    }
    ordered
}

/// Append one line to the pending chain, with its progress companions.
fn add_segment<F: Follower + Subsystem + 'static>(
    pending: &mut PendingChain,
    line: &Line,
    start: Pose,
    end: Pose,
    follower: &Rc<RefCell<F>>,
    tracker: &Rc<RefCell<ProgressTracker<F>>>,
) {
    let control_points = line
        .control_points
        .iter()
        .map(|cp| PathReader::to_point(cp.x, cp.y))
        .collect();

    let heading = match line.end_point.heading {
        HeadingMode::Linear => HeadingInterpolation::Linear {
            start_rad: start.heading_rad,
            end_rad: end.heading_rad,
        },
        HeadingMode::Tangential => HeadingInterpolation::Tangential,
        HeadingMode::Constant => HeadingInterpolation::Constant(end.heading_rad),
    };

    let segment_index = pending.segments.len();
    pending.segments.push(PathSegment {
        start,
        end,
        control_points,
        heading,
        reverse: line.end_point.reverse,
    });

    // Companion updating the tracker's path name once this segment starts
    {
        let f = follower.clone();
        let t = tracker.clone();
        let name = line.name.clone();
        pending.companions.push(Box::new(SequentialGroup::new(vec![
            Box::new(WaitUntilCommand::new(move || {
                f.borrow().chain_index() == segment_index
            })),
            Box::new(InstantCommand::new(move || {
                t.borrow_mut().set_current_path_name(&name)
            })),
        ])));
    }

    // One companion per event marker, scheduling the registered command of
    // the marker's name once its position is reached
    for marker in &line.event_markers {
        let f = follower.clone();
        let position = marker.position;
        let marker_name = marker.name.clone();

        pending.companions.push(Box::new(SequentialGroup::new(vec![
            Box::new(WaitUntilCommand::new(move || {
                let f = f.borrow();
                f.chain_index() == segment_index && f.current_t_value() >= position
            })),
            Box::new(InstantCommand::new(move || {
                registry::with(|r| {
                    if r.has(&marker_name) {
                        r.get(&marker_name).schedule();
                    } else {
                        warn!("Event marker references unknown command '{}'", marker_name);
                    }
                })
            })),
        ])));
    }
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Segments and companions accumulated since the last chain break.
struct PendingChain {
    segments: Vec<PathSegment>,
    companions: Vec<Box<dyn Command>>,
}

impl PendingChain {
    fn new() -> Self {
        Self {
            segments: Vec::new(),
            companions: Vec::new(),
        }
    }

    /// Close out the accumulated chain: point the tracker at it, then
    /// follow it under a deadline group carrying the companions.
    fn flush<F: Follower + Subsystem + 'static>(
        &mut self,
        root: &mut Vec<Box<dyn Command>>,
        follower: &Rc<RefCell<F>>,
        tracker: &Rc<RefCell<ProgressTracker<F>>>,
    ) -> Result<(), AutoBuildError> {
        if self.segments.is_empty() {
            return Ok(());
        }

        let chain = PathChain::new(mem::take(&mut self.segments));
        let follow = FollowPathCommand::new(follower.clone(), chain.clone());

        let t = tracker.clone();
        root.push(Box::new(InstantCommand::new(move || {
            t.borrow_mut().set_current_chain(chain.clone())
        })));

        let companions = mem::take(&mut self.companions);
        if companions.is_empty() {
            root.push(Box::new(follow));
        } else {
            root.push(Box::new(ParallelDeadlineGroup::new(
                Box::new(follow),
                companions,
            )?));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use cmd_core::{Adaptable, Scheduler};
    use std::cell::Cell;

    const DOC: &str = r#"{
        "startPoint": { "x": 72.0, "y": 8.0, "startDeg": 90.0 },
        "lines": [
            {
                "id": "l1",
                "name": "To Basket",
                "endPoint": { "x": 72.0, "y": 48.0, "heading": "linear" },
                "eventMarkers": [ { "name": "RaiseArm", "position": 0.5 } ]
            }
        ],
        "sequence": [ { "kind": "path", "lineId": "l1" } ]
    }"#;

    struct FakeFollower {
        starting_pose: Option<Pose>,
        followed: Vec<PathChain>,
        busy: bool,
        chain_index: usize,
        t_value: f64,
    }

    impl FakeFollower {
        fn new() -> Rc<RefCell<Self>> {
            Rc::new(RefCell::new(Self {
                starting_pose: None,
                followed: Vec::new(),
                busy: false,
                chain_index: 0,
                t_value: 0.0,
            }))
        }
    }

    impl Follower for FakeFollower {
        fn follow(&mut self, chain: &PathChain, _max_power: f64, _hold_end: bool) {
            self.followed.push(chain.clone());
            self.busy = true;
        }

        fn is_busy(&self) -> bool {
            self.busy
        }

        fn break_following(&mut self) {
            self.busy = false;
        }

        fn pose(&self) -> Pose {
            Pose::new(0.0, 0.0, 0.0)
        }

        fn set_starting_pose(&mut self, pose: Pose) {
            self.starting_pose = Some(pose);
        }

        fn chain_index(&self) -> usize {
            self.chain_index
        }

        fn current_t_value(&self) -> f64 {
            self.t_value
        }
    }

    impl Subsystem for FakeFollower {
        fn name(&self) -> &str {
            "fake_follower"
        }
    }

    #[test]
    fn test_routine_follows_chain_and_fires_markers() {
        let follower = FakeFollower::new();
        let reader = PathReader::from_json(DOC).unwrap();
        let routine = build_from_reader(&reader, follower.clone()).unwrap();

        // The event marker resolves through the control thread's registry
        let fired = Rc::new(Cell::new(0u32));
        let f = fired.clone();
        registry::with(|r| {
            r.register("RaiseArm", Adaptable::closure(move || f.set(f.get() + 1)))
                .unwrap()
        });

        let scheduler = Scheduler::new();
        scheduler.schedule(&routine);

        // Starting pose is seeded when the routine initialises
        let start = follower.borrow().starting_pose.unwrap();
        assert!((start.x - 8.0).abs() < 1e-9);
        assert!((start.y - 72.0).abs() < 1e-9);

        // Two ticks close the two leading instants and start the follow
        scheduler.tick();
        scheduler.tick();
        assert_eq!(follower.borrow().followed.len(), 1);
        assert_eq!(follower.borrow().followed[0].len(), 1);

        // Passing the marker position schedules the registered command
        follower.borrow_mut().t_value = 0.6;
        scheduler.tick();
        assert_eq!(fired.get(), 1);

        // Marker fires once only
        scheduler.tick();
        assert_eq!(fired.get(), 1);

        // Follower going idle completes the routine
        follower.borrow_mut().busy = false;
        scheduler.tick();
        assert_eq!(scheduler.scheduled_count(), 0);

        registry::with(|r| r.clear());
    }

    #[test]
    fn test_waits_break_the_chain() {
        const TWO_CHAIN_DOC: &str = r#"{
            "startPoint": { "x": 0.0, "y": 0.0, "startDeg": 0.0 },
            "lines": [
                {
                    "name": "First",
                    "endPoint": { "x": 10.0, "y": 0.0, "heading": "tangential" },
                    "waitAfterMs": 5
                },
                {
                    "name": "Second",
                    "endPoint": { "x": 20.0, "y": 0.0, "heading": "tangential" }
                }
            ]
        }"#;

        let follower = FakeFollower::new();
        let reader = PathReader::from_json(TWO_CHAIN_DOC).unwrap();
        let routine = build_from_reader(&reader, follower.clone()).unwrap();

        let scheduler = Scheduler::new();
        scheduler.schedule(&routine);

        // First follow starts after the start-pose and tracker instants
        scheduler.tick();
        scheduler.tick();
        assert_eq!(follower.borrow().followed.len(), 1);

        // Finish the first chain; the wait separates the second follow
        follower.borrow_mut().busy = false;
        scheduler.tick();
        assert_eq!(follower.borrow().followed.len(), 1);

        std::thread::sleep(std::time::Duration::from_millis(10));
        scheduler.tick();
        scheduler.tick();
        assert_eq!(follower.borrow().followed.len(), 2);
    }

    #[test]
    fn test_empty_document_builds_start_pose_only() {
        const EMPTY_DOC: &str =
            r#"{ "startPoint": { "x": 0.0, "y": 0.0, "startDeg": 0.0 }, "lines": [] }"#;

        let follower = FakeFollower::new();
        let reader = PathReader::from_json(EMPTY_DOC).unwrap();
        let routine = build_from_reader(&reader, follower.clone()).unwrap();

        let scheduler = Scheduler::new();
        scheduler.schedule(&routine);
        scheduler.tick();

        assert!(follower.borrow().starting_pose.is_some());
        assert!(follower.borrow().followed.is_empty());
        assert_eq!(scheduler.scheduled_count(), 0);
    }
}
