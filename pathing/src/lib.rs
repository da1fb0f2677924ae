//! # Pathing
//!
//! The externally-facing half of the command framework: the [`Follower`]
//! capability through which the motion-control primitive is driven, the
//! [`FollowPathCommand`] that adapts it into the command model, progress
//! tracking with named event triggers, the on-disk path-file reader, the
//! auto-routine builder, and the live-view telemetry server.
//!
//! The geometry and control internals of the follower itself are out of
//! scope; everything here talks to it through the narrow [`Follower`] trait.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod auto_builder;
pub mod chain;
pub mod follow_path;
pub mod follower;
pub mod live_view;
pub mod path_file;
pub mod progress;

// ---------------------------------------------------------------------------
// REEXPORTS
// ---------------------------------------------------------------------------

pub use auto_builder::{build_auto, AutoBuildError};
pub use chain::{HeadingInterpolation, PathChain, PathSegment, Pose};
pub use follow_path::{FollowPathCommand, PathCmdError};
pub use follower::Follower;
pub use live_view::{LiveView, PoseCell, LIVE_VIEW_PORT};
pub use path_file::{PathFileError, PathReader};
pub use progress::ProgressTracker;
