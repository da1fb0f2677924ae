//! # Command core
//!
//! The command-based control framework used by the autonomy executive.
//!
//! Application code composes long-running, interruptible actions (commands)
//! which share a small number of hardware resources (subsystems). The
//! [`Scheduler`] runs the composed commands cooperatively on the control
//! thread, one step per cycle, arbitrating subsystem ownership and
//! re-seeding default commands for idle subsystems.
//!
//! # Architecture
//!
//! - [`command`] - the five-operation lifecycle contract and shared handles.
//! - [`subsystem`] - subsystem identity and requirement sets.
//! - [`leaf`] - instant / run / wait / wait-until leaf commands.
//! - [`group`] - sequential and parallel composition groups.
//! - [`scheduler`] - the cooperative executor.
//! - [`adapter`] - admits foreign objects and closures into the command model.
//! - [`registry`] - the process-wide name to command mapping.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod adapter;
pub mod command;
pub mod group;
pub mod leaf;
pub mod registry;
pub mod scheduler;
pub mod subsystem;

// ---------------------------------------------------------------------------
// REEXPORTS
// ---------------------------------------------------------------------------

pub use adapter::{adapt, Adaptable, ForeignVtable};
pub use command::{Command, CommandHandle};
pub use group::{
    GroupError, ParallelDeadlineGroup, ParallelGroup, ParallelRaceGroup, SequentialGroup,
};
pub use leaf::{InstantCommand, RunCommand, WaitCommand, WaitUntilCommand};
pub use registry::{CommandRegistry, RegistryError};
pub use scheduler::{Fault, LifecyclePhase, Scheduler, SchedulerError};
pub use subsystem::{RequirementSet, Subsystem, SubsystemHandle};
