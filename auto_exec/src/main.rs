//! Autonomy executive entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, logger and parameters
//!     - Build the routine command tree from the path document
//!     - Main loop:
//!         - Scheduler tick (subsystem periodics, command execution,
//!           deferred mutations, default re-seeding)
//!         - Follower update
//!         - Telemetry publishing
//!         - Cycle management
//!
//! The loop exits when the routine leaves the scheduler's running set.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod sim_follower;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use std::cell::RefCell;
use std::env;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use cmd_core::{registry, scheduler, Adaptable, SubsystemHandle};
use pathing::{build_auto, live_view, Follower, PoseCell};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

use params::AutoExecParams;
use sim_follower::SimFollower;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    // Initialise session
    let session = Session::new("auto_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution
    info!("Autonomy Executive\n");
    info!(
        "Running on: {}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let exec_params: AutoExecParams =
        util::params::load("auto_exec.toml").wrap_err("Could not load exec params")?;

    info!("Exec parameters loaded");

    // ---- RESOLVE PATH DOCUMENT ----

    // An optional single argument overrides the parameter file's path
    // document
    let args: Vec<String> = env::args().collect();
    debug!("CLI arguments: {:?}", args);

    let path_file = match args.len() {
        1 => exec_params.path_file.clone(),
        2 => args[1].clone(),
        _ => {
            return Err(eyre!(
                "Expected either zero or one argument, found {}",
                args.len() - 1
            ))
        }
    };

    info!("Driving path document \"{}\"", path_file);

    // ---- INITIALISE FOLLOWER AND ROUTINE ----

    let follower = Rc::new(RefCell::new(SimFollower::new(exec_params.sim.clone())));
    let follower_handle = SubsystemHandle::of(follower.clone());

    scheduler::with(|s| s.register_subsystem(&follower_handle));

    // Event markers in path documents resolve against the named-command
    // registry; demo documents reference RaiseArm
    registry::with(|r| {
        r.register_with_description(
            "RaiseArm",
            Adaptable::closure(|| info!("RaiseArm event fired")),
            "Demo arm-raise event",
        )
    })
    .wrap_err("Failed to register named commands")?;

    let routine =
        build_auto(&path_file, follower.clone()).wrap_err("Failed to build the auto routine")?;

    info!(
        "Routine built, {} named commands registered",
        registry::with(|r| r.count())
    );

    // ---- INITIALISE TELEMETRY ----

    let pose_cell = PoseCell::new(follower.borrow().pose());

    if exec_params.live_view_enabled {
        let view = live_view::instance();
        view.start().wrap_err("Failed to start the live view")?;
        view.set_pose_cell(&pose_cell);
        info!("Live view initialised");
    }

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    scheduler::with(|s| s.schedule(&routine));

    let cycle_period = Duration::from_secs_f64(exec_params.cycle_period_s);
    let mut num_cycles: u64 = 0;
    let mut num_consec_cycle_overruns: u64 = 0;

    loop {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // ---- SCHEDULER PROCESSING ----

        scheduler::with(|s| s.tick());

        // ---- FOLLOWER UPDATE ----

        follower.borrow_mut().update();

        // ---- TELEMETRY ----

        pose_cell.store(follower.borrow().pose());

        // ---- ROUTINE COMPLETION ----

        if !scheduler::with(|s| s.is_scheduled(&routine)) {
            info!("Routine complete after {} cycles", num_cycles + 1);
            break;
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        match cycle_period.checked_sub(cycle_dur) {
            Some(remaining) => {
                num_consec_cycle_overruns = 0;
                thread::sleep(remaining);
            }
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - cycle_period.as_secs_f64()
                );
                num_consec_cycle_overruns += 1;

                if num_consec_cycle_overruns > 100 {
                    warn!("More than 100 consecutive cycle overruns");
                }
            }
        }

        // Increment cycle counter
        num_cycles += 1;
    }

    // ---- SHUTDOWN ----

    if exec_params.live_view_enabled {
        live_view::instance().disable();
    }

    info!(
        "Final pose: ({:.2}, {:.2}, {:.2} rad)",
        follower.borrow().pose().x,
        follower.borrow().pose().y,
        follower.borrow().pose().heading_rad
    );
    info!("End of execution");

    Ok(())
}
