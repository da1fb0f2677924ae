//! Executive parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the autonomy executive.
#[derive(Debug, Clone, Deserialize)]
pub struct AutoExecParams {
    /// Target period of one cycle in seconds.
    pub cycle_period_s: f64,

    /// Path document driven when no file is given on the command line.
    pub path_file: String,

    /// Whether to start the live view telemetry server.
    pub live_view_enabled: bool,

    /// Simulated follower parameters.
    pub sim: SimFollowerParams,
}

/// Parameters for the simulated follower.
#[derive(Debug, Clone, Deserialize)]
pub struct SimFollowerParams {
    /// Distance covered per cycle at full power, in field units.
    pub speed: f64,

    /// Heading change per cycle during a turn, in radians.
    pub turn_rate_rad: f64,
}
