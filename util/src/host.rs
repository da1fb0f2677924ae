//! Host platform (linux for example) utility functions

use std::path::PathBuf;

/// Retrieve uname information.
pub fn get_uname() -> std::io::Result<String> {
    Ok(std::env::consts::OS.to_string())
}

/// Get the software root directory from the environment.
pub fn get_sw_root() -> Result<PathBuf, std::env::VarError> {
    match std::env::var("AUTO_CMD_SW_ROOT") {
        Ok(s) => Ok(s.into()),
        Err(e) => Err(e),
    }
}
