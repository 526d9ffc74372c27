//! Host platform utility functions

use std::path::PathBuf;
use thiserror::Error;

/// Errors associated with the host environment.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("The software root environment variable (DEIMOS_SW_ROOT) is not set")]
    SwRootNotSet,
}

/// Get the root directory of the software installation.
///
/// The root is read from the `DEIMOS_SW_ROOT` environment variable, and is
/// the directory containing the `params` and `sessions` directories.
pub fn get_deimos_sw_root() -> Result<PathBuf, HostError> {
    match std::env::var("DEIMOS_SW_ROOT") {
        Ok(p) => Ok(PathBuf::from(p)),
        Err(_) => Err(HostError::SwRootNotSet),
    }
}
