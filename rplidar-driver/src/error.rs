use crate::sdk::ResultCode;
use std::fmt;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    /// Every baud rate failed and at least one failure was not a timeout.
    #[error("failed to {stage} on {path:?}: {code}, try checking your defined device_path")]
    Connect {
        path: String,
        stage: &'static str,
        code: ResultCode,
    },
    #[error("timed out connecting to {0:?}")]
    ConnectTimeout(String),
    #[error("failed to get health: {0}")]
    Health(ResultCode),
    #[error("bad health, error code {0:#06X}")]
    BadHealth(u16),
    #[error("bad scan: {0}")]
    Scan(ResultCode),
    #[error("failed to {operation}: {code}")]
    Hardware {
        operation: &'static str,
        code: ResultCode,
    },
    #[error("resource is closed")]
    ResourceClosed,
    #[error("device is not connected")]
    NotConnected,
    #[error("pointcloud has not been saved yet")]
    NotYetAvailable,
    #[error(
        "device {device_path:?} is in use by process {pid}; terminate it manually (e.g. `kill {pid}`) before starting a new session"
    )]
    Conflict { pid: u32, device_path: String },
    #[error("{0}")]
    ConfigValidation(String),
    #[error("range unknown for model {0}")]
    UnknownModel(u8),
    #[error("lock file error: {0}")]
    Lock(#[from] io::Error),
    #[error("background worker panicked")]
    WorkerPanicked,
}

/// Everything that went wrong while closing; every resource was still released.
#[derive(Debug, Error)]
pub struct CloseError {
    pub errors: Vec<DriverError>,
}

impl fmt::Display for CloseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "errors while closing: ")?;
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl CloseError {
    pub(crate) fn from_errors(errors: Vec<DriverError>) -> Result<(), CloseError> {
        if errors.is_empty() {
            return Ok(());
        }
        Err(CloseError { errors })
    }
}
