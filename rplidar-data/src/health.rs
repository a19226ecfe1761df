#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Health status byte of the GET_HEALTH response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HealthStatus {
    Ok,
    /// The device still works but reported a problem.
    Warning,
    /// The device reported an internal fault and will not scan.
    Error,
    Unknown(u8),
}

impl From<u8> for HealthStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => HealthStatus::Ok,
            1 => HealthStatus::Warning,
            2 => HealthStatus::Error,
            v => HealthStatus::Unknown(v),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceHealth {
    pub status: HealthStatus,
    pub error_code: u16,
}
