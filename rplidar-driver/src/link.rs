use crate::constants::BAUD_RATES;
use crate::error::DriverError;
use crate::sdk::{Connector, LidarSdk};
use rplidar_data::{DeviceHealth, DeviceInfo, HealthStatus};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A connected, healthy sensor.
///
/// Owns the SDK instance it was created with. The instance is disposed
/// exactly once, either by [`DeviceHandle::dispose`] or when the handle is dropped.
pub struct DeviceHandle {
    sdk: Box<dyn LidarSdk>,
    info: DeviceInfo,
    health: DeviceHealth,
    baud_rate: u32,
}

impl DeviceHandle {
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn health(&self) -> &DeviceHealth {
        &self.health
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub(crate) fn sdk(&mut self) -> &mut dyn LidarSdk {
        self.sdk.as_mut()
    }

    pub fn dispose(self) {
        drop(self);
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("info", &self.info)
            .field("health", &self.health)
            .field("baud_rate", &self.baud_rate)
            .finish_non_exhaustive()
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        debug!(serial = %self.info.serial_number_string(), "disposing device");
        self.sdk.dispose();
    }
}

/// Opens `path`, trying each supported baud rate in turn, and checks that the
/// sensor reports itself healthy.
pub fn connect(
    path: &str,
    connector: &dyn Connector,
    timeout: Duration,
) -> Result<DeviceHandle, DriverError> {
    let mut last_error = None;
    for baud_rate in BAUD_RATES {
        let mut sdk = connector.create();
        let attempt = sdk
            .connect(path, baud_rate)
            .map_err(|code| ("connect", code))
            .and_then(|()| {
                sdk.get_device_info(timeout)
                    .map_err(|code| ("get device info", code))
            });

        match attempt {
            Ok(info) => {
                let handle = DeviceHandle {
                    sdk,
                    info,
                    health: DeviceHealth {
                        status: HealthStatus::Unknown(0xFF),
                        error_code: 0,
                    },
                    baud_rate,
                };
                return check_health(handle, timeout);
            }
            Err((stage, code)) => {
                sdk.dispose();
                if code.is_timeout() {
                    debug!(path, baud_rate, "no answer, trying next baud rate");
                    continue;
                }
                warn!(path, baud_rate, stage, %code, "connection attempt failed");
                last_error = Some(DriverError::Connect {
                    path: path.to_string(),
                    stage,
                    code,
                });
            }
        }
    }
    Err(last_error.unwrap_or_else(|| DriverError::ConnectTimeout(path.to_string())))
}

// Dropping the handle on the error paths disposes the SDK instance.
fn check_health(mut handle: DeviceHandle, timeout: Duration) -> Result<DeviceHandle, DriverError> {
    let health = handle
        .sdk
        .get_health(timeout)
        .map_err(DriverError::Health)?;
    match health.status {
        HealthStatus::Error => return Err(DriverError::BadHealth(health.error_code)),
        HealthStatus::Warning => warn!(error_code = health.error_code, "device health warning"),
        _ => {}
    }
    handle.health = health;

    info!(
        model = handle.info.model,
        firmware = %handle.info.firmware_version_string(),
        hardware = handle.info.hardware_version,
        serial = %handle.info.serial_number_string(),
        baud_rate = handle.baud_rate,
        "connected to RPLiDAR"
    );
    Ok(handle)
}
