use crate::constants::{
    DEFAULT_DEVICE_TIMEOUT, DEFAULT_NODE_CAPACITY, DEFAULT_WARM_UP,
    DEFAULT_WARM_UP_DISCARDED_PASSES, USB_PRODUCT_ID, USB_VENDOR_ID,
};
use crate::decoder::AxisConvention;
use crate::error::DriverError;
use crate::lifecycle::WarmUp;
use serde::{Deserialize, Serialize};
use serialport::{available_ports, SerialPortInfo, SerialPortType};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Driver settings. Every field has a default, so `{}` is a valid configuration.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Serial device to open. Found by USB vendor/product id when absent.
    pub device_path: Option<String>,
    /// Samples closer than this are dropped.
    pub min_range_mm: f64,
    pub axis_convention: AxisConvention,
    /// Where session lock files live. Defaults to the system temp directory.
    pub lock_dir: Option<PathBuf>,
    pub warm_up_ms: u64,
    pub warm_up_discarded_passes: usize,
    pub device_timeout_ms: u64,
    /// Size of the buffer one rotation is grabbed into.
    pub node_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_path: None,
            min_range_mm: 0.,
            axis_convention: AxisConvention::default(),
            lock_dir: None,
            warm_up_ms: DEFAULT_WARM_UP.as_millis() as u64,
            warm_up_discarded_passes: DEFAULT_WARM_UP_DISCARDED_PASSES,
            device_timeout_ms: DEFAULT_DEVICE_TIMEOUT.as_millis() as u64,
            node_capacity: DEFAULT_NODE_CAPACITY,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.min_range_mm.is_nan() || self.min_range_mm < 0. {
            return Err(DriverError::ConfigValidation(
                "min_range must be positive".to_string(),
            ));
        }
        if self.node_capacity == 0 {
            return Err(DriverError::ConfigValidation(
                "node_capacity must be positive".to_string(),
            ));
        }
        if self.device_timeout_ms == 0 {
            return Err(DriverError::ConfigValidation(
                "device_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured device path, or the first attached USB device with the
    /// sensor's vendor and product id.
    pub fn resolve_device_path(&self) -> Result<String, DriverError> {
        if let Some(path) = &self.device_path {
            return Ok(path.clone());
        }
        let ports = available_ports().map_err(|e| {
            DriverError::ConfigValidation(format!("failed to enumerate serial ports: {e}"))
        })?;
        let path = find_usb_device(&ports)
            .ok_or_else(|| DriverError::ConfigValidation("no usb devices found".to_string()))?;
        info!(path = %path, "found RPLiDAR by USB id");
        Ok(path)
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.lock_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_millis(self.device_timeout_ms)
    }

    pub fn warm_up(&self) -> WarmUp {
        WarmUp {
            delay: Duration::from_millis(self.warm_up_ms),
            discarded_passes: self.warm_up_discarded_passes,
        }
    }
}

pub(crate) fn find_usb_device(ports: &[SerialPortInfo]) -> Option<String> {
    ports
        .iter()
        .find(|p| match &p.port_type {
            SerialPortType::UsbPort(usb) => usb.vid == USB_VENDOR_ID && usb.pid == USB_PRODUCT_ID,
            _ => false,
        })
        .map(|p| p.port_name.clone())
}
