#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identity reported by the GET_INFO request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceInfo {
    pub model: u8,
    /// Major version in the high byte, minor version in the low byte.
    pub firmware_version: u16,
    pub hardware_version: u8,
    pub serial_number: [u8; 16],
}

impl DeviceInfo {
    pub fn firmware_major_version(&self) -> u8 {
        (self.firmware_version >> 8) as u8
    }

    pub fn firmware_minor_version(&self) -> u8 {
        (self.firmware_version & 0xFF) as u8
    }

    /// Firmware version such as `1.29`.
    pub fn firmware_version_string(&self) -> String {
        format!(
            "{}.{:02}",
            self.firmware_major_version(),
            self.firmware_minor_version()
        )
    }

    /// Serial number as 32 upper-case hex digits.
    pub fn serial_number_string(&self) -> String {
        self.serial_number
            .iter()
            .map(|e| format!("{:02X}", e))
            .collect()
    }
}
