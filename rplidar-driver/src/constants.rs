use std::time::Duration;

pub(crate) const HEADER_SIZE: usize = 7;
pub(crate) const MEASUREMENT_NODE_SIZE: usize = 5;
pub(crate) const LIDAR_CMD_SYNC_BYTE: u8 = 0xA5;
pub(crate) const LIDAR_ANS_SYNC_BYTE: u8 = 0x5A;
pub(crate) const LIDAR_CMD_STOP: u8 = 0x25;
pub(crate) const LIDAR_CMD_SCAN: u8 = 0x20;
pub(crate) const LIDAR_CMD_GET_DEVICE_INFO: u8 = 0x50;
pub(crate) const LIDAR_CMD_GET_DEVICE_HEALTH: u8 = 0x52;
pub(crate) const LIDAR_CMD_SET_MOTOR_PWM: u8 = 0xF0;
pub(crate) const LIDAR_ANS_TYPE_DEVINFO: u8 = 0x4;
pub(crate) const LIDAR_ANS_LENGTH_DEVINFO: u8 = 20;
pub(crate) const LIDAR_ANS_TYPE_DEVHEALTH: u8 = 0x6;
pub(crate) const LIDAR_ANS_LENGTH_DEVHEALTH: u8 = 3;
pub(crate) const LIDAR_ANS_TYPE_MEASUREMENT: u8 = 0x81;
pub(crate) const LIDAR_ANS_LENGTH_MEASUREMENT: u8 = 5;
pub(crate) const DEFAULT_MOTOR_PWM: u16 = 660;

/// Baud rates tried, in order, when connecting.
pub const BAUD_RATES: [u32; 2] = [256000, 115200];
pub const DEFAULT_DEVICE_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_NODE_CAPACITY: usize = 8192;
pub const DEFAULT_WARM_UP: Duration = Duration::from_secs(1);
pub const DEFAULT_WARM_UP_DISCARDED_PASSES: usize = 5;
/// Intensity attached to every point; the scan mode used does not report reflectivity.
pub const PLACEHOLDER_REFLECTIVITY: u8 = 255;
/// CP210x USB-to-UART bridge shipped with the sensors.
pub const USB_VENDOR_ID: u16 = 0x10C4;
pub const USB_PRODUCT_ID: u16 = 0xEA60;
