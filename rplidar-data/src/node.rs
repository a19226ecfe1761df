#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One raw sample of the measurement stream, in the sensor's fixed-point units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MeasurementNode {
    /// Heading angle, 90 degrees = 16384.
    pub angle_z_q14: u16,
    /// Distance in quarter millimetres. Zero marks an invalid sample.
    pub dist_mm_q2: u32,
    pub quality: u8,
    /// Bit 0 is set on the first sample of a new rotation.
    pub flag: u8,
}

impl MeasurementNode {
    pub fn angle_degree(&self) -> f64 {
        (self.angle_z_q14 as f64) * 90. / ((1 << 14) as f64)
    }

    pub fn distance_mm(&self) -> f64 {
        (self.dist_mm_q2 as f64) / 4.
    }

    pub fn is_valid(&self) -> bool {
        self.dist_mm_q2 != 0
    }

    pub fn is_sync(&self) -> bool {
        self.flag & 0x01 == 1
    }
}
