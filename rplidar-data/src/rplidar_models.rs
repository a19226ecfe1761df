#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Model families, identified by the high nibble of the model byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RplidarModel {
    A1,
    A2,
    A3,
    C1,
    S1,
    S2,
}

/// Static properties of a model family.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelProfile {
    pub model: RplidarModel,
    pub name: &'static str,
    pub max_scan_frequency_hz: f64,
    /// Maximum measurable distance in meters.
    pub range_m: f64,
    /// Finest angular step in degrees.
    pub angular_resolution_degree: f64,
    /// `false` for models that spin on their own and ignore motor commands.
    pub motor_control: bool,
}

const PROFILES: [(u8, ModelProfile); 6] = [
    (
        0x1,
        ModelProfile {
            model: RplidarModel::A1,
            name: "A1",
            max_scan_frequency_hz: 10.,
            range_m: 12.,
            angular_resolution_degree: 0.9,
            motor_control: true,
        },
    ),
    (
        0x2,
        ModelProfile {
            model: RplidarModel::A2,
            name: "A2",
            max_scan_frequency_hz: 15.,
            range_m: 16.,
            angular_resolution_degree: 0.45,
            motor_control: true,
        },
    ),
    (
        0x3,
        ModelProfile {
            model: RplidarModel::A3,
            name: "A3",
            max_scan_frequency_hz: 20.,
            range_m: 25.,
            angular_resolution_degree: 0.3375,
            motor_control: true,
        },
    ),
    (
        0x4,
        ModelProfile {
            model: RplidarModel::C1,
            name: "C1",
            max_scan_frequency_hz: 10.,
            range_m: 12.,
            angular_resolution_degree: 0.72,
            motor_control: false,
        },
    ),
    (
        0x6,
        ModelProfile {
            model: RplidarModel::S1,
            name: "S1",
            max_scan_frequency_hz: 15.,
            range_m: 40.,
            angular_resolution_degree: 0.391,
            motor_control: false,
        },
    ),
    (
        0x7,
        ModelProfile {
            model: RplidarModel::S2,
            name: "S2",
            max_scan_frequency_hz: 15.,
            range_m: 30.,
            angular_resolution_degree: 0.12,
            motor_control: false,
        },
    ),
];

/// Looks up the profile for a model byte reported by GET_INFO.
/// Returns `None` for families this table does not know.
pub fn model_profile(model: u8) -> Option<&'static ModelProfile> {
    PROFILES
        .iter()
        .find(|(family, _)| *family == model >> 4)
        .map(|(_, profile)| profile)
}
