use crate::constants::PLACEHOLDER_REFLECTIVITY;
use crate::error::DriverError;
use crate::numeric::degree_to_radian;
use crate::sdk::LidarSdk;
use rplidar_data::{MeasurementNode, Point, PointCloud};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};

/// Orientation of the emitted cloud relative to the sensor's own frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisConvention {
    /// X is negated so that it points along the sensor's forward mark.
    #[default]
    SensorForward,
    /// Coordinates exactly as the sensor reports them.
    Raw,
}

/// Turns grabbed rotations into a point cloud.
#[derive(Clone, Debug)]
pub struct ScanDecoder {
    min_range_mm: f64,
    axis_convention: AxisConvention,
    timeout: Duration,
}

impl ScanDecoder {
    pub fn new(min_range_mm: f64, axis_convention: AxisConvention, timeout: Duration) -> Self {
        ScanDecoder {
            min_range_mm,
            axis_convention,
            timeout,
        }
    }

    /// Grabs `passes` rotations into `nodes` and merges them into one cloud.
    ///
    /// Returns `Ok(None)` when `passes` is zero or when no sample survived
    /// filtering. A failed grab aborts the whole scan.
    pub fn scan(
        &self,
        sdk: &mut dyn LidarSdk,
        nodes: &mut [MeasurementNode],
        passes: usize,
    ) -> Result<Option<PointCloud>, DriverError> {
        if passes == 0 {
            return Ok(None);
        }

        let mut cloud = PointCloud::with_capacity(nodes.len());
        let mut dropped = 0;
        for _ in 0..passes {
            let count = sdk
                .grab_scan_data(nodes, self.timeout)
                .map_err(DriverError::Scan)?
                .min(nodes.len());
            if let Err(code) = sdk.ascend_scan_data(nodes, count) {
                trace!(%code, "rotation left unsorted");
            }

            for node in &nodes[..count] {
                match self.point_from_node(node) {
                    Some(point) => cloud.set(point),
                    None => dropped += 1,
                }
            }
        }
        debug!(passes, points = cloud.len(), dropped, "decoded scan");

        if cloud.is_empty() {
            return Ok(None);
        }
        Ok(Some(cloud))
    }

    pub fn point_from_node(&self, node: &MeasurementNode) -> Option<Point> {
        if !node.is_valid() {
            return None;
        }
        let distance_mm = node.distance_mm();
        if distance_mm < self.min_range_mm {
            return None;
        }
        let yaw = degree_to_radian(node.angle_degree());
        Some(point_from(
            yaw,
            distance_mm / 1000.,
            PLACEHOLDER_REFLECTIVITY,
            self.axis_convention,
        ))
    }
}

/// Rotates `(distance, 0, 0)` by `yaw` about Z and returns the result in millimetres.
pub(crate) fn point_from(
    yaw: f64,
    distance_m: f64,
    reflectivity: u8,
    axis_convention: AxisConvention,
) -> Point {
    let x = distance_m * yaw.cos();
    let y = distance_m * yaw.sin();
    let x = match axis_convention {
        AxisConvention::SensorForward => -x,
        AxisConvention::Raw => x,
    };
    let intensity = u16::from(reflectivity) * 255;
    Point::new(x * 1000., y * 1000., 0., intensity)
}
