//! Capability surface of the vendor SDK.
//!
//! Everything the driver does to the hardware goes through [`LidarSdk`], so
//! the serial implementation can be swapped for a stand-in in tests.

use rplidar_data::{DeviceHealth, DeviceInfo, MeasurementNode};
use std::time::Duration;
use thiserror::Error;

pub(crate) const RESULT_FAIL_BIT: u32 = 0x8000_0000;

/// Failure status of an SDK call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ResultCode {
    #[error("InvalidData")]
    InvalidData,
    #[error("OpFail")]
    OperationFail,
    #[error("OpTimeout")]
    OperationTimeout,
    #[error("OpStop")]
    OperationStop,
    #[error("OpNotSupported")]
    OperationNotSupported,
    #[error("FormatNotSupported")]
    FormatNotSupported,
    #[error("InsufficientMemory")]
    InsufficientMemory,
    #[error("Unknown")]
    Unknown(u32),
}

impl ResultCode {
    /// Interprets a raw SDK status word. Statuses without the fail bit are successes.
    pub fn check(raw: u32) -> Result<(), ResultCode> {
        if raw & RESULT_FAIL_BIT == 0 {
            return Ok(());
        }
        Err(match raw & !RESULT_FAIL_BIT {
            0x8000 => ResultCode::InvalidData,
            0x8001 => ResultCode::OperationFail,
            0x8002 => ResultCode::OperationTimeout,
            0x8003 => ResultCode::OperationStop,
            0x8004 => ResultCode::OperationNotSupported,
            0x8005 => ResultCode::FormatNotSupported,
            0x8006 => ResultCode::InsufficientMemory,
            _ => ResultCode::Unknown(raw),
        })
    }

    pub fn raw(&self) -> u32 {
        match self {
            ResultCode::InvalidData => 0x8000 | RESULT_FAIL_BIT,
            ResultCode::OperationFail => 0x8001 | RESULT_FAIL_BIT,
            ResultCode::OperationTimeout => 0x8002 | RESULT_FAIL_BIT,
            ResultCode::OperationStop => 0x8003 | RESULT_FAIL_BIT,
            ResultCode::OperationNotSupported => 0x8004 | RESULT_FAIL_BIT,
            ResultCode::FormatNotSupported => 0x8005 | RESULT_FAIL_BIT,
            ResultCode::InsufficientMemory => 0x8006 | RESULT_FAIL_BIT,
            ResultCode::Unknown(raw) => *raw,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ResultCode::OperationTimeout)
    }
}

/// Operations the driver needs from the sensor.
///
/// One instance drives one serial connection. Implementations are moved
/// between threads but are never used concurrently.
pub trait LidarSdk: Send {
    fn connect(&mut self, path: &str, baud_rate: u32) -> Result<(), ResultCode>;
    fn get_device_info(&mut self, timeout: Duration) -> Result<DeviceInfo, ResultCode>;
    fn get_health(&mut self, timeout: Duration) -> Result<DeviceHealth, ResultCode>;
    fn start_motor(&mut self) -> Result<(), ResultCode>;
    fn stop_motor(&mut self) -> Result<(), ResultCode>;
    fn start_scan(&mut self) -> Result<(), ResultCode>;
    fn stop_scan(&mut self) -> Result<(), ResultCode>;

    /// Fills `nodes` with one full rotation and returns the number of nodes written.
    fn grab_scan_data(
        &mut self,
        nodes: &mut [MeasurementNode],
        timeout: Duration,
    ) -> Result<usize, ResultCode>;

    /// Sorts the first `count` nodes by angle, giving invalid nodes an estimated angle first.
    fn ascend_scan_data(
        &mut self,
        nodes: &mut [MeasurementNode],
        count: usize,
    ) -> Result<(), ResultCode> {
        let count = count.min(nodes.len());
        ascend_nodes(&mut nodes[..count])
    }

    /// Releases the underlying connection. Called once, as the last call.
    fn dispose(&mut self);
}

/// Builds a fresh, unconnected SDK instance for each connection attempt.
pub trait Connector: Send + Sync {
    fn create(&self) -> Box<dyn LidarSdk>;
}

impl<F> Connector for F
where
    F: Fn() -> Box<dyn LidarSdk> + Send + Sync,
{
    fn create(&self) -> Box<dyn LidarSdk> {
        self()
    }
}

const FULL_CIRCLE_Q14: u32 = 4 << 14;

pub(crate) fn ascend_nodes(nodes: &mut [MeasurementNode]) -> Result<(), ResultCode> {
    let first_valid = nodes
        .iter()
        .position(|n| n.is_valid())
        .ok_or(ResultCode::OperationFail)?;
    let increment = FULL_CIRCLE_Q14 / (nodes.len() as u32);

    let front = nodes[first_valid].angle_z_q14 as u32;
    for (step, node) in nodes[..first_valid].iter_mut().rev().enumerate() {
        let back = increment * (step as u32 + 1);
        node.angle_z_q14 = front.saturating_sub(back) as u16;
    }

    let mut last = front;
    for node in nodes[first_valid + 1..].iter_mut() {
        if !node.is_valid() {
            node.angle_z_q14 = ((last + increment) % FULL_CIRCLE_Q14) as u16;
        }
        last = node.angle_z_q14 as u32;
    }

    nodes.sort_by_key(|n| n.angle_z_q14);
    Ok(())
}
