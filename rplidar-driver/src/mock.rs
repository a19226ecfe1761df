//! Scriptable stand-in for the sensor, used by unit tests.

use crate::sdk::{LidarSdk, ResultCode};
use rplidar_data::{DeviceHealth, DeviceInfo, HealthStatus, MeasurementNode};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Connect(u32),
    DeviceInfo,
    Health,
    StartMotor,
    StopMotor,
    StartScan,
    StopScan,
    Grab,
    Ascend,
    Dispose,
}

#[derive(Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, call: Call) -> usize {
        self.0.lock().unwrap().iter().filter(|c| **c == call).count()
    }
}

type ConnectFn = Box<dyn FnMut(u32) -> Result<(), ResultCode> + Send>;
type DeviceInfoFn = Box<dyn FnMut(u32) -> Result<DeviceInfo, ResultCode> + Send>;
type HealthFn = Box<dyn FnMut() -> Result<DeviceHealth, ResultCode> + Send>;
type GrabFn = Box<dyn FnMut(&mut [MeasurementNode]) -> Result<usize, ResultCode> + Send>;
type CommandFn = Box<dyn FnMut() -> Result<(), ResultCode> + Send>;

pub(crate) struct MockLidar {
    log: CallLog,
    baud_rate: u32,
    pub(crate) on_connect: ConnectFn,
    pub(crate) on_device_info: DeviceInfoFn,
    pub(crate) on_health: HealthFn,
    pub(crate) on_grab: GrabFn,
    pub(crate) on_start_scan: CommandFn,
    pub(crate) on_stop_scan: CommandFn,
}

impl MockLidar {
    /// A healthy A1 answering every grab with `rotation`.
    pub(crate) fn new(log: CallLog) -> Self {
        MockLidar {
            log,
            baud_rate: 0,
            on_connect: Box::new(|_: u32| Ok(())),
            on_device_info: Box::new(|_: u32| Ok(a1_info())),
            on_health: Box::new(|| Ok(healthy())),
            on_grab: Box::new(|nodes: &mut [MeasurementNode]| fill(nodes, &rotation())),
            on_start_scan: Box::new(|| Ok(())),
            on_stop_scan: Box::new(|| Ok(())),
        }
    }

    pub(crate) fn with_info(mut self, info: DeviceInfo) -> Self {
        self.on_device_info = Box::new(move |_: u32| Ok(info));
        self
    }
}

impl LidarSdk for MockLidar {
    fn connect(&mut self, _path: &str, baud_rate: u32) -> Result<(), ResultCode> {
        self.log.push(Call::Connect(baud_rate));
        self.baud_rate = baud_rate;
        (self.on_connect)(baud_rate)
    }

    fn get_device_info(&mut self, _timeout: Duration) -> Result<DeviceInfo, ResultCode> {
        self.log.push(Call::DeviceInfo);
        (self.on_device_info)(self.baud_rate)
    }

    fn get_health(&mut self, _timeout: Duration) -> Result<DeviceHealth, ResultCode> {
        self.log.push(Call::Health);
        (self.on_health)()
    }

    fn start_motor(&mut self) -> Result<(), ResultCode> {
        self.log.push(Call::StartMotor);
        Ok(())
    }

    fn stop_motor(&mut self) -> Result<(), ResultCode> {
        self.log.push(Call::StopMotor);
        Ok(())
    }

    fn start_scan(&mut self) -> Result<(), ResultCode> {
        self.log.push(Call::StartScan);
        (self.on_start_scan)()
    }

    fn stop_scan(&mut self) -> Result<(), ResultCode> {
        self.log.push(Call::StopScan);
        (self.on_stop_scan)()
    }

    fn grab_scan_data(
        &mut self,
        nodes: &mut [MeasurementNode],
        _timeout: Duration,
    ) -> Result<usize, ResultCode> {
        self.log.push(Call::Grab);
        (self.on_grab)(nodes)
    }

    fn ascend_scan_data(
        &mut self,
        nodes: &mut [MeasurementNode],
        count: usize,
    ) -> Result<(), ResultCode> {
        self.log.push(Call::Ascend);
        let count = count.min(nodes.len());
        crate::sdk::ascend_nodes(&mut nodes[..count])
    }

    fn dispose(&mut self) {
        self.log.push(Call::Dispose);
    }
}

pub(crate) fn a1_info() -> DeviceInfo {
    DeviceInfo {
        model: 0x18,
        firmware_version: 0x011D,
        hardware_version: 7,
        serial_number: [0xAB; 16],
    }
}

/// C1 spins on its own; motor commands must not be sent.
pub(crate) fn c1_info() -> DeviceInfo {
    DeviceInfo {
        model: 0x41,
        ..a1_info()
    }
}

pub(crate) fn healthy() -> DeviceHealth {
    DeviceHealth {
        status: HealthStatus::Ok,
        error_code: 0,
    }
}

pub(crate) fn node(angle_degree: f64, distance_mm: f64) -> MeasurementNode {
    MeasurementNode {
        angle_z_q14: (angle_degree * 16384. / 90.).round() as u16,
        dist_mm_q2: (distance_mm * 4.) as u32,
        quality: 47 << 2,
        flag: 0,
    }
}

/// Four readings, one per quadrant, one of them empty.
pub(crate) fn rotation() -> Vec<MeasurementNode> {
    vec![
        node(0., 1000.),
        node(90., 2000.),
        node(180., 0.),
        node(270., 500.),
    ]
}

pub(crate) fn fill(
    nodes: &mut [MeasurementNode],
    rotation: &[MeasurementNode],
) -> Result<usize, ResultCode> {
    let n = rotation.len().min(nodes.len());
    nodes[..n].copy_from_slice(&rotation[..n]);
    Ok(n)
}
