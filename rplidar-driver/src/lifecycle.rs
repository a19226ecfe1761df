use crate::decoder::ScanDecoder;
use crate::error::{CloseError, DriverError};
use crate::link::{self, DeviceHandle};
use crate::sdk::Connector;
use crate::worker::CancelToken;
use rplidar_data::{model_profile, DeviceInfo, MeasurementNode, ModelProfile, PointCloud};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceState {
    Disconnected,
    Connected,
    /// Motor spinning and measurements streaming.
    Running,
    Closed,
}

/// First-scan settling: wait `delay`, then throw away `discarded_passes` rotations.
#[derive(Clone, Copy, Debug)]
pub struct WarmUp {
    pub delay: Duration,
    pub discarded_passes: usize,
}

pub struct Device {
    state: DeviceState,
    handle: Option<DeviceHandle>,
    profile: Option<&'static ModelProfile>,
    decoder: ScanDecoder,
    nodes: Vec<MeasurementNode>,
    node_capacity: usize,
    warm_up: WarmUp,
    warmed_up: bool,
}

impl Device {
    pub fn new(decoder: ScanDecoder, node_capacity: usize, warm_up: WarmUp) -> Self {
        Device {
            state: DeviceState::Disconnected,
            handle: None,
            profile: None,
            decoder,
            nodes: Vec::new(),
            node_capacity,
            warm_up,
            warmed_up: false,
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn info(&self) -> Option<&DeviceInfo> {
        self.handle.as_ref().map(|h| h.info())
    }

    /// `None` until connected, or when the model byte is not in the profile table.
    pub fn profile(&self) -> Option<&'static ModelProfile> {
        self.profile
    }

    // Unknown models get motor commands; a motor-less sensor ignores them.
    fn motor_control(&self) -> bool {
        self.profile.map_or(true, |p| p.motor_control)
    }

    pub fn connect(
        &mut self,
        path: &str,
        connector: &dyn Connector,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        match self.state {
            DeviceState::Closed => return Err(DriverError::ResourceClosed),
            DeviceState::Connected | DeviceState::Running => return Ok(()),
            DeviceState::Disconnected => {}
        }
        let handle = link::connect(path, connector, timeout)?;
        self.profile = model_profile(handle.info().model);
        if self.profile.is_none() {
            warn!(model = handle.info().model, "unknown RPLiDAR model");
        }
        self.handle = Some(handle);
        self.state = DeviceState::Connected;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), DriverError> {
        match self.state {
            DeviceState::Closed => return Err(DriverError::ResourceClosed),
            DeviceState::Disconnected => return Err(DriverError::NotConnected),
            DeviceState::Running => return Ok(()),
            DeviceState::Connected => {}
        }
        let motor_control = self.motor_control();
        let handle = self.handle.as_mut().ok_or(DriverError::NotConnected)?;
        if motor_control {
            handle
                .sdk()
                .start_motor()
                .map_err(|code| DriverError::Hardware {
                    operation: "start motor",
                    code,
                })?;
        }
        if let Err(code) = handle.sdk().start_scan() {
            if motor_control {
                if let Err(e) = handle.sdk().stop_motor() {
                    warn!("failed to stop motor after start scan failed: {e}");
                }
            }
            return Err(DriverError::Hardware {
                operation: "start scan",
                code,
            });
        }
        self.nodes = vec![MeasurementNode::default(); self.node_capacity];
        self.state = DeviceState::Running;
        debug!(motor_control, "device started");
        Ok(())
    }

    /// Stops scanning and the motor. Both are attempted even if the first fails.
    pub fn stop(&mut self) -> Result<(), DriverError> {
        match self.state {
            DeviceState::Closed => return Err(DriverError::ResourceClosed),
            DeviceState::Disconnected => return Err(DriverError::NotConnected),
            DeviceState::Connected => return Ok(()),
            DeviceState::Running => {}
        }
        let errors = self.stop_all();
        self.nodes = Vec::new();
        self.state = DeviceState::Connected;
        debug!("device stopped");
        errors.into_iter().next().map_or(Ok(()), Err)
    }

    fn stop_all(&mut self) -> Vec<DriverError> {
        let motor_control = self.motor_control();
        let mut errors = Vec::new();
        let Some(handle) = self.handle.as_mut() else {
            return errors;
        };
        if let Err(code) = handle.sdk().stop_scan() {
            errors.push(DriverError::Hardware {
                operation: "stop scan",
                code,
            });
        }
        if motor_control {
            if let Err(code) = handle.sdk().stop_motor() {
                errors.push(DriverError::Hardware {
                    operation: "stop motor",
                    code,
                });
            }
        }
        errors
    }

    /// Stops the device if it is running and releases the connection.
    /// Calling it again is a no-op.
    pub fn close(&mut self) -> Result<(), CloseError> {
        if self.state == DeviceState::Closed {
            return Ok(());
        }
        let errors = match self.state {
            DeviceState::Running => self.stop_all(),
            _ => Vec::new(),
        };
        for e in &errors {
            warn!("while closing device: {e}");
        }
        self.nodes = Vec::new();
        if let Some(handle) = self.handle.take() {
            handle.dispose();
        }
        self.state = DeviceState::Closed;
        info!("device closed");
        CloseError::from_errors(errors)
    }

    /// Decodes `passes` rotations, starting the device and warming it up first if needed.
    ///
    /// Returns `Ok(None)` when nothing survived decoding, or when `cancel`
    /// fired during the warm-up delay.
    pub fn scan(
        &mut self,
        passes: usize,
        cancel: &CancelToken,
    ) -> Result<Option<PointCloud>, DriverError> {
        match self.state {
            DeviceState::Closed => return Err(DriverError::ResourceClosed),
            DeviceState::Disconnected => return Err(DriverError::NotConnected),
            DeviceState::Connected | DeviceState::Running => {}
        }
        if passes == 0 {
            return Ok(None);
        }
        self.start()?;

        if !self.warmed_up {
            self.warmed_up = true;
            debug!(
                delay_ms = self.warm_up.delay.as_millis() as u64,
                discarded_passes = self.warm_up.discarded_passes,
                "warming up"
            );
            if cancel.wait(self.warm_up.delay) {
                return Ok(None);
            }
            self.decode(self.warm_up.discarded_passes)?;
        }
        self.decode(passes)
    }

    fn decode(&mut self, passes: usize) -> Result<Option<PointCloud>, DriverError> {
        let handle = self.handle.as_mut().ok_or(DriverError::NotConnected)?;
        self.decoder.scan(handle.sdk(), &mut self.nodes, passes)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("{e}");
        }
    }
}

pub(crate) fn lock_device(device: &Mutex<Device>) -> MutexGuard<'_, Device> {
    device.lock().unwrap_or_else(PoisonError::into_inner)
}
