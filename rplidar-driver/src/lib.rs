mod cache;
mod config;
mod constants;
mod decoder;
mod error;
mod lifecycle;
mod link;
#[cfg(test)]
mod mock;
mod numeric;
mod packet;
mod sdk;
mod serial;
mod session_lock;
mod time;
mod worker;

use std::sync::{Arc, Mutex};

pub use crate::cache::CacheSlot;
pub use crate::config::Config;
pub use crate::constants::{
    BAUD_RATES, DEFAULT_DEVICE_TIMEOUT, DEFAULT_NODE_CAPACITY, DEFAULT_WARM_UP,
    DEFAULT_WARM_UP_DISCARDED_PASSES, PLACEHOLDER_REFLECTIVITY, USB_PRODUCT_ID, USB_VENDOR_ID,
};
pub use crate::decoder::{AxisConvention, ScanDecoder};
pub use crate::error::{CloseError, DriverError};
pub use crate::lifecycle::{Device, DeviceState, WarmUp};
pub use crate::link::{connect, DeviceHandle};
pub use crate::packet::ProtocolError;
pub use crate::sdk::{Connector, LidarSdk, ResultCode};
pub use crate::serial::SerialLidar;
pub use crate::session_lock::{ProcessTable, SessionLock, SessionLockManager, SystemProcessTable};
pub use crate::worker::{cancellation, CacheWorker, CancelHandle, CancelToken};

use crate::lifecycle::lock_device;
use rplidar_data::{model_profile, DeviceInfo, ModelProfile, PointCloud};
use tracing::{error, info};

/// Rotations decoded per cache refresh.
const PASSES_PER_REFRESH: usize = 1;

/// Width, height and depth in meters of the area the sensor can cover.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub width_m: f64,
    pub height_m: f64,
    pub depth_m: f64,
}

/// A running RPLiDAR session.
///
/// Construction claims the device, connects, starts the motor and launches a
/// background thread that keeps the newest point cloud cached.
/// [`RPLidar::next_point_cloud`] only reads that cache.
pub struct RPLidar {
    device: Arc<Mutex<Device>>,
    cache: Arc<CacheSlot>,
    worker: Option<CacheWorker>,
    token: CancelToken,
    session: Option<SessionLock>,
    device_path: String,
    info: DeviceInfo,
    closed: bool,
}

impl RPLidar {
    /// Opens the sensor described by `config` over its serial port.
    pub fn new(config: &Config) -> Result<Self, DriverError> {
        let timeout = config.device_timeout();
        let connector = move || -> Box<dyn LidarSdk> {
            Box::new(SerialLidar::new().with_response_timeout(timeout))
        };
        Self::with_parts(config, &connector, Box::new(SystemProcessTable))
    }

    pub fn with_parts(
        config: &Config,
        connector: &dyn Connector,
        processes: Box<dyn ProcessTable>,
    ) -> Result<Self, DriverError> {
        config.validate()?;
        let device_path = config.resolve_device_path()?;
        let session = SessionLockManager::new(config.lock_dir(), processes).acquire(&device_path)?;

        let decoder = ScanDecoder::new(
            config.min_range_mm,
            config.axis_convention,
            config.device_timeout(),
        );
        let mut device = Device::new(decoder, config.node_capacity, config.warm_up());
        device.connect(&device_path, connector, config.device_timeout())?;
        device.start()?;
        let info = device.info().copied().unwrap_or_default();

        let device = Arc::new(Mutex::new(device));
        let cache = Arc::new(CacheSlot::new());
        let (cancel, token) = cancellation();
        let worker = CacheWorker::spawn(
            device.clone(),
            cache.clone(),
            PASSES_PER_REFRESH,
            cancel,
            token.clone(),
        );

        info!(device_path = %device_path, "RPLiDAR session started");
        Ok(RPLidar {
            device,
            cache,
            worker: Some(worker),
            token,
            session: Some(session),
            device_path,
            info,
            closed: false,
        })
    }

    /// The most recent cached cloud. Never touches the hardware.
    pub fn next_point_cloud(&self) -> Result<Arc<PointCloud>, DriverError> {
        if self.closed {
            return Err(DriverError::ResourceClosed);
        }
        self.cache.latest()
    }

    /// Scans `passes` rotations directly, bypassing the cache.
    pub fn scan(&self, passes: usize) -> Result<Option<PointCloud>, DriverError> {
        lock_device(&self.device).scan(passes, &self.token)
    }

    pub fn state(&self) -> DeviceState {
        lock_device(&self.device).state()
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    fn profile(&self) -> Option<&'static ModelProfile> {
        model_profile(self.info.model)
    }

    pub fn model_name(&self) -> &'static str {
        self.profile().map_or("unknown", |p| p.name)
    }

    /// Maximum measurable distance in meters.
    pub fn range_m(&self) -> Result<f64, DriverError> {
        self.profile()
            .map(|p| p.range_m)
            .ok_or(DriverError::UnknownModel(self.info.model))
    }

    pub fn bounds(&self) -> Result<Bounds, DriverError> {
        let width_m = self.range_m()? * 2.;
        Ok(Bounds {
            width_m,
            height_m: width_m,
            depth_m: 1.,
        })
    }

    /// Finest angular step in degrees; 1 for unknown models.
    pub fn angular_resolution(&self) -> f64 {
        self.profile().map_or(1., |p| p.angular_resolution_degree)
    }

    /// Stops the background thread, then the device, then releases the session lock.
    ///
    /// Blocks until a scan in flight has finished. Every step is attempted even
    /// when an earlier one fails. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<(), CloseError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut errors = Vec::new();
        if let Some(mut worker) = self.worker.take() {
            if let Err(e) = worker.join() {
                errors.push(e);
            }
        }
        if let Err(e) = lock_device(&self.device).close() {
            errors.extend(e.errors);
        }
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.release() {
                errors.push(e);
            }
        }
        info!(device_path = %self.device_path, "RPLiDAR session closed");
        CloseError::from_errors(errors)
    }
}

impl Drop for RPLidar {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("{e}");
        }
    }
}
