use crate::error::DriverError;
use crossbeam_utils::sync::ShardedLock;
use rplidar_data::PointCloud;
use std::sync::Arc;

/// Holds the newest point cloud. Writers replace the whole cloud at once, so
/// readers see either the previous cloud or the new one.
#[derive(Default)]
pub struct CacheSlot {
    latest: ShardedLock<Option<Arc<PointCloud>>>,
}

impl CacheSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, cloud: PointCloud) {
        let cloud = Arc::new(cloud);
        match self.latest.write() {
            Ok(mut latest) => *latest = Some(cloud),
            Err(poisoned) => *poisoned.into_inner() = Some(cloud),
        }
    }

    pub fn latest(&self) -> Result<Arc<PointCloud>, DriverError> {
        let latest = match self.latest.read() {
            Ok(latest) => latest.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        latest.ok_or(DriverError::NotYetAvailable)
    }
}
