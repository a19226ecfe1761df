use crate::cache::CacheSlot;
use crate::error::DriverError;
use crate::lifecycle::{lock_device, Device};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, trace};

const ERROR_PAUSE: Duration = Duration::from_millis(10);

/// Cancels every [`CancelToken`] created with it when dropped or cancelled.
pub struct CancelHandle {
    tx: Option<Sender<()>>,
}

impl CancelHandle {
    pub fn cancel(&mut self) {
        self.tx.take();
    }
}

#[derive(Clone)]
pub struct CancelToken {
    rx: Receiver<()>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleeps for `duration` unless cancelled first. Returns `true` if cancelled.
    pub fn wait(&self, duration: Duration) -> bool {
        matches!(
            self.rx.recv_timeout(duration),
            Err(RecvTimeoutError::Disconnected)
        )
    }
}

pub fn cancellation() -> (CancelHandle, CancelToken) {
    // nothing is ever sent; closing the channel is the signal
    let (tx, rx) = bounded(0);
    (CancelHandle { tx: Some(tx) }, CancelToken { rx })
}

/// Background thread that keeps the cache filled with the newest scan.
pub struct CacheWorker {
    cancel: CancelHandle,
    thread: Option<JoinHandle<()>>,
}

impl CacheWorker {
    pub fn spawn(
        device: Arc<Mutex<Device>>,
        cache: Arc<CacheSlot>,
        passes: usize,
        cancel: CancelHandle,
        token: CancelToken,
    ) -> Self {
        let thread = Some(std::thread::spawn(move || {
            refresh_cache(&device, &cache, passes, &token);
        }));
        CacheWorker { cancel, thread }
    }

    /// Signals the thread to stop and waits for its current iteration to finish.
    pub fn join(&mut self) -> Result<(), DriverError> {
        self.cancel.cancel();
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| DriverError::WorkerPanicked),
            None => Ok(()),
        }
    }
}

impl Drop for CacheWorker {
    fn drop(&mut self) {
        if let Err(e) = self.join() {
            error!("{e}");
        }
    }
}

pub(crate) fn refresh_cache(
    device: &Mutex<Device>,
    cache: &CacheSlot,
    passes: usize,
    token: &CancelToken,
) {
    debug!("cache worker started");
    while !token.is_cancelled() {
        let result = lock_device(device).scan(passes, token);
        match result {
            Ok(Some(cloud)) => cache.store(cloud),
            Ok(None) => trace!("empty scan, keeping previous point cloud"),
            Err(e) => {
                error!("failed to refresh point cloud: {e}");
                token.wait(ERROR_PAUSE);
            }
        }
    }
    debug!("cache worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{AxisConvention, ScanDecoder};
    use crate::lifecycle::WarmUp;
    use crate::mock::{fill, node, rotation, Call, CallLog, MockLidar};
    use crate::sdk::{LidarSdk, ResultCode};
    use rplidar_data::MeasurementNode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    const TIMEOUT: Duration = Duration::from_millis(1000);

    fn device(mock: impl Fn() -> MockLidar + Send + Sync) -> Arc<Mutex<Device>> {
        let mut device = Device::new(
            ScanDecoder::new(0., AxisConvention::SensorForward, TIMEOUT),
            16,
            WarmUp {
                delay: Duration::ZERO,
                discarded_passes: 0,
            },
        );
        let connector = move || -> Box<dyn LidarSdk> { Box::new(mock()) };
        device.connect("/dev/ttyUSB0", &connector, TIMEOUT).unwrap();
        Arc::new(Mutex::new(device))
    }

    fn wait_for_cloud(cache: &CacheSlot) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while cache.latest().is_err() {
            assert!(Instant::now() < deadline, "cache was never filled");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_cancellation() {
        let (mut handle, token) = cancellation();
        let other = token.clone();
        assert!(!token.is_cancelled());
        assert!(!token.wait(Duration::from_millis(1)));
        handle.cancel();
        assert!(token.is_cancelled());
        assert!(other.is_cancelled());
        assert!(token.wait(Duration::from_secs(60)));
    }

    #[test]
    fn test_worker_fills_cache() {
        let log = CallLog::default();
        let device = {
            let log = log.clone();
            device(move || MockLidar::new(log.clone()))
        };
        let cache = Arc::new(CacheSlot::new());
        let (cancel, token) = cancellation();
        let mut worker = CacheWorker::spawn(device.clone(), cache.clone(), 1, cancel, token);

        wait_for_cloud(&cache);
        worker.join().unwrap();
        assert_eq!(cache.latest().unwrap().len(), 3);

        // no more passes once joined
        let grabs = log.count(Call::Grab);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(log.count(Call::Grab), grabs);
    }

    #[test]
    fn test_worker_survives_failed_passes() {
        let grabs = Arc::new(AtomicUsize::new(0));
        let device = {
            let grabs = grabs.clone();
            device(move || {
                let grabs = grabs.clone();
                let mut mock = MockLidar::new(CallLog::default());
                mock.on_grab = Box::new(move |nodes: &mut [MeasurementNode]| {
                    match grabs.fetch_add(1, Ordering::SeqCst) {
                        0..=2 => Err(ResultCode::OperationTimeout),
                        _ => fill(nodes, &rotation()),
                    }
                });
                mock
            })
        };
        let cache = Arc::new(CacheSlot::new());
        let (cancel, token) = cancellation();
        let mut worker = CacheWorker::spawn(device, cache.clone(), 1, cancel, token);

        wait_for_cloud(&cache);
        worker.join().unwrap();
        assert!(grabs.load(Ordering::SeqCst) >= 4);
    }

    #[test]
    fn test_empty_pass_keeps_previous_cloud() {
        let grabs = Arc::new(AtomicUsize::new(0));
        let device = {
            let grabs = grabs.clone();
            device(move || {
                let grabs = grabs.clone();
                let mut mock = MockLidar::new(CallLog::default());
                mock.on_grab = Box::new(move |nodes: &mut [MeasurementNode]| {
                    match grabs.fetch_add(1, Ordering::SeqCst) {
                        0 => fill(nodes, &rotation()),
                        _ => fill(nodes, &[node(0., 0.)]),
                    }
                });
                mock
            })
        };
        let cache = Arc::new(CacheSlot::new());
        let (cancel, token) = cancellation();
        let mut worker = CacheWorker::spawn(device, cache.clone(), 1, cancel, token);

        wait_for_cloud(&cache);
        while grabs.load(Ordering::SeqCst) < 5 {
            std::thread::sleep(Duration::from_millis(1));
        }
        worker.join().unwrap();
        assert_eq!(cache.latest().unwrap().len(), 3);
    }

    #[test]
    fn test_join_waits_for_in_flight_pass() {
        let entered = Arc::new(AtomicUsize::new(0));
        let device = {
            let entered = entered.clone();
            device(move || {
                let entered = entered.clone();
                let mut mock = MockLidar::new(CallLog::default());
                mock.on_grab = Box::new(move |nodes: &mut [MeasurementNode]| {
                    entered.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(100));
                    fill(nodes, &rotation())
                });
                mock
            })
        };
        let cache = Arc::new(CacheSlot::new());
        let (cancel, token) = cancellation();
        let mut worker = CacheWorker::spawn(device, cache.clone(), 1, cancel, token);

        while entered.load(Ordering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        let start = Instant::now();
        worker.join().unwrap();
        // the pass that was in flight still completes and lands in the cache
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(cache.latest().is_ok());
    }
}
