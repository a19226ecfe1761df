//! One driver process per serial device.
//!
//! Each session drops a marker file `rplidar-<pid>-<device>.lock` into the
//! lock directory. A new session refuses to start while an older process of
//! the same executable still holds the device, and sweeps away markers left
//! behind by processes that are gone.

use crate::error::DriverError;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use sysinfo::{get_current_pid, ProcessesToUpdate, System};
use tracing::{debug, info, warn};

const LOCK_FILE_PREFIX: &str = "rplidar-";
const LOCK_FILE_SUFFIX: &str = ".lock";

/// Source of the running processes that share this executable's name.
pub trait ProcessTable: Send + Sync {
    /// Pids of running processes with this executable's name, this process included.
    fn sibling_pids(&self) -> Vec<u32>;
}

/// [`ProcessTable`] backed by the operating system's process list.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn sibling_pids(&self) -> Vec<u32> {
        let own = std::process::id();
        let current = match get_current_pid() {
            Ok(pid) => pid,
            Err(e) => {
                warn!("cannot determine own pid: {e}");
                return vec![own];
            }
        };

        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        let Some(name) = system.process(current).map(|p| p.name().to_os_string()) else {
            return vec![own];
        };
        let mut pids: Vec<u32> = system
            .processes()
            .iter()
            .filter(|(_, p)| p.thread_kind().is_none() && p.name() == name.as_os_str())
            .map(|(pid, _)| pid.as_u32())
            .collect();
        if !pids.contains(&own) {
            pids.push(own);
        }
        pids
    }
}

pub struct SessionLockManager {
    lock_dir: PathBuf,
    processes: Box<dyn ProcessTable>,
}

impl SessionLockManager {
    pub fn new(lock_dir: impl Into<PathBuf>, processes: Box<dyn ProcessTable>) -> Self {
        SessionLockManager {
            lock_dir: lock_dir.into(),
            processes,
        }
    }

    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    /// Claims `device_path` for this process.
    ///
    /// Every live sibling other than this process counts as another session.
    /// Fails with [`DriverError::Conflict`] if another session, or an earlier
    /// claim made by this process, still holds the same device.
    pub fn acquire(&self, device_path: &str) -> Result<SessionLock, DriverError> {
        let own = std::process::id();
        let mut live = self.processes.sibling_pids();
        live.push(own);
        live.sort_unstable();
        live.dedup();
        let device = sanitize_device_path(device_path);

        fs::create_dir_all(&self.lock_dir)?;
        for entry in fs::read_dir(&self.lock_dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some((pid, locked_device)) = file_name.to_str().and_then(parse_lock_file_name)
            else {
                continue;
            };

            if live.binary_search(&pid).is_ok() {
                if locked_device == device {
                    return Err(DriverError::Conflict {
                        pid,
                        device_path: device_path.to_string(),
                    });
                }
                continue;
            }

            debug!(pid, device = locked_device, "removing stale lock file");
            remove_if_exists(&entry.path())?;
        }

        let path = self.lock_dir.join(lock_file_name(own, device_path));
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(DriverError::Conflict {
                    pid: own,
                    device_path: device_path.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        if let Err(e) = writeln!(file, "{own}") {
            remove_if_exists(&path)?;
            return Err(e.into());
        }
        info!(path = %path.display(), "acquired session lock");
        Ok(SessionLock {
            path,
            released: false,
        })
    }
}

/// Held for the lifetime of a driver session. Dropping it releases the lock.
#[derive(Debug)]
pub struct SessionLock {
    path: PathBuf,
    released: bool,
}

impl SessionLock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the lock file. Later calls, or a file that is already gone, are fine.
    pub fn release(&mut self) -> Result<(), DriverError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        remove_if_exists(&self.path)?;
        debug!(path = %self.path.display(), "released session lock");
        Ok(())
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("{e}");
        }
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        result => result,
    }
}

pub(crate) fn sanitize_device_path(device_path: &str) -> String {
    device_path
        .trim_start_matches('/')
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub(crate) fn lock_file_name(pid: u32, device_path: &str) -> String {
    format!(
        "{LOCK_FILE_PREFIX}{pid}-{}{LOCK_FILE_SUFFIX}",
        sanitize_device_path(device_path)
    )
}

fn parse_lock_file_name(name: &str) -> Option<(u32, &str)> {
    let (pid, device) = name
        .strip_prefix(LOCK_FILE_PREFIX)?
        .strip_suffix(LOCK_FILE_SUFFIX)?
        .split_once('-')?;
    Some((pid.parse().ok()?, device))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FixedProcesses(Vec<u32>);

    impl ProcessTable for FixedProcesses {
        fn sibling_pids(&self) -> Vec<u32> {
            self.0.clone()
        }
    }

    fn manager(dir: &TempDir, pids: &[u32]) -> SessionLockManager {
        SessionLockManager::new(dir.path(), Box::new(FixedProcesses(pids.to_vec())))
    }

    #[test]
    fn test_lock_file_names() {
        assert_eq!(sanitize_device_path("/dev/ttyUSB0"), "dev_ttyUSB0");
        assert_eq!(
            sanitize_device_path("/dev/serial/by-id/usb-Silicon_Labs_CP2102.port0"),
            "dev_serial_by_id_usb_Silicon_Labs_CP2102.port0"
        );
        assert_eq!(
            lock_file_name(1234, "/dev/ttyUSB0"),
            "rplidar-1234-dev_ttyUSB0.lock"
        );
        assert_eq!(
            parse_lock_file_name("rplidar-1234-dev_ttyUSB0.lock"),
            Some((1234, "dev_ttyUSB0"))
        );
        assert_eq!(parse_lock_file_name("rplidar-abc-dev_ttyUSB0.lock"), None);
        assert_eq!(parse_lock_file_name("other-1234-dev_ttyUSB0.lock"), None);
        assert_eq!(parse_lock_file_name("rplidar-1234-dev_ttyUSB0"), None);
    }

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let mut lock = manager(&dir, &[10, 300]).acquire("/dev/ttyUSB0").unwrap();
        let expected = lock_file_name(std::process::id(), "/dev/ttyUSB0");
        assert_eq!(lock.path(), dir.path().join(expected));
        assert_eq!(
            fs::read_to_string(lock.path()).unwrap(),
            format!("{}\n", std::process::id())
        );
        assert!(lock.path().exists());

        lock.release().unwrap();
        assert!(!lock.path().exists());
        lock.release().unwrap();
    }

    #[test]
    fn test_drop_releases() {
        let dir = TempDir::new().unwrap();
        let path = {
            let lock = manager(&dir, &[300]).acquire("/dev/ttyUSB0").unwrap();
            lock.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_release_tolerates_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut lock = manager(&dir, &[300]).acquire("/dev/ttyUSB0").unwrap();
        fs::remove_file(lock.path()).unwrap();
        lock.release().unwrap();
    }

    #[test]
    fn test_stale_lock_is_removed() {
        let dir = TempDir::new().unwrap();
        let stale = dir.path().join("rplidar-42-dev_ttyUSB0.lock");
        fs::write(&stale, "42\n").unwrap();

        let lock = manager(&dir, &[300]).acquire("/dev/ttyUSB0").unwrap();
        assert!(!stale.exists());
        assert!(lock.path().exists());
    }

    #[test]
    fn test_live_session_on_same_device_conflicts() {
        let dir = TempDir::new().unwrap();
        let held = dir.path().join("rplidar-42-dev_ttyUSB0.lock");
        fs::write(&held, "42\n").unwrap();

        let result = manager(&dir, &[300, 42]).acquire("/dev/ttyUSB0");
        match result {
            Err(DriverError::Conflict { pid, device_path }) => {
                assert_eq!(pid, 42);
                assert_eq!(device_path, "/dev/ttyUSB0");
            }
            other => panic!("expected a conflict, got {other:?}"),
        }
        assert!(held.exists());
        let own = lock_file_name(std::process::id(), "/dev/ttyUSB0");
        assert!(!dir.path().join(own).exists());
    }

    #[test]
    fn test_newer_session_on_same_device_conflicts() {
        let dir = TempDir::new().unwrap();
        let newer = std::process::id() + 1;
        let held = dir.path().join(lock_file_name(newer, "/dev/ttyUSB0"));
        fs::write(&held, format!("{newer}\n")).unwrap();

        let result = manager(&dir, &[newer]).acquire("/dev/ttyUSB0");
        assert!(matches!(result, Err(DriverError::Conflict { pid, .. }) if pid == newer));
        assert!(held.exists());
    }

    #[test]
    fn test_second_claim_in_same_process_conflicts() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir, &[]);
        let first = manager.acquire("/dev/ttyUSB0").unwrap();

        let result = manager.acquire("/dev/ttyUSB0");
        assert!(matches!(
            result,
            Err(DriverError::Conflict { pid, .. }) if pid == std::process::id()
        ));
        assert!(first.path().exists());

        // another device is fine
        let second = manager.acquire("/dev/ttyUSB1").unwrap();
        assert!(first.path().exists());
        assert!(second.path().exists());
    }

    #[test]
    fn test_live_session_on_other_device_is_kept() {
        let dir = TempDir::new().unwrap();
        let other = dir.path().join("rplidar-42-dev_ttyUSB1.lock");
        fs::write(&other, "42\n").unwrap();

        let lock = manager(&dir, &[42, 300]).acquire("/dev/ttyUSB0").unwrap();
        assert!(other.exists());
        assert!(lock.path().exists());
    }

    #[test]
    fn test_unrelated_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        let unrelated = dir.path().join("notes.txt");
        fs::write(&unrelated, "").unwrap();

        manager(&dir, &[300]).acquire("/dev/ttyUSB0").unwrap();
        assert!(unrelated.exists());
    }

    #[test]
    fn test_creates_missing_lock_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("locks");
        let manager = SessionLockManager::new(&nested, Box::new(FixedProcesses(vec![300])));
        let lock = manager.acquire("/dev/ttyUSB0").unwrap();
        assert!(lock.path().starts_with(&nested));
    }

    #[test]
    fn test_system_process_table_contains_self() {
        let pids = SystemProcessTable.sibling_pids();
        assert!(pids.contains(&std::process::id()));
    }
}
