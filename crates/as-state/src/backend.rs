//! Atomic, lock-protected state file backend (spec §4.2 / §6 "State file format").

use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use as_domain::resource::{StateEntry, StateFile};
use as_domain::{Error, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

/// Companion `.lock` file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    hostname: String,
    created: chrono::DateTime<chrono::Utc>,
}

/// Default age past which an unreadable/unresponsive lock is considered stale.
const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Poll interval while waiting for a held lock to release.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Guard returned by [`StateBackend::lock`]. Dropping it releases the lock.
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = fs::remove_file(&self.path);
    }
}

/// File-backed store for the realized-state map, with an exclusive
/// inter-process lock and corruption recovery via a `.bak` sibling.
pub struct StateBackend {
    path: PathBuf,
    lock_path: PathBuf,
    bak_path: PathBuf,
    stale_threshold: Duration,
    lock_timeout: Duration,
}

impl StateBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = append_ext(&path, "lock");
        let bak_path = append_ext(&path, "bak");
        Self {
            path,
            lock_path,
            bak_path,
            stale_threshold: DEFAULT_STALE_THRESHOLD,
            lock_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_stale_threshold(mut self, d: Duration) -> Self {
        self.stale_threshold = d;
        self
    }

    pub fn with_lock_timeout(mut self, d: Duration) -> Self {
        self.lock_timeout = d;
        self
    }

    /// Read the state file. A missing file is a successful empty load.
    /// On JSON parse failure, falls back to the `.bak` sibling; if that
    /// parses, it is copied back over the primary before being returned.
    pub fn load(&self) -> Result<Vec<StateEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        match self.read_and_parse(&self.path) {
            Ok(sf) => Ok(sf.entries),
            Err(primary_err) => match self.read_and_parse(&self.bak_path) {
                Ok(sf) => {
                    if let Ok(bytes) = fs::read(&self.bak_path) {
                        let _ = fs::write(&self.path, bytes);
                    }
                    Ok(sf.entries)
                }
                Err(bak_err) => Err(Error::StateCorrupted(format!(
                    "{} unreadable ({primary_err}); backup {} also unreadable ({bak_err})",
                    self.path.display(),
                    self.bak_path.display()
                ))),
            },
        }
    }

    fn read_and_parse(&self, path: &Path) -> std::result::Result<StateFile, String> {
        let bytes = fs::read(path).map_err(|e| e.to_string())?;
        serde_json::from_slice(&bytes).map_err(|e| e.to_string())
    }

    /// Write the state file. Entries are sorted by FQN. The write goes
    /// to a randomized temp sibling, is fsynced, the current primary
    /// (if any) is renamed to `.bak` on a best-effort basis, then the
    /// temp file is atomically renamed over the primary. The temp path
    /// never leaks on an error path.
    pub fn save(&self, mut entries: Vec<StateEntry>) -> Result<()> {
        entries.sort_by(|a, b| a.fqn.cmp(&b.fqn));
        let state_file = StateFile::new(entries);
        let body = serde_json::to_string_pretty(&state_file)?;
        let mut body = body;
        body.push('\n');

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = append_ext(&self.path, &format!("tmp-{}", tmp_suffix()));
        let write_result = (|| -> Result<()> {
            let mut f = File::create(&tmp_path)?;
            f.write_all(body.as_bytes())?;
            f.sync_all()?;
            Ok(())
        })();
        if let Err(e) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        if self.path.exists() {
            let _ = fs::rename(&self.path, &self.bak_path);
        }
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(Error::Io(e));
        }
        Ok(())
    }

    /// Acquire the exclusive inter-process lock, breaking it first if
    /// the current holder is dead or the lock file has aged past
    /// `stale_threshold` and the holder can't be confirmed alive.
    pub fn lock(&self) -> Result<LockGuard> {
        if let Some(guard) = self.try_acquire()? {
            return Ok(guard);
        }

        if self.break_if_stale()? {
            if let Some(guard) = self.try_acquire()? {
                return Ok(guard);
            }
        }

        let deadline = Instant::now() + self.lock_timeout;
        loop {
            if Instant::now() >= deadline {
                let info = self.read_lock_info();
                let (holder_pid, holder_host, held_for) = match info {
                    Some(i) => (
                        i.pid,
                        i.hostname,
                        chrono::Utc::now()
                            .signed_duration_since(i.created)
                            .num_seconds(),
                    ),
                    None => (0, "unknown".to_string(), 0),
                };
                return Err(Error::StateLocked(format!(
                    "holder_pid={holder_pid} holder_host={holder_host} held_for={held_for}s"
                )));
            }
            std::thread::sleep(POLL_INTERVAL);
            if let Some(guard) = self.try_acquire()? {
                return Ok(guard);
            }
        }
    }

    fn try_acquire(&self) -> Result<Option<LockGuard>> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                let info = LockInfo {
                    pid: std::process::id(),
                    hostname: hostname(),
                    created: chrono::Utc::now(),
                };
                let body = serde_json::to_string(&info)?;
                let mut f = file;
                f.set_len(0)?;
                f.write_all(body.as_bytes())?;
                f.sync_all()?;
                Ok(Some(LockGuard {
                    file: f,
                    path: self.lock_path.clone(),
                }))
            }
            Err(_) => Ok(None),
        }
    }

    fn read_lock_info(&self) -> Option<LockInfo> {
        let bytes = fs::read(&self.lock_path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Break the lock once if the holder is dead or the file is stale
    /// and the holder cannot be confirmed alive. Returns whether it
    /// broke the lock.
    fn break_if_stale(&self) -> Result<bool> {
        let info = match self.read_lock_info() {
            Some(i) => i,
            None => return Ok(false),
        };

        let holder_dead = !is_process_alive(info.pid) && info.hostname == hostname();
        let age_stale = fs::metadata(&self.lock_path)
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|mtime| mtime.elapsed().ok())
            .map(|age| age > self.stale_threshold)
            .unwrap_or(false);

        if holder_dead || (age_stale && !is_process_alive(info.pid)) {
            let _ = fs::remove_file(&self.lock_path);
            return Ok(true);
        }
        Ok(false)
    }

    /// Copy the primary state file over `.bak` explicitly (CLI surface
    /// convenience; `save` already keeps `.bak` up to date as a side
    /// effect).
    pub fn backup(&self) -> Result<()> {
        if self.path.exists() {
            fs::copy(&self.path, &self.bak_path)?;
        }
        Ok(())
    }

    /// Restore the primary state file from `.bak`.
    pub fn restore(&self) -> Result<()> {
        if !self.bak_path.exists() {
            return Err(Error::StateCorrupted(format!(
                "no backup at {}",
                self.bak_path.display()
            )));
        }
        fs::copy(&self.bak_path, &self.path)?;
        Ok(())
    }
}

fn append_ext(path: &Path, ext: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

fn tmp_suffix() -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}-{}", std::process::id(), now.as_nanos())
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use as_domain::resource::{ContentHash, StateStatus};

    fn entry(fqn: &str) -> StateEntry {
        StateEntry {
            fqn: fqn.to_string(),
            hash: ContentHash("sha256:deadbeef".into()),
            status: StateStatus::Applied,
            adapter: "local_process".into(),
            last_applied: chrono::Utc::now(),
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StateBackend::new(dir.path().join("state.json"));
        assert!(backend.load().unwrap().is_empty());
    }

    #[test]
    fn save_then_load_round_trips_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let backend = StateBackend::new(dir.path().join("state.json"));
        backend
            .save(vec![entry("z/Agent/b"), entry("a/Agent/a")])
            .unwrap();
        let loaded = backend.load().unwrap();
        assert_eq!(loaded[0].fqn, "a/Agent/a");
        assert_eq!(loaded[1].fqn, "z/Agent/b");
    }

    #[test]
    fn save_writes_bak_sibling_on_second_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let backend = StateBackend::new(&path);
        backend.save(vec![entry("a/Agent/a")]).unwrap();
        backend.save(vec![entry("b/Agent/b")]).unwrap();
        assert!(append_ext(&path, "bak").exists());
    }

    #[test]
    fn corrupted_primary_recovers_from_bak() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let backend = StateBackend::new(&path);
        backend.save(vec![entry("a/Agent/a")]).unwrap();
        backend.save(vec![entry("b/Agent/b")]).unwrap();
        fs::write(&path, b"{not valid json").unwrap();

        let loaded = backend.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].fqn, "a/Agent/a");
    }

    #[test]
    fn both_corrupted_reports_state_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let backend = StateBackend::new(&path);
        fs::write(&path, b"{not json").unwrap();
        fs::write(append_ext(&path, "bak"), b"{also not json").unwrap();
        let err = backend.load().unwrap_err();
        assert!(matches!(err, Error::StateCorrupted(_)));
    }

    #[test]
    fn lock_then_second_attempt_blocks_until_released() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let backend = StateBackend::new(&path).with_lock_timeout(Duration::from_millis(200));
        let guard = backend.lock().unwrap();
        let err = backend.lock().unwrap_err();
        assert!(matches!(err, Error::StateLocked(_)));
        drop(guard);
        let _guard2 = backend.lock().unwrap();
    }

    #[test]
    fn stale_lock_from_dead_remote_host_process_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let backend = StateBackend::new(&path).with_stale_threshold(Duration::from_millis(0));
        let stale = LockInfo {
            pid: 999_999_999,
            hostname: "some-other-host".to_string(),
            created: chrono::Utc::now() - chrono::Duration::hours(1),
        };
        fs::write(&backend.lock_path, serde_json::to_string(&stale).unwrap()).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let broke = backend.break_if_stale().unwrap();
        // holder hostname differs, so liveness can't be locally confirmed either way;
        // only the age+liveness branch can fire, and pid 999999999 is not alive.
        assert!(broke);
    }

    #[test]
    fn backup_and_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let backend = StateBackend::new(&path);
        backend.save(vec![entry("a/Agent/a")]).unwrap();
        backend.backup().unwrap();
        backend.save(vec![entry("b/Agent/b")]).unwrap();
        backend.restore().unwrap();
        let loaded = backend.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].fqn, "a/Agent/a");
    }
}
