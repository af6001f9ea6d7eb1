//! Pattern-loop lifecycle supervision.
//!
//! At most one pattern loop may own a given port at a time. That invariant
//! lives here, not in the transport: every start consults a per-port
//! registration record on disk, and every stop (or supersession) removes
//! it. Records are plain JSON under the user runtime directory and are
//! replaced atomically (temp file + rename), so a crashed writer can never
//! leave a half-written record.
//!
//! Each long-running loop is its own OS process. Foreground starts run the
//! engine in-process and block until Ctrl-C/SIGTERM; `--background` starts
//! re-exec the binary detached into its own process group and return
//! immediately. Stopping an old loop and starting its replacement are two
//! separately observable lifecycle events.

use crate::config::{PatternConfig, SerialConfig};
use crate::engine::PatternEngine;
use crate::error::{LedError, LedResult};
use crate::protocol::Mode;
use crate::transport::SerialTransport;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::sync::watch;

/// How long a superseded loop gets to exit after SIGTERM before SIGKILL.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);
const TERMINATE_POLL: Duration = Duration::from_millis(50);

/// Start policy for [`ProcessSupervisor::start`].
#[derive(Debug, Clone, Copy)]
pub struct StartPolicy {
    /// Detach the loop and return to the caller immediately.
    pub background: bool,
    /// Replace a live owner of the port instead of failing (default true).
    pub kill_existing: bool,
}

impl Default for StartPolicy {
    fn default() -> Self {
        Self {
            background: false,
            kill_existing: true,
        }
    }
}

/// The supervisor's record of a port's current owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunningPattern {
    /// Owned device path.
    pub port: String,
    /// Pid of the loop process.
    pub pid: u32,
    /// When the loop was registered.
    pub started_at: DateTime<Utc>,
}

/// On-disk registry of per-port registration records.
#[derive(Debug, Clone)]
pub struct Registry {
    dir: PathBuf,
}

impl Registry {
    /// Registry in the default runtime-state location
    /// (`$XDG_RUNTIME_DIR/ledctl`, falling back to the temp dir).
    pub fn open_default() -> Self {
        let base = dirs::runtime_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            dir: base.join("ledctl"),
        }
    }

    /// Registry rooted at an explicit directory (used by tests).
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, port: &str) -> PathBuf {
        let slug: String = port
            .trim_start_matches(['/', '\\'])
            .chars()
            .map(|c| if c == '/' || c == '\\' { '-' } else { c })
            .collect();
        self.dir.join(format!("{slug}.json"))
    }

    /// Current record for `port`, if any. An unreadable record is treated
    /// as corrupt, removed, and reported as absent.
    pub fn lookup(&self, port: &str) -> LedResult<Option<RunningPattern>> {
        let path = self.record_path(port);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LedError::Io(e)),
        };
        match serde_json::from_str(&data) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("removing corrupt registration {}: {e}", path.display());
                let _ = std::fs::remove_file(&path);
                Ok(None)
            }
        }
    }

    /// Atomically write `record` as the owner of its port.
    pub fn register(&self, record: &RunningPattern) -> LedResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.record_path(&record.port);
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(record)
            .map_err(|e| LedError::Registry(e.to_string()))?;
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &path)?;
        debug!("registered pid {} for {}", record.pid, record.port);
        Ok(())
    }

    /// Remove the record for `port` if `owner` still holds it. A mismatched
    /// pid means someone else superseded us; their record is left alone.
    pub fn clear(&self, port: &str, owner: u32) -> LedResult<()> {
        match self.lookup(port)? {
            Some(record) if record.pid == owner => {
                std::fs::remove_file(self.record_path(port))?;
                debug!("cleared registration for {port}");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Remove the record for `port` unconditionally.
    fn clear_any(&self, port: &str) -> LedResult<()> {
        match std::fs::remove_file(self.record_path(port)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LedError::Io(e)),
        }
    }
}

/// True if `pid` refers to a live process we may signal.
pub fn pid_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// SIGTERM `pid`, wait out the grace period, SIGKILL a survivor.
fn terminate(pid: u32) -> LedResult<()> {
    let target = Pid::from_raw(pid as i32);
    if kill(target, Signal::SIGTERM).is_err() {
        // Already gone.
        return Ok(());
    }
    let deadline = std::time::Instant::now() + TERMINATE_GRACE;
    while std::time::Instant::now() < deadline {
        if !pid_alive(pid) {
            return Ok(());
        }
        std::thread::sleep(TERMINATE_POLL);
    }
    warn!("pid {pid} ignored SIGTERM, sending SIGKILL");
    let _ = kill(target, Signal::SIGKILL);
    std::thread::sleep(TERMINATE_POLL);
    Ok(())
}

/// Removes our registration when the foreground loop unwinds, on every exit
/// path including errors and signals.
struct RegistrationGuard<'a> {
    registry: &'a Registry,
    port: String,
    pid: u32,
}

impl Drop for RegistrationGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.registry.clear(&self.port, self.pid) {
            warn!("failed to clear registration for {}: {e}", self.port);
        }
    }
}

/// Orchestrates starting, detecting and stopping pattern loops per port.
pub struct ProcessSupervisor {
    registry: Registry,
    // Seam for tests: background starts go through this instead of
    // re-execing the real binary.
    spawner: fn(Mode) -> LedResult<u32>,
}

impl ProcessSupervisor {
    /// Supervisor over the default registry location.
    pub fn new() -> Self {
        Self {
            registry: Registry::open_default(),
            spawner: spawn_detached,
        }
    }

    /// Supervisor over an explicit registry (used by tests).
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            spawner: spawn_detached,
        }
    }

    #[cfg(test)]
    fn with_spawner(registry: Registry, spawner: fn(Mode) -> LedResult<u32>) -> Self {
        Self { registry, spawner }
    }

    /// Start `mode` on the port in `serial`. One-shot modes send their
    /// frame and return without registering. Long-running modes first
    /// enforce the one-owner-per-port invariant per `policy`, then either
    /// detach (`background`) or block until stopped.
    pub async fn start(
        &self,
        mode: Mode,
        pattern: PatternConfig,
        serial: SerialConfig,
        policy: StartPolicy,
    ) -> LedResult<()> {
        pattern.validate()?;
        serial.validate()?;

        if mode.is_one_shot() {
            return self.run_engine(mode, pattern, serial).await;
        }

        let port = serial.port.to_string_lossy().into_owned();
        self.ensure_sole_owner(&port, policy.kill_existing).await?;

        if policy.background {
            let pid = (self.spawner)(mode)?;
            self.registry.register(&RunningPattern {
                port: port.clone(),
                pid,
                started_at: Utc::now(),
            })?;
            info!("started {mode} in background (pid {pid}) on {port}");
            return Ok(());
        }

        let pid = std::process::id();
        self.registry.register(&RunningPattern {
            port: port.clone(),
            pid,
            started_at: Utc::now(),
        })?;
        let _guard = RegistrationGuard {
            registry: &self.registry,
            port,
            pid,
        };
        self.run_engine(mode, pattern, serial).await
    }

    /// Stop the registered owner of `port`. Fails `NoSuchRunning` when no
    /// live loop is registered there; a stale record is cleaned up on the
    /// way out.
    pub async fn stop(&self, port: &str) -> LedResult<()> {
        let registry = self.registry.clone();
        let port = port.to_owned();
        run_blocking(move || stop_blocking(&registry, &port)).await
    }

    /// Enforce the exclusivity invariant for `port` before a start,
    /// offloading the registry I/O and the SIGTERM grace wait from the
    /// runtime worker.
    async fn ensure_sole_owner(&self, port: &str, kill_existing: bool) -> LedResult<()> {
        let registry = self.registry.clone();
        let port = port.to_owned();
        run_blocking(move || sole_owner_blocking(&registry, &port, kill_existing)).await
    }

    /// Open the transport, run the engine, and race it against termination
    /// signals. Cancellation is delivered through the engine's watch
    /// channel so it lands between frames.
    async fn run_engine(
        &self,
        mode: Mode,
        pattern: PatternConfig,
        serial: SerialConfig,
    ) -> LedResult<()> {
        let delay = serial.delay;
        let transport = SerialTransport::open(&serial)?;
        let engine = PatternEngine::new(transport, mode, pattern, delay);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut task = tokio::spawn(engine.run(cancel_rx));

        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        tokio::select! {
            finished = &mut task => {
                return finished.map_err(|e| LedError::Io(std::io::Error::other(e)))?;
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupt received, stopping {mode}");
            }
            _ = sigterm.recv() => {
                debug!("SIGTERM received, stopping {mode}");
            }
        }

        // Signal observed: request a stop and let the engine flush its
        // in-flight frame before unwinding.
        let _ = cancel_tx.send(true);
        task.await.map_err(|e| LedError::Io(std::io::Error::other(e)))?
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a section that may block (registry I/O, SIGTERM grace waits) off the
/// async runtime.
async fn run_blocking<T: Send + 'static>(
    f: impl FnOnce() -> LedResult<T> + Send + 'static,
) -> LedResult<T> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| LedError::Io(std::io::Error::other(e)))?
}

fn stop_blocking(registry: &Registry, port: &str) -> LedResult<()> {
    let Some(record) = registry.lookup(port)? else {
        return Err(LedError::NoSuchRunning { port: port.into() });
    };
    if !pid_alive(record.pid) {
        registry.clear_any(port)?;
        return Err(LedError::NoSuchRunning { port: port.into() });
    }
    info!("stopping pid {} on {port}", record.pid);
    terminate(record.pid)?;
    registry.clear_any(port)?;
    Ok(())
}

/// Our own pre-registered pid (the detached-child case) is not a conflict;
/// a dead owner's record is stale and removed; a live foreign owner is
/// either terminated (`kill_existing`) or a conflict.
fn sole_owner_blocking(registry: &Registry, port: &str, kill_existing: bool) -> LedResult<()> {
    let Some(record) = registry.lookup(port)? else {
        return Ok(());
    };
    if record.pid == std::process::id() {
        return Ok(());
    }
    if !pid_alive(record.pid) {
        debug!("removing stale registration for {port} (pid {})", record.pid);
        return registry.clear_any(port);
    }
    if !kill_existing {
        return Err(LedError::ExistingProcessConflict {
            port: port.into(),
            pid: record.pid,
        });
    }
    info!("superseding pid {} on {port}", record.pid);
    terminate(record.pid)?;
    registry.clear_any(port)
}

/// Arguments for the re-exec'd child: our own argv minus the program name
/// and the detach flags, so the child runs the same command in the
/// foreground.
fn relaunch_args(args: impl Iterator<Item = std::ffi::OsString>) -> Vec<std::ffi::OsString> {
    args.skip(1)
        .filter(|a| a != "--background" && a != "-g")
        .collect()
}

/// Re-exec ourselves detached to run the same command in the foreground of
/// a new process group, logging to a per-mode file under the temp dir.
fn spawn_detached(mode: Mode) -> LedResult<u32> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe()?;
    let args = relaunch_args(std::env::args_os());

    let log_path = std::env::temp_dir().join(format!("ledctl-{mode}.log"));
    let log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    let err_log = log.try_clone()?;

    let child = std::process::Command::new(exe)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(err_log))
        .process_group(0)
        .spawn()?;
    info!("detached loop logging to {}", log_path.display());
    Ok(child.id())
}
