//! Lifecycle and exclusivity properties of the process supervisor, run
//! against a private registry directory and real child processes standing
//! in for pattern loops. No serial hardware is required: ownership checks
//! run before any port is opened.

use chrono::Utc;
use ledctl::supervisor::pid_alive;
use ledctl::{
    LedError, Mode, PatternConfig, ProcessSupervisor, Registry, RunningPattern, SerialConfig,
    StartPolicy,
};

fn sleeper() -> std::process::Child {
    std::process::Command::new("sleep")
        .arg("30")
        .spawn()
        .unwrap()
}

fn register(registry: &Registry, port: &str, pid: u32) {
    registry
        .register(&RunningPattern {
            port: port.into(),
            pid,
            started_at: Utc::now(),
        })
        .unwrap();
}

#[tokio::test]
async fn second_start_with_no_kill_existing_fails_and_leaves_the_owner_alone() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::with_dir(dir.path());
    let supervisor = ProcessSupervisor::with_registry(registry.clone());

    let mut owner = sleeper();
    register(&registry, "/dev/ttyLEDTEST0", owner.id());

    let policy = StartPolicy {
        background: false,
        kill_existing: false,
    };
    let err = supervisor
        .start(
            Mode::Alarm,
            PatternConfig::default(),
            SerialConfig::new("/dev/ttyLEDTEST0"),
            policy,
        )
        .await
        .unwrap_err();

    match err {
        LedError::ExistingProcessConflict { pid, port } => {
            assert_eq!(pid, owner.id());
            assert_eq!(port, "/dev/ttyLEDTEST0");
        }
        other => panic!("expected conflict, got {other}"),
    }
    // The first loop's registration and execution are unaffected.
    assert!(pid_alive(owner.id()));
    assert_eq!(
        registry.lookup("/dev/ttyLEDTEST0").unwrap().unwrap().pid,
        owner.id()
    );

    owner.kill().unwrap();
    owner.wait().unwrap();
}

#[tokio::test]
async fn default_policy_terminates_the_previous_owner_before_starting() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::with_dir(dir.path());
    let supervisor = ProcessSupervisor::with_registry(registry.clone());

    let mut owner = sleeper();
    register(&registry, "/dev/ttyLEDTEST0", owner.id());

    // The port itself does not exist, so the start fails once it reaches
    // the transport, but only after the old owner has been superseded.
    let result = supervisor
        .start(
            Mode::Alarm,
            PatternConfig::default(),
            SerialConfig::new("/dev/ttyLEDTEST0"),
            StartPolicy::default(),
        )
        .await;
    assert!(result.is_err());
    assert!(!matches!(
        result,
        Err(LedError::ExistingProcessConflict { .. })
    ));

    owner.wait().unwrap();
    assert!(!pid_alive(owner.id()));
    // The failed start's own registration was cleared on unwind.
    assert!(registry.lookup("/dev/ttyLEDTEST0").unwrap().is_none());
}

#[tokio::test]
async fn invalid_levels_fail_before_any_ownership_or_io_work() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::with_dir(dir.path());
    let supervisor = ProcessSupervisor::with_registry(registry.clone());

    let mut owner = sleeper();
    register(&registry, "/dev/ttyLEDTEST0", owner.id());

    let config = PatternConfig {
        brightness: 9,
        ..Default::default()
    };
    let err = supervisor
        .start(
            Mode::Alarm,
            config,
            SerialConfig::new("/dev/ttyLEDTEST0"),
            StartPolicy::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedError::InvalidConfig(_)));
    // Config errors must not disturb a running loop.
    assert!(pid_alive(owner.id()));

    owner.kill().unwrap();
    owner.wait().unwrap();
}

#[tokio::test]
async fn stop_distinguishes_live_stale_and_absent_owners() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::with_dir(dir.path());
    let supervisor = ProcessSupervisor::with_registry(registry.clone());

    // Absent.
    assert!(matches!(
        supervisor.stop("/dev/ttyLEDTEST0").await,
        Err(LedError::NoSuchRunning { .. })
    ));

    // Stale: a reaped child's record is cleaned up.
    let mut dead = std::process::Command::new("true").spawn().unwrap();
    let dead_pid = dead.id();
    dead.wait().unwrap();
    register(&registry, "/dev/ttyLEDTEST0", dead_pid);
    assert!(matches!(
        supervisor.stop("/dev/ttyLEDTEST0").await,
        Err(LedError::NoSuchRunning { .. })
    ));
    assert!(registry.lookup("/dev/ttyLEDTEST0").unwrap().is_none());

    // Live: terminated and deregistered.
    let mut owner = sleeper();
    register(&registry, "/dev/ttyLEDTEST0", owner.id());
    supervisor.stop("/dev/ttyLEDTEST0").await.unwrap();
    owner.wait().unwrap();
    assert!(!pid_alive(owner.id()));
    assert!(registry.lookup("/dev/ttyLEDTEST0").unwrap().is_none());
}
