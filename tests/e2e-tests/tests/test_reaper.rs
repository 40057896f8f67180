use std::time::Duration;

use nodevisor_e2e_tests::{init_test_logging, start_ready, StartOptions};
use nodevisor_process::{ReapOutcome, ReaperOptions, StaleProcessReaper, DEFAULT_MARKER};
use nodevisor_process_file::{ProcessFileConfig, ProcessFileManager};

fn manager(dir: &tempfile::TempDir) -> ProcessFileManager {
    ProcessFileManager::new(ProcessFileConfig {
        base_directory: Some(dir.path().to_string_lossy().into_owned()),
        ..Default::default()
    })
}

fn reaper() -> StaleProcessReaper {
    let options = ReaperOptions {
        timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
        ..Default::default()
    };
    StaleProcessReaper::new(options, tracing::info_span!("reaper", test = true))
}

fn marker_env() -> Vec<(String, String)> {
    let (name, value) = DEFAULT_MARKER.split_once('=').unwrap();
    vec![(name.to_string(), value.to_string())]
}

#[tokio::test]
async fn test_reap_managed_child() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);

    let mut child = start_ready(StartOptions {
        env: marker_env(),
        ..Default::default()
    });
    let path = manager.write_pid_file("managed", child.pid()).await.unwrap();

    let outcome = reaper().reap_pid_file(&path).await.unwrap();
    assert_eq!(outcome, ReapOutcome::Terminated);
    assert!(!path.exists());
    assert!(!child.wait().unwrap().success());
}

#[tokio::test]
async fn test_unmanaged_child_survives() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);

    let mut child = start_ready(StartOptions::default());
    let path = manager.write_pid_file("foreign", child.pid()).await.unwrap();

    let outcome = reaper().reap_pid_file(&path).await.unwrap();
    assert_eq!(outcome, ReapOutcome::NotManaged);
    assert!(path.exists());

    child.send_pong().unwrap();
    assert!(child.wait().unwrap().success());
}

#[tokio::test]
async fn test_reap_exited_child() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();
    let manager = manager(&dir);

    let mut child = start_ready(StartOptions {
        env: marker_env(),
        ..Default::default()
    });
    let pid = child.pid();
    child.send_pong().unwrap();
    child.wait().unwrap();

    let path = manager.write_pid_file("exited", pid).await.unwrap();
    let outcome = reaper().reap_pid_file(&path).await.unwrap();

    // A recycled PID would belong to an unmanaged process.
    assert!(
        matches!(outcome, ReapOutcome::NotRunning | ReapOutcome::NotManaged),
        "unexpected outcome: {outcome:?}"
    );
}
