use std::sync::atomic::{AtomicBool, Ordering};

use nodevisor_e2e_tests::{init_test_logging, start_ready, StartOptions};
use nodevisor_process::ProcHandle;

const TEST_VAR: &str = "__PROCHANDLE_TEST";

fn start_with_marker(value: &str) -> nodevisor_e2e_tests::PingPong {
    start_ready(StartOptions {
        env: vec![(TEST_VAR.to_string(), value.to_string())],
        ..Default::default()
    })
}

#[test]
fn test_environ_contains_child_variable() {
    init_test_logging();
    let child = start_with_marker("test_environ_contains_child_variable");
    let expected = format!("{TEST_VAR}=test_environ_contains_child_variable");

    let handle = ProcHandle::open(child.pid()).unwrap();
    let env = handle.environ().unwrap();
    assert!(env.contains(&expected), "{expected} missing from {env:?}");

    // Every entry is NAME=VALUE with a non-empty name.
    for entry in &env {
        let (name, _) = entry.split_once('=').unwrap();
        assert!(!name.is_empty(), "bad entry {entry:?}");
    }

    handle.close().unwrap();
}

#[test]
fn test_environ_of_own_process() {
    init_test_logging();
    let handle = ProcHandle::open(std::process::id()).unwrap();
    let env = handle.environ().unwrap();
    assert!(!env.is_empty());

    // Cargo launches test binaries with PATH set.
    #[cfg(unix)]
    if let Ok(path) = std::env::var("PATH") {
        assert!(env.contains(&format!("PATH={path}")));
    }

    handle.close().unwrap();
}

/// Children raced against a concurrent `environ` reader.
const RACE_CYCLES: usize = 100;

#[test]
fn test_environ_races_with_exit() {
    init_test_logging();
    let value = "test_environ_races_with_exit";
    let expected = format!("{TEST_VAR}={value}");

    for cycle in 0..RACE_CYCLES {
        let mut child = start_with_marker(value);

        let handle = ProcHandle::open(child.pid()).unwrap();
        assert!(handle.environ().unwrap().contains(&expected));

        let exit = AtomicBool::new(false);

        std::thread::scope(|s| {
            s.spawn(|| {
                while !exit.load(Ordering::Acquire) {
                    std::thread::yield_now();
                }
                child.send_pong().unwrap();
                assert!(child.wait().unwrap().success());
            });

            // Every read either sees the full block or reports the exit.
            loop {
                let result = handle.environ();
                exit.store(true, Ordering::Release);
                match result {
                    Ok(env) => assert!(
                        env.contains(&expected),
                        "cycle {cycle}: torn environment: {env:?}"
                    ),
                    Err(err) => {
                        assert!(err.is_already_done(), "cycle {cycle}: unexpected error: {err}");
                        break;
                    }
                }
            }
        });

        handle.close().unwrap();
    }
}
