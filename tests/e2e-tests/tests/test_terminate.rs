use std::sync::atomic::{AtomicBool, Ordering};

use nodevisor_e2e_tests::{init_test_logging, start_ready, StartOptions};
use nodevisor_process::ProcHandle;

#[test]
fn test_terminate_then_already_done() {
    init_test_logging();
    let mut child = start_ready(StartOptions::default());

    let handle = ProcHandle::open(child.pid()).unwrap();
    handle.terminate(42).unwrap();

    let status = child.wait().unwrap();
    assert!(!status.success());

    #[cfg(windows)]
    assert_eq!(status.code(), Some(42));

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(libc::SIGKILL));
    }

    let err = handle.terminate(43).unwrap_err();
    assert!(err.is_already_done(), "unexpected error: {err}");
    assert!(handle.is_terminated().unwrap());

    handle.close().unwrap();
}

#[test]
fn test_is_terminated_tracks_exit() {
    init_test_logging();
    let mut child = start_ready(StartOptions::default());

    let handle = ProcHandle::open(child.pid()).unwrap();
    let checked = AtomicBool::new(false);

    std::thread::scope(|s| {
        let poller = s.spawn(|| loop {
            let terminated = handle.is_terminated().unwrap();
            checked.store(true, Ordering::Release);
            if terminated {
                return;
            }
        });

        // Make sure at least one check ran while the child was alive.
        while !checked.load(Ordering::Acquire) {
            std::thread::yield_now();
        }

        child.send_pong().unwrap();
        poller.join().unwrap();
    });

    assert!(child.wait().unwrap().success());
    handle.close().unwrap();
}

#[test]
fn test_natural_exit_code_is_preserved() {
    init_test_logging();
    let mut child = start_ready(StartOptions {
        exit_code: 3,
        ..Default::default()
    });

    let handle = ProcHandle::open(child.pid()).unwrap();
    assert!(!handle.is_terminated().unwrap());

    child.send_pong().unwrap();
    assert_eq!(child.wait().unwrap().code(), Some(3));

    assert!(handle.is_terminated().unwrap());
    assert!(handle.terminate(1).unwrap_err().is_already_done());
    handle.close().unwrap();
}
