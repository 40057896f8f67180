use nodevisor_e2e_tests::{init_test_logging, start_ready, StartOptions};
use nodevisor_process::{HandleState, ProcHandle};

#[test]
fn test_close_twice_reports_already_closed() {
    init_test_logging();
    let child = start_ready(StartOptions::default());

    let handle = ProcHandle::open(child.pid()).unwrap();
    assert_eq!(handle.state(), HandleState::Open);

    handle.close().unwrap();
    assert_eq!(handle.state(), HandleState::Closed);

    let err = handle.close().unwrap_err();
    assert!(err.is_already_closed(), "unexpected error: {err}");
}

#[test]
fn test_operations_after_close_fail() {
    init_test_logging();
    let child = start_ready(StartOptions::default());

    let handle = ProcHandle::open(child.pid()).unwrap();
    handle.close().unwrap();

    assert!(handle.is_terminated().unwrap_err().is_already_closed());
    assert!(handle.environ().unwrap_err().is_already_closed());
    assert!(handle.terminate(1).unwrap_err().is_already_closed());
}

#[test]
fn test_open_no_such_process() {
    init_test_logging();
    // Assumes u32::MAX is never a live PID.
    match ProcHandle::open(u32::MAX) {
        Ok(handle) => handle.close().unwrap(),
        Err(err) => assert!(err.is_not_found(), "unexpected error: {err}"),
    }
}

#[test]
fn test_open_exited_and_reaped_process() {
    init_test_logging();
    let mut child = start_ready(StartOptions::default());
    let pid = child.pid();
    child.send_pong().unwrap();
    child.wait().unwrap();

    // The PID may have been handed out again in the meantime.
    if let Err(err) = ProcHandle::open(pid) {
        assert!(err.is_not_found(), "unexpected error: {err}");
    }
}
