//! Open, inspect, terminate and close a child in one pass.

use nodevisor_e2e_tests::{init_test_logging, start_ready, StartOptions};
use nodevisor_process::{HandleState, ProcHandle};

#[test]
fn test_full_handle_scenario() {
    init_test_logging();
    let mut child = start_ready(StartOptions {
        env: vec![("FOO".to_string(), "BAR".to_string())],
        ..Default::default()
    });

    let handle = ProcHandle::open(child.pid()).unwrap();
    assert_eq!(handle.pid(), child.pid());

    assert!(!handle.is_terminated().unwrap());
    assert!(handle.environ().unwrap().contains(&"FOO=BAR".to_string()));

    handle.terminate(7).unwrap();
    let status = child.wait().unwrap();
    #[cfg(windows)]
    assert_eq!(status.code(), Some(7));
    #[cfg(unix)]
    assert_eq!(status.code(), None);

    assert!(handle.is_terminated().unwrap());
    assert!(handle.environ().unwrap_err().is_already_done());
    assert!(handle.terminate(7).unwrap_err().is_already_done());

    handle.close().unwrap();
    assert_eq!(handle.state(), HandleState::Closed);
    assert!(handle.close().unwrap_err().is_already_closed());
}
