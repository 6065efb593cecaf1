//! Loads the built echo library the way the host does in production.

use pioe_runtime::{Host, HostError, HostOptions, SearchPath};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Directories cargo writes this package's cdylib to: the test binary's
/// `deps/` directory and the profile directory above it.
fn artifact_dirs() -> Vec<PathBuf> {
    let exe = std::env::current_exe().unwrap();
    let deps = exe.parent().unwrap().to_path_buf();
    let profile = deps.parent().unwrap().to_path_buf();
    vec![deps, profile]
}

fn native_host() -> Host {
    Host::new(HostOptions {
        frame_resolution: Duration::from_millis(1),
        search: SearchPath::with_directories(artifact_dirs()),
        handle_interrupts: false,
    })
}

#[tokio::test]
async fn test_echo_library_runs_in_host() {
    let mut host = native_host();

    let descriptor = host.load_engine("echo").unwrap();
    assert_eq!(descriptor.name, "Echo");
    assert_eq!(descriptor.script_language, "echo");
    assert_eq!(descriptor.script_suffix, "echo");
    assert_eq!(descriptor.id, 0);

    host.init().unwrap();

    let temp_dir = TempDir::new().unwrap();
    let script = temp_dir.path().join("hello.echo");
    std::fs::write(&script, "hello-one\n\nhello-two\n").unwrap();
    host.load_script(&script).unwrap();

    host.execute_code("echo", "inline").unwrap();
    assert!(matches!(
        host.execute_code("echo", "   "),
        Err(HostError::Engine { status: 1, .. })
    ));

    for _ in 0..3 {
        host.tick().await.unwrap();
        host.settle().await;
    }

    host.quit().unwrap();
    assert!(host.engines().get(0).unwrap().is_unloaded());
}
