//! Host process flow tests.


use fixtures::{RecordingEngine, Workspace};
use pioe_host::app;
use pioe_runtime::{Host, HostError, LifecycleState};
use std::time::{Duration, Instant};

async fn serve_briefly(workspace: &mut Workspace) -> (Host, Result<(), HostError>) {
    let mut host = workspace.host();
    let shutdown = host.shutdown_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.request_stop();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        app::serve(&mut host, &workspace.config),
    )
    .await
    .expect("host did not stop");
    (host, result)
}

#[tokio::test]
async fn test_serve_runs_scripts_and_quits() {
    let ruby = RecordingEngine::new("ruby", "rb");
    let lua = RecordingEngine::new("lua", "lua");
    let mut workspace = Workspace::new();
    workspace.engine("ruby", &ruby).engine("lua", &lua);
    workspace.script("main.rb", "puts 1");
    workspace.script("boot.lua", "print(2)");

    let (host, result) = serve_briefly(&mut workspace).await;
    result.unwrap();

    assert_eq!(host.state(), LifecycleState::Stopped);
    assert!(host.engines().iter().all(|engine| engine.is_unloaded()));

    assert!(ruby.saw("frame"));
    // A frame body may still finish after quit; only its ordering is loose.
    let calls: Vec<String> = ruby
        .calls()
        .into_iter()
        .filter(|call| call != "frame")
        .collect();
    assert_eq!(calls, ["load", "init", "script:puts 1", "stop", "unload"]);

    assert!(lua.saw("script:print(2)"));
    assert!(!lua.saw("script:puts 1"));
}

#[tokio::test]
async fn test_serve_skips_unknown_engines() {
    let ruby = RecordingEngine::new("ruby", "rb");
    let mut workspace = Workspace::new();
    workspace.config.engines.load.push("cobol".to_string());
    workspace.engine("ruby", &ruby);

    let (host, result) = serve_briefly(&mut workspace).await;
    result.unwrap();

    assert_eq!(host.engines().len(), 1);
    assert!(ruby.saw("init"));
}

#[tokio::test]
async fn test_serve_skips_unroutable_scripts() {
    let ruby = RecordingEngine::new("ruby", "rb");
    let mut workspace = Workspace::new();
    workspace.engine("ruby", &ruby);
    workspace.script("notes.txt", "not a script");
    workspace.script("main.rb", "puts 1");

    let (_host, result) = serve_briefly(&mut workspace).await;
    result.unwrap();

    assert!(ruby.saw("script:puts 1"));
    assert!(!ruby.saw("script:not a script"));
}

#[tokio::test]
async fn test_serve_without_engines_fails() {
    let mut workspace = Workspace::new();
    workspace.config.engines.load.push("ruby".to_string());

    let mut host = workspace.host();
    let err = app::serve(&mut host, &workspace.config).await.unwrap_err();

    assert!(matches!(err, HostError::NoEngineAvailable));
    assert!(!err.is_fatal());
}

#[test]
fn test_stalled_frame_does_not_block_shutdown() {
    let stuck = RecordingEngine::stalling("stuck", "st");
    let mut workspace = Workspace::new();
    workspace.engine("stuck", &stuck);

    let started = Instant::now();
    let result = app::block_on(async { serve_briefly(&mut workspace).await.1 }).unwrap();
    result.unwrap();

    assert!(stuck.saw("frame"));
    assert!(stuck.saw("unload"));
    assert!(started.elapsed() < app::SHUTDOWN_GRACE + Duration::from_secs(3));
}
