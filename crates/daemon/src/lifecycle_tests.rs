// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

fn test_config(root: &TempDir) -> Config {
    let base = root.path();
    Config {
        runtime_dir: base.join("run"),
        socket_path: base.join("run/emberd.sock"),
        lock_path: base.join("run/emberd.pid"),
        image_path: base.join("run/emberd.image"),
        sessions_dir: base.join("run/sessions"),
        log_path: base.join("state/emberd.log"),
        job_log_dir: base.join("state/logs"),
        conf_dirs: vec![base.join("conf")],
        inherit_env: false,
    }
}

#[tokio::test]
async fn startup_creates_runtime_layout() {
    let root = TempDir::new().unwrap();
    std::fs::create_dir_all(root.path().join("conf")).unwrap();
    std::fs::write(
        root.path().join("conf/web.conf"),
        "start on net-up\nexec serve\n",
    )
    .unwrap();

    let config = test_config(&root);
    let (state, _listener) = startup(&config, None).unwrap();

    assert!(config.socket_path.exists());
    assert!(config.lock_path.exists());
    let pid_text = std::fs::read_to_string(&config.lock_path).unwrap();
    assert_eq!(pid_text.trim(), std::process::id().to_string());

    // Session run-file names our pid and points at the socket
    let session_file = config
        .sessions_dir
        .join(format!("{}.session", std::process::id()));
    let contents = std::fs::read_to_string(&session_file).unwrap();
    assert_eq!(contents.trim(), config.socket_path.display().to_string());

    // Catalog loaded
    assert!(state.engine.lock().catalog().lookup("web").is_some());
    assert!(!state.restored);
}

#[tokio::test]
async fn second_startup_fails_on_lock() {
    let root = TempDir::new().unwrap();
    std::fs::create_dir_all(root.path().join("conf")).unwrap();

    let config = test_config(&root);
    let (_state, _listener) = startup(&config, None).unwrap();

    // Lock acquisition comes before any socket work
    let second = startup(&config, None);
    assert!(matches!(second, Err(LifecycleError::LockFailed(_))));
}

#[tokio::test]
async fn startup_with_missing_image_starts_cold() {
    let root = TempDir::new().unwrap();
    std::fs::create_dir_all(root.path().join("conf")).unwrap();

    let config = test_config(&root);
    let (state, _listener) =
        startup(&config, Some(root.path().join("run/ghost.image"))).unwrap();
    assert!(!state.restored);
}

#[test]
fn prune_dead_sessions_removes_stale_files() {
    let root = TempDir::new().unwrap();
    let dir = root.path();

    // Our own pid is alive; pid 0 of the file below is certainly not
    std::fs::write(
        dir.join(format!("{}.session", std::process::id())),
        "/run/sock\n",
    )
    .unwrap();
    std::fs::write(dir.join("999999999.session"), "/run/stale\n").unwrap();
    std::fs::write(dir.join("garbage.txt"), "ignored").unwrap();

    let live = prune_dead_sessions(dir);
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].0, std::process::id());
    assert!(!dir.join("999999999.session").exists());
    assert!(dir.join("garbage.txt").exists(), "non-session files kept");
}

#[test]
fn log_rotation_shifts_old_files() {
    let root = TempDir::new().unwrap();
    let log = root.path().join("emberd.log");

    // Under the limit: untouched
    std::fs::write(&log, b"small").unwrap();
    rotate_log_if_needed(&log);
    assert!(log.exists());

    // Over the limit: rotated to .1
    std::fs::write(&log, vec![0u8; (MAX_LOG_SIZE + 1) as usize]).unwrap();
    rotate_log_if_needed(&log);
    assert!(!log.exists());
    assert!(root.path().join("emberd.log.1").exists());
}
