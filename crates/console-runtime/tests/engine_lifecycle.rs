//! Engine against scripted stand-in daemons

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use console_core::{ConsoleConfig, Direction, PeerKey, Role};
use console_runtime::{DaemonSupervisor, Engine};

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn test_config(dir: &Path) -> ConsoleConfig {
    ConsoleConfig {
        user_id: Some("tester".to_string()),
        central_socket: dir.join("central.sock"),
        peripheral_socket: dir.join("peripheral.sock"),
        log_dir: dir.join("logs"),
        quit_wait_ms: 100,
        term_wait_ms: 100,
        socket_wait_ms: 200,
        socket_poll_ms: 20,
        control_timeout_ms: 500,
        ..Default::default()
    }
}

async fn wait_for<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_engine_reconstructs_state_from_daemon_logs() {
    let dir = tempfile::tempdir().unwrap();
    let central = write_script(
        dir.path(),
        "fake-central",
        "echo \"StartDiscovery OK\"\n\
         echo \"found dev_A addr=11:22:33:44:55:66\"\n\
         echo \"Device connected: dev_A\"\n\
         echo \"Notifications enabled; ready\"\n\
         sleep 30\n",
    );
    let peripheral = write_script(
        dir.path(),
        "fake-peripheral",
        "echo \"LE advertisement registered successfully\"\nsleep 30\n",
    );
    let config = test_config(dir.path());
    let mut engine = Engine::new(config.clone()).with_supervisors(
        DaemonSupervisor::new(Role::Central, &config).with_binary(&central),
        DaemonSupervisor::new(Role::Peripheral, &config).with_binary(&peripheral),
    );
    engine.start().await.unwrap();

    let state = engine.state();
    wait_for(|| {
        state
            .try_read()
            .map(|s| s.central.ready && s.peripheral.advertising)
            .unwrap_or(false)
    })
    .await;

    let summary = engine.status_summary().await;
    assert!(summary.contains("central: ready"));
    assert!(summary.contains("peripheral: adv"));

    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_engine_stop_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let central = write_script(dir.path(), "fake-central", "sleep 30\n");
    let peripheral = write_script(dir.path(), "fake-peripheral", "sleep 30\n");
    let config = test_config(dir.path());
    let mut engine = Engine::new(config.clone()).with_supervisors(
        DaemonSupervisor::new(Role::Central, &config).with_binary(&central),
        DaemonSupervisor::new(Role::Peripheral, &config).with_binary(&peripheral),
    );
    engine.start().await.unwrap();

    engine.stop().await.unwrap();
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_failed_disconnect_surfaces_a_system_message() {
    let dir = tempfile::tempdir().unwrap();
    // No daemons, so the control socket never listens
    let engine = Engine::new(test_config(dir.path()));

    engine.disconnect().await;

    let snapshot = engine.snapshot().await;
    let conversation = snapshot.directory.get(&PeerKey::Inbox).unwrap();
    let note = conversation.history.last().expect("failure note appended");
    assert_eq!(note.direction, Direction::System);
    assert!(note.text.starts_with("disconnect failed"));
}

#[tokio::test]
async fn test_daemon_exit_resets_role_state() {
    let dir = tempfile::tempdir().unwrap();
    // Central connects and then exits
    let central = write_script(
        dir.path(),
        "fake-central",
        "echo \"found dev_A addr=11:22:33:44:55:66\"\n\
         echo \"Device connected: dev_A\"\n",
    );
    let peripheral = write_script(dir.path(), "fake-peripheral", "sleep 30\n");
    let config = test_config(dir.path());
    let mut engine = Engine::new(config.clone()).with_supervisors(
        DaemonSupervisor::new(Role::Central, &config).with_binary(&central),
        DaemonSupervisor::new(Role::Peripheral, &config).with_binary(&peripheral),
    );
    engine.start().await.unwrap();

    // The script exits after logging; the stream close must force the
    // central machine back to a safe baseline.
    let state = engine.state();
    wait_for(|| {
        state
            .try_read()
            .map(|s| {
                !s.central.connected
                    && s.central.active.is_none()
                    && s.directory.handle_address("dev_A").is_none()
            })
            .unwrap_or(false)
    })
    .await;

    engine.stop().await.unwrap();
}
