// SPDX-License-Identifier: MIT

use super::*;

#[tokio::test]
async fn captures_output_of_a_quick_command() {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "echo hello"]);
    let output = run_with_timeout(cmd, Duration::from_secs(5), "echo").await.unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
}

#[tokio::test]
async fn reports_timeout_with_the_label() {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "sleep 5"]);
    let err = run_with_timeout(cmd, Duration::from_millis(50), "sleeper").await.unwrap_err();
    match err {
        SubprocessError::Timeout { label, .. } => assert_eq!(label, "sleeper"),
        other => panic!("expected timeout, got {other}"),
    }
}

#[tokio::test]
async fn missing_binary_is_a_spawn_error() {
    let cmd = Command::new("/no/such/binary");
    let err = run_with_timeout(cmd, Duration::from_secs(1), "missing").await.unwrap_err();
    assert!(matches!(err, SubprocessError::Spawn { .. }));
}
