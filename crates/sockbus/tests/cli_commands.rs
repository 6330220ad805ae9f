#![cfg(all(unix, feature = "cli"))]

use std::io::{BufRead, BufReader};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/sbcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    loop {
        if UnixStream::connect(path).is_ok() {
            return;
        }
        if start.elapsed() >= timeout {
            panic!("socket {} never came up", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn sockbus() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_sockbus"));
    cmd.env_remove("SOCKBUS_PATH")
        .env_remove("SOCKBUS_HOST")
        .env_remove("SOCKBUS_PORT")
        .env_remove("SOCKBUS_CONFIG")
        .arg("--log-level")
        .arg("error");
    cmd
}

fn stop(mut child: Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[test]
fn version_prints_name() {
    let output = sockbus().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("sockbus "));
}

#[test]
fn version_json_reports_wire_constants() {
    let output = sockbus()
        .arg("--format")
        .arg("json")
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    let payload: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("version should emit json");
    assert_eq!(payload["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(payload["default_socket"], "/tmp/ipc.sock");
    assert_eq!(payload["delimiter"], "<<<EOM\\0");
}

#[test]
fn send_without_server_times_out_with_124() {
    let dir = unique_temp_dir("missing");
    let started = Instant::now();
    let output = sockbus()
        .arg("send")
        .arg("hello")
        .arg("--path")
        .arg(dir.join("nobody.sock"))
        .arg("--timeout")
        .arg("300ms")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(124));
    assert!(started.elapsed() >= Duration::from_millis(300));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_waits_for_echo_reply() {
    let dir = unique_temp_dir("echo");
    let sock_path = dir.join("echo.sock");

    let child = sockbus()
        .arg("echo")
        .arg("--path")
        .arg(&sock_path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("echo command should start");
    wait_for_socket(&sock_path, Duration::from_secs(3));

    let output = sockbus()
        .arg("--format")
        .arg("json")
        .arg("send")
        .arg("greet")
        .arg("--path")
        .arg(&sock_path)
        .arg("--json")
        .arg(r#"{"name":"sockbus"}"#)
        .arg("--wait")
        .arg("greet")
        .arg("--wait-timeout")
        .arg("3s")
        .output()
        .expect("send should run");

    stop(child);
    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let reply: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("reply should be json");
    assert_eq!(reply["topic"], "greet");
    assert_eq!(reply["data"]["name"], "sockbus");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn listen_prints_filtered_messages() {
    let dir = unique_temp_dir("listen");
    let sock_path = dir.join("listen.sock");

    let mut child = sockbus()
        .arg("--format")
        .arg("raw")
        .arg("listen")
        .arg("--path")
        .arg(&sock_path)
        .arg("--topic")
        .arg("metrics/*")
        .arg("--count")
        .arg("1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("listen command should start");
    wait_for_socket(&sock_path, Duration::from_secs(3));

    for (topic, data) in [("ignored", "skip me"), ("metrics/cpu", "42")] {
        let status = sockbus()
            .arg("send")
            .arg(topic)
            .arg("--path")
            .arg(&sock_path)
            .arg("--data")
            .arg(data)
            .status()
            .expect("send should run");
        assert!(status.success());
    }

    let stdout = child.stdout.take().expect("stdout is piped");
    let mut line = String::new();
    BufReader::new(stdout)
        .read_line(&mut line)
        .expect("listen should print a line");
    assert_eq!(line.trim_end(), "42");

    let status = child.wait().expect("listen should exit after --count");
    assert!(status.success());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn bad_topic_pattern_is_usage_error() {
    let dir = unique_temp_dir("usage");
    let output = sockbus()
        .arg("listen")
        .arg("--path")
        .arg(dir.join("x.sock"))
        .arg("--topic")
        .arg("a/**/b")
        .output()
        .expect("listen should run");
    assert_eq!(output.status.code(), Some(64));
    let _ = std::fs::remove_dir_all(&dir);
}
