use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("harness.json");
    fs::write(&path, body).expect("Failed to write test config");
    path
}

#[test]
fn test_answers_prompt_and_logs_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"{
            "write_char_delay_us": 1000,
            "program": ["sh", "-c", "printf 'login: '; read name; echo \"hi $name\"; sleep 0.2"],
            "actions": [
                {"type": "match", "value": "login: ", "oneshot": true,
                 "run": [
                    {"type": "add_log_file", "name": "session.log"},
                    {"type": "write", "value": "${user}\n", "needed_args": ["user"]}
                 ]}
            ]
        }"#,
    );

    let mut child = Command::new(env!("CARGO_BIN_EXE_ttyharness"))
        .arg("--config")
        .arg(&config)
        .arg("--arg")
        .arg("user=operator")
        .current_dir(dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to execute ttyharness");

    // Keep our end of stdin open so the session ends when the child exits.
    let stdin = child.stdin.take();
    let output = child.wait_with_output().expect("Failed to wait for ttyharness");
    drop(stdin);

    assert!(
        output.status.success(),
        "ttyharness failed with stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("login: "), "child output is passed through: {stdout:?}");
    assert!(stdout.contains("hi operator"), "typed input reached the child: {stdout:?}");

    let log = fs::read_to_string(dir.path().join("session.log")).unwrap();
    assert!(log.starts_with("login: operator\nhi operator\n"), "got {log:?}");
    assert!(dir.path().join("ttyharness.log").exists());
}

#[test]
fn test_invalid_config_fails_before_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("spawned");
    let config = write_config(
        dir.path(),
        &format!(
            r#"{{"write_char_delay_us": 0, "program": ["touch", "{}"],
                "actions": [{{"type": "match_regex", "value": "(oops"}}]}}"#,
            marker.display()
        ),
    );

    let output = Command::new(env!("CARGO_BIN_EXE_ttyharness"))
        .arg("--config")
        .arg(&config)
        .current_dir(dir.path())
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute ttyharness");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("match_regex"));
    assert!(!marker.exists());
}

#[test]
fn test_arg_without_value_rejected() {
    let output = Command::new(env!("CARGO_BIN_EXE_ttyharness"))
        .args(["--config", "unused.json", "--arg", "novalue"])
        .output()
        .expect("Failed to execute ttyharness");
    assert!(!output.status.success());
}

#[test]
fn test_vtclean_renders_settled_text() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_vtclean"))
        .args(["--rows", "2", "--cols", "40"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("Failed to execute vtclean");

    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"\x1b[1;32mone\x1b[0m\r\ntwi\x08o\r\nthree   \r\nfour\rFOUR")
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "one\ntwo\nthree\nFOUR\n"
    );
}
