//! End-to-end behavior of the `seqpar-digest` binary.

#![cfg(unix)]

use std::io::Write;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

fn digest_command() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_seqpar-digest"));
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn wait_with_deadline(child: &mut Child, deadline: Duration) -> Option<ExitStatus> {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if let Some(status) = child.try_wait().unwrap() {
            return Some(status);
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    None
}

#[test]
fn test_digest_prints_lines_in_order() {
    let mut child = digest_command()
        .args(["--workers", "4"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();

    let input: String = (0..200).map(|i| format!("line {}\n", i)).collect();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 200);
    for (i, line) in lines.iter().enumerate() {
        let (digest, text) = line.split_once("  ").unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(text, format!("line {}", i));
    }
}

#[test]
fn test_interrupt_exits_while_stdin_open() {
    let mut child = digest_command()
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .spawn()
        .unwrap();

    // Keep the write end open so the reader stays parked on a read.
    let _stdin = child.stdin.take().unwrap();
    std::thread::sleep(Duration::from_secs(1));

    let rc = unsafe { libc::kill(child.id() as i32, libc::SIGINT) };
    assert_eq!(rc, 0);

    let status = wait_with_deadline(&mut child, Duration::from_secs(5));
    let Some(status) = status else {
        let _ = child.kill();
        panic!("seqpar-digest did not exit after SIGINT while stdin was open");
    };
    assert_eq!(status.code(), Some(130));
}
