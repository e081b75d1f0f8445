//! End-to-end tests: commands whose streams are backed by a pseudo-terminal
//!
//! The pty is shared by every stream attached to it, so anything the child
//! writes to an attached stream is reported as stdout when stdout is
//! attached, and as stderr otherwise.

use std::io::{Read, Write};
use std::time::Duration;

use proctor_process::{CancellationToken, Command, CommandConfig, ErrorKind, ExecResult};

async fn run(config: CommandConfig) -> (ExecResult, proctor_process::Result<()>) {
    let command = Command::new(config);
    command
        .run(&CancellationToken::new())
        .await
        .expect("Failed to start command");
    let (result, outcome) = command.wait().await;
    (result.expect("Started command must produce a result"), outcome)
}

fn sh(script: &str) -> CommandConfig {
    CommandConfig::new("sh").args(["-c", script])
}

#[tokio::test]
async fn test_all_streams_on_pty() {
    let (result, outcome) = run(sh(
        "test -t 0 && test -t 1 && test -t 2 && echo out && echo err >&2",
    )
    .pty(true, true, true))
    .await;

    outcome.unwrap();
    // Terminal line discipline turns "\n" into "\r\n".
    assert_eq!(result.stdout_str(), "out\r\nerr\r\n");
    assert!(result.stderr.is_empty());
}

#[tokio::test]
async fn test_stderr_only_on_pty() {
    let (result, outcome) = run(sh("echo plain; test -t 2 && echo tty >&2").pty(false, false, true)).await;

    outcome.unwrap();
    assert_eq!(result.stdout_str(), "plain\n");
    assert_eq!(result.stderr_str(), "tty\r\n");
}

#[tokio::test]
async fn test_pty_stdin_receives_feed() {
    let (result, outcome) = run(
        sh("test -t 0 && read line && echo \"got:$line\"")
            .pty(true, false, false)
            .feed("hello\n"),
    )
    .await;

    outcome.unwrap();
    assert_eq!(result.stdout_str(), "got:hello\n");
}

#[tokio::test]
async fn test_cat_reads_pty_stdin_to_end() {
    let (result, outcome) = run(
        CommandConfig::new("cat")
            .pty(true, false, false)
            .feed("hello\n")
            .timeout(Duration::from_secs(2)),
    )
    .await;

    outcome.unwrap();
    assert_eq!(result.stdout_str(), "hello\n");
}

#[tokio::test]
async fn test_unterminated_pty_feed_still_ends_input() {
    let (result, outcome) = run(
        CommandConfig::new("cat")
            .pty(true, false, false)
            .feed("one\n")
            .feed("two")
            .timeout(Duration::from_secs(2)),
    )
    .await;

    outcome.unwrap();
    assert_eq!(result.stdout_str(), "one\ntwo");
}

#[tokio::test]
async fn test_pty_stdin_without_feeders_is_at_end() {
    let (result, outcome) = run(
        CommandConfig::new("cat")
            .pty(true, false, false)
            .timeout(Duration::from_secs(2)),
    )
    .await;

    outcome.unwrap();
    assert!(result.stdout.is_empty());
}

#[tokio::test]
async fn test_pty_failure_exit_code_is_reported() {
    let (result, outcome) = run(sh("echo before; exit 7").pty(false, true, false)).await;

    assert!(outcome.unwrap_err().is(ErrorKind::ExecutionFailed));
    assert_eq!(result.exit_code, 7);
    assert_eq!(result.stdout_str(), "before\r\n");
}

#[tokio::test]
async fn test_result_serializes_for_reports() {
    let (result, outcome) = run(CommandConfig::new("echo").args(["json"]).env_blacklist(["*"])).await;

    outcome.unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["exit_code"], 0);
    assert_eq!(json["stdout"], "json\n");
    assert!(json["signal"].is_null());
    assert_eq!(json["environ"], serde_json::json!([]));
}

#[test]
fn test_raw_pair_round_trip() {
    let pair = proctor_pty::open().expect("Failed to allocate pty");
    assert!(pair.slave_path().exists());

    let (mut master, mut slave) = pair.into_files();
    master.write_all(b"ping\n").unwrap();

    let mut buf = [0u8; 16];
    let n = slave.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"ping\n");
}
