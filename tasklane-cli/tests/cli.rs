//! Command-line surface tests. None of these need a running Redis.

use assert_cmd::Command;
use predicates::prelude::*;

fn tasklane() -> Command {
    let mut cmd = Command::cargo_bin("tasklane").unwrap();
    cmd.env_remove("REDIS_URL")
        .env_remove("TASKLANE_TOPIC")
        .arg("--no-color");
    cmd
}

#[test]
fn help_lists_commands() {
    tasklane()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("acquire"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("release"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("show"));
}

#[test]
fn malformed_param_is_rejected_before_connecting() {
    tasklane()
        .args(["create", "--topic", "t", "--param", "novalue"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("expected KEY=VALUE"));
}

#[test]
fn topic_is_required() {
    tasklane()
        .arg("acquire")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--topic"));
}

#[test]
fn unreachable_redis_exits_with_error() {
    tasklane()
        .args([
            "--redis-url",
            "redis://127.0.0.1:1",
            "--timeout",
            "1",
            "status",
            "--topic",
            "t",
        ])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Error:"));
}
