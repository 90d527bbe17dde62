//! Run the check-procs binary against the real process table

use std::process::{Child, Command, Output};

/// A `sleep` nothing else on the box will be running
struct Sleeper(Child);

impl Sleeper {
    fn start(secs: &str) -> Sleeper {
        Sleeper(Command::new("sleep").arg(secs).spawn().unwrap())
    }
}

impl Drop for Sleeper {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn run(args: &[&str]) -> (i32, String) {
    let Output { status, stdout, .. } = Command::new(env!("CARGO_BIN_EXE_check-procs"))
        .args(args)
        .output()
        .unwrap();
    (
        status.code().unwrap(),
        String::from_utf8(stdout).unwrap(),
    )
}

#[test]
fn finds_a_running_process() {
    let _sleeper = Sleeper::start("317.25");
    let (code, out) = run(&["-c", "1:", r"^sleep 317\.25$"]);
    assert_eq!(code, 0, "output: {}", out);
    assert_eq!(
        out.trim_end(),
        r"PROCS OK 1 process matching '^sleep 317\.25$'|procs=1;;1:;0;"
    );
}

#[test]
fn alternation_keeps_a_single_perfdata_separator() {
    let _sleeper = Sleeper::start("318.5");
    let (code, out) = run(&["-c", "1:", r"^(nonexistent-daemon|sleep 318\.5)$"]);
    assert_eq!(code, 0, "output: {}", out);
    assert_eq!(out.matches('|').count(), 1, "output: {}", out);
    assert!(out.trim_end().ends_with("|procs=1;;1:;0;"), "output: {}", out);
}

#[test]
fn missing_process_is_critical() {
    let (code, out) = run(&["-c", "1:", "^no-such-process-anywhere$"]);
    assert_eq!(code, 2, "output: {}", out);
    assert!(out.starts_with("PROCS CRITICAL 0 processes matching"), "output: {}", out);
}

#[test]
fn bad_pattern_is_unknown() {
    let (code, out) = run(&["("]);
    assert_eq!(code, 3, "output: {}", out);
    assert!(out.starts_with("PROCS UNKNOWN invalid process pattern"), "output: {}", out);
}
