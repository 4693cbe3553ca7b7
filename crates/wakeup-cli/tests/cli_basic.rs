//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary with HOME pointed at a temporary
//! directory so every test gets its own config and database.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_wakeup"))
        .args(args)
        .env("HOME", home)
        .env_remove("WAKEUP_ENV")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_json(home: &Path, args: &[&str]) -> serde_json::Value {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

#[test]
fn test_alarm_add_and_show() {
    let home = tempfile::tempdir().unwrap();
    let added = run_json(
        home.path(),
        &["alarm", "add", "Gym", "--time", "06:45", "--rule", "days:mon,thu", "--enable"],
    );
    assert_eq!(added["id"], 1);
    assert_eq!(added["enabled"], true);
    assert_eq!(added["recurrence"]["kind"], "specify_days");

    let shown = run_json(home.path(), &["alarm", "show", "1"]);
    assert_eq!(shown["title"], "Gym");
    assert_eq!(shown["time_of_day"]["hour"], 6);
}

#[test]
fn test_alarm_set_enable_disable_remove() {
    let home = tempfile::tempdir().unwrap();
    run_json(home.path(), &["alarm", "add", "Work", "--time", "07:00"]);

    let updated = run_json(
        home.path(),
        &["alarm", "set", "1", "--snooze", "volume-ramp-up", "--volume", "40"],
    );
    assert_eq!(updated["snooze"]["mode"], "volume-ramp-up");
    assert_eq!(updated["music_volume"], 40);

    assert_eq!(run_json(home.path(), &["alarm", "enable", "1"])["enabled"], true);
    let enabled = run_json(home.path(), &["alarm", "list", "--enabled"]);
    assert_eq!(enabled.as_array().unwrap().len(), 1);
    assert_eq!(run_json(home.path(), &["alarm", "disable", "1"])["enabled"], false);

    let (_, _, code) = run_cli(home.path(), &["alarm", "remove", "1"]);
    assert_eq!(code, 0);
    let (_, stderr, code) = run_cli(home.path(), &["alarm", "show", "1"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("Alarm 1 not found"), "{stderr}");
}

#[test]
fn test_alarm_rejects_bad_input() {
    let home = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(home.path(), &["alarm", "add", "x", "--time", "25:00"]);
    assert_ne!(code, 0);
    let (_, _, code) = run_cli(home.path(), &["alarm", "add", "x", "--volume", "150"]);
    assert_ne!(code, 0);
    let (_, _, code) = run_cli(home.path(), &["alarm", "add", "x", "--rule", "days:none"]);
    assert_ne!(code, 0);
}

#[test]
fn test_alarm_next() {
    let home = tempfile::tempdir().unwrap();
    let next = run_json(home.path(), &["alarm", "next"]);
    assert!(next.is_null());

    run_json(home.path(), &["alarm", "add", "Daily", "--time", "05:00", "--enable"]);
    let next = run_json(home.path(), &["alarm", "next"]);
    assert_eq!(next["alarm_id"], 1);
    assert!(next["fire_at"].as_str().unwrap().ends_with("05:00:00"));
}

#[test]
fn test_holiday_check() {
    let home = tempfile::tempdir().unwrap();
    let day = run_json(
        home.path(),
        &["holiday", "check", "2024-03-20", "--calendar", "japan"],
    );
    assert_eq!(day["rest_day"], true);
    assert!(day["holiday"].is_string());

    let plain = run_json(home.path(), &["holiday", "check", "2024-03-20"]);
    assert_eq!(plain["rest_day"], false);
}

#[test]
fn test_holiday_list() {
    let home = tempfile::tempdir().unwrap();
    let days = run_json(home.path(), &["holiday", "list", "2024", "--calendar", "japan"]);
    let days = days.as_array().unwrap();
    assert!(days.len() >= 16);
    assert_eq!(days[0]["date"], "2024-01-01");
}

#[test]
fn test_config_get_set_reset() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "calendar.holidays"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "sundays-only");

    let (_, _, code) = run_cli(home.path(), &["config", "set", "calendar.holidays", "japan"]);
    assert_eq!(code, 0);
    let (stdout, _, _) = run_cli(home.path(), &["config", "get", "calendar.holidays"]);
    assert_eq!(stdout.trim(), "japan");

    let (_, _, code) = run_cli(home.path(), &["config", "set", "defaults.nope", "1"]);
    assert_ne!(code, 0);

    let (_, _, code) = run_cli(home.path(), &["config", "reset"]);
    assert_eq!(code, 0);
    let listed = run_json(home.path(), &["config", "list"]);
    assert_eq!(listed["calendar"]["holidays"], "sundays-only");
}

#[test]
fn test_errors_list_empty() {
    let home = tempfile::tempdir().unwrap();
    let errors = run_json(home.path(), &["errors", "list"]);
    assert_eq!(errors.as_array().unwrap().len(), 0);
    let (stdout, _, code) = run_cli(home.path(), &["errors", "clear"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("cleared 0"));
}

/// A `wakeup run` process whose stdout lines arrive over a channel.
struct Daemon {
    child: Child,
    lines: mpsc::Receiver<String>,
}

impl Daemon {
    fn spawn(home: &Path) -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_wakeup"))
            .arg("run")
            .env("HOME", home)
            .env_remove("WAKEUP_ENV")
            .env_remove("RUST_LOG")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("Failed to start daemon");
        let stdout = child.stdout.take().unwrap();
        let (tx, lines) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self { child, lines }
    }

    fn send(&mut self, bytes: &[u8]) {
        let stdin = self.child.stdin.as_mut().unwrap();
        stdin.write_all(bytes).unwrap();
        stdin.flush().unwrap();
    }

    /// Next stdout line containing `needle`, skipping others.
    fn expect_line(&self, needle: &str) -> String {
        loop {
            let line = self
                .lines
                .recv_timeout(Duration::from_secs(15))
                .unwrap_or_else(|_| panic!("daemon never printed {needle}"));
            if line.contains(needle) {
                return line;
            }
        }
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn test_run_skips_unreadable_input() {
    let home = tempfile::tempdir().unwrap();
    let mut daemon = Daemon::spawn(home.path());
    daemon.expect_line("AlarmsIdle");

    daemon.send(b"status\n\xff\xfe\nstatus\n");
    daemon.expect_line(r#""state":"idle""#);
    daemon.expect_line(r#""state":"idle""#);
    assert!(daemon.child.try_wait().unwrap().is_none());
}

#[test]
fn test_run_rearms_after_alarm_edit() {
    let home = tempfile::tempdir().unwrap();
    let daemon = Daemon::spawn(home.path());
    daemon.expect_line("AlarmsIdle");

    run_json(home.path(), &["alarm", "enable", "3"]);
    let armed = daemon.expect_line("AlarmArmed");
    let event: serde_json::Value = serde_json::from_str(&armed).unwrap();
    assert_eq!(event["alarm_id"], 3);
}
