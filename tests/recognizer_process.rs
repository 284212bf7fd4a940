//! Behavior of the subprocess driver against real child processes, using
//! /bin/sh stand-ins for the recognition script.

use idverify::config::Config;
use idverify::engine::{EngineError, Recognizer, python::PythonRecognizer};
use std::path::Path;
use std::time::{Duration, Instant};

fn sh_engine(dir: &Path, script_body: &str, timeout_seconds: u64, max_output_bytes: u64) -> Config {
    let script = dir.join("recognize.sh");
    std::fs::write(&script, script_body).expect("write script");
    let mut cfg = Config::default();
    cfg.engine.python_exe = "/bin/sh".into();
    cfg.engine.script = script.display().to_string();
    cfg.engine.timeout_seconds = timeout_seconds;
    cfg.engine.max_output_bytes = max_output_bytes;
    cfg.security.pin_script_dir = false;
    cfg
}

#[test]
fn captures_full_json_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = sh_engine(
        dir.path(),
        "echo '{\"aadhar\":\"123412341234\",\"name\":\"J Doe\"}'\n",
        30,
        1024 * 1024,
    );
    let engine = PythonRecognizer::new(&cfg).unwrap();

    let raw = engine.recognize(Path::new("some/stored/file.png")).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&raw.stdout).unwrap();
    assert_eq!(value["aadhar"], "123412341234");
}

#[test]
fn target_file_is_passed_as_argument() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = sh_engine(dir.path(), "printf '{\"target\":\"%s\"}' \"$1\"\n", 30, 1024 * 1024);
    let engine = PythonRecognizer::new(&cfg).unwrap();

    let raw = engine.recognize(Path::new("uploads/1700000000000-id_card.png")).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&raw.stdout).unwrap();
    assert_eq!(value["target"], "uploads/1700000000000-id_card.png");
}

#[test]
fn times_out_and_kills_the_child() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = sh_engine(dir.path(), "sleep 30\n", 1, 1024 * 1024);
    let engine = PythonRecognizer::new(&cfg).unwrap();

    let started = Instant::now();
    let err = engine.recognize(Path::new("x.png")).unwrap_err();
    assert!(matches!(err, EngineError::Timeout(1)), "{err:?}");
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "timed-out child must not be awaited to natural completion"
    );
}

#[test]
fn oversized_output_fails_instead_of_truncating() {
    let dir = tempfile::tempdir().unwrap();
    let body = "i=0\nwhile [ $i -lt 20000 ]; do echo aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa; i=$((i+1)); done\n";
    let cfg = sh_engine(dir.path(), body, 30, 4096);
    let engine = PythonRecognizer::new(&cfg).unwrap();

    let err = engine.recognize(Path::new("x.png")).unwrap_err();
    assert!(matches!(err, EngineError::OutputTooLarge(4096)), "{err:?}");
}

#[test]
fn non_zero_exit_carries_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = sh_engine(dir.path(), "echo 'no such model' >&2\nexit 3\n", 30, 1024 * 1024);
    let engine = PythonRecognizer::new(&cfg).unwrap();

    let err = engine.recognize(Path::new("x.png")).unwrap_err();
    match err {
        EngineError::NonZeroExit { status, stderr } => {
            assert_eq!(status, 3);
            assert!(stderr.contains("no such model"));
        }
        other => panic!("expected NonZeroExit, got {other:?}"),
    }
}

#[test]
fn stderr_alone_is_not_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = sh_engine(dir.path(), "echo 'warning: low dpi' >&2\necho '{}'\n", 30, 1024 * 1024);
    let engine = PythonRecognizer::new(&cfg).unwrap();

    let raw = engine.recognize(Path::new("x.png")).unwrap();
    assert!(raw.stderr.contains("low dpi"));
}

#[test]
fn missing_executable_is_launch_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = sh_engine(dir.path(), "echo '{}'\n", 30, 1024 * 1024);
    cfg.engine.python_exe = "/nonexistent/idverify-python".into();
    let engine = PythonRecognizer::new(&cfg).unwrap();

    let err = engine.recognize(Path::new("x.png")).unwrap_err();
    assert!(matches!(err, EngineError::LaunchFailed(_)), "{err:?}");
}

#[test]
fn missing_script_fails_construction() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = Config::default();
    cfg.engine.python_exe = "/bin/sh".into();
    cfg.engine.script = dir.path().join("nope.py").display().to_string();
    cfg.security.pin_script_dir = false;

    let err = PythonRecognizer::new(&cfg).unwrap_err();
    assert!(matches!(err, EngineError::LaunchFailed(_)));
}
