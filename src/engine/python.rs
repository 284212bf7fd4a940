use super::{EngineError, Recognizer, types::*};
use crate::config::Config;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Stderr is diagnostic only; anything past this is dropped while draining
/// so a chatty engine cannot balloon memory or deadlock its pipe.
const STDERR_CAP: u64 = 1024 * 1024;

/// Recognition engine driven as a Python subprocess: the script receives the
/// stored file's path as its single argument and prints one JSON document to
/// stdout.
#[derive(Debug)]
pub struct PythonRecognizer {
    python_exe: PathBuf,
    script: PathBuf,
    timeout: Duration,
    max_output_bytes: u64,
    env: BTreeMap<String, String>,
    keep_engine_stderr: bool,
}

impl PythonRecognizer {
    pub fn new(cfg: &Config) -> Result<Self, EngineError> {
        let script = PathBuf::from(&cfg.engine.script);
        if !script.exists() {
            return Err(EngineError::LaunchFailed(format!(
                "missing recognizer script: {}",
                script.display()
            )));
        }
        if cfg.security.pin_script_dir {
            let cwd = std::env::current_dir()?;
            let canon = script.canonicalize()?;
            if !canon.starts_with(&cwd) {
                return Err(EngineError::LaunchFailed(format!(
                    "script is outside cwd while pin_script_dir=true: {}",
                    canon.display()
                )));
            }
        }

        Ok(Self {
            python_exe: expand_tilde(&cfg.engine.python_exe),
            script,
            timeout: Duration::from_secs(cfg.engine.timeout_seconds),
            max_output_bytes: cfg.engine.max_output_bytes,
            env: cfg.engine.env.clone(),
            keep_engine_stderr: cfg.debug.keep_engine_stderr,
        })
    }

    fn run_capture(
        &self,
        mut cmd: Command,
        timeout: Duration,
        stdout_cap: u64,
    ) -> Result<Capture, EngineError> {
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                EngineError::LaunchFailed(format!("{}: {}", self.python_exe.display(), e))
            }
            _ => EngineError::Io(e),
        })?;

        let overflow = Arc::new(AtomicBool::new(false));
        let stdout_thread =
            spawn_capped_reader(child.stdout.take(), stdout_cap, Some(overflow.clone()));
        let stderr_thread = spawn_capped_reader(child.stderr.take(), STDERR_CAP, None);

        loop {
            if overflow.load(Ordering::Relaxed) {
                warn!("engine stdout exceeded cap of {} bytes", stdout_cap);
                reap(&mut child);
                join_reader(stdout_thread)?;
                join_reader(stderr_thread)?;
                return Err(EngineError::OutputTooLarge(stdout_cap));
            }

            if let Some(status) = child.try_wait()? {
                let stdout = join_reader(stdout_thread)?;
                let stderr = join_reader(stderr_thread)?;
                if overflow.load(Ordering::Relaxed) {
                    return Err(EngineError::OutputTooLarge(stdout_cap));
                }
                return Ok(Capture {
                    status,
                    stdout,
                    stderr,
                    duration: start.elapsed(),
                });
            }

            if start.elapsed() > timeout {
                warn!("engine process timed out after {:?}", timeout);
                reap(&mut child);
                join_reader(stdout_thread)?;
                join_reader(stderr_thread)?;
                return Err(EngineError::Timeout(timeout.as_secs()));
            }

            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

impl Recognizer for PythonRecognizer {
    fn doctor(&self) -> Result<EngineDiag, EngineError> {
        let script_present = self.script.exists();

        let mut cmd = Command::new(&self.python_exe);
        cmd.arg("--version");
        let python_version = match self.run_capture(cmd, Duration::from_secs(10), 64 * 1024) {
            Ok(cap) if cap.status.success() => {
                // Older interpreters print the version banner to stderr.
                let raw = if cap.stdout.is_empty() {
                    cap.stderr
                } else {
                    cap.stdout
                };
                Some(String::from_utf8_lossy(&raw).trim().to_string())
            }
            Ok(_) => None,
            Err(EngineError::LaunchFailed(_)) => None,
            Err(e) => return Err(e),
        };

        let ok = script_present && python_version.is_some();
        Ok(EngineDiag {
            python_exe: self.python_exe.display().to_string(),
            python_version,
            script: self.script.display().to_string(),
            script_present,
            ok,
            error: if ok {
                None
            } else {
                Some("python executable or recognizer script unavailable".to_string())
            },
        })
    }

    fn recognize(&self, input: &Path) -> Result<RawRecognition, EngineError> {
        debug!(
            "recognize {} timeout={:?} cap={}",
            input.display(),
            self.timeout,
            self.max_output_bytes
        );

        let mut cmd = Command::new(&self.python_exe);
        cmd.arg(&self.script);
        cmd.arg(input);
        for (k, v) in &self.env {
            cmd.env(k, v);
        }

        let cap = self.run_capture(cmd, self.timeout, self.max_output_bytes)?;
        let stderr = String::from_utf8_lossy(&cap.stderr).trim().to_string();

        if !cap.status.success() {
            return Err(EngineError::NonZeroExit {
                status: cap.status.code().unwrap_or(-1),
                stderr,
            });
        }

        if self.keep_engine_stderr && !stderr.is_empty() {
            debug!("engine stderr: {}", stderr);
        }

        Ok(RawRecognition {
            stdout: cap.stdout,
            stderr,
            duration_ms: cap.duration.as_millis() as u64,
        })
    }
}

struct Capture {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    duration: Duration,
}

/// Drain a child pipe on its own thread so the child can never deadlock on a
/// full buffer. With an overflow flag, reading stops once the cap is hit and
/// the parent loop kills the child; without one, excess bytes are discarded
/// but the pipe keeps draining.
fn spawn_capped_reader<R: Read + Send + 'static>(
    reader: Option<R>,
    cap: u64,
    overflow: Option<Arc<AtomicBool>>,
) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let Some(mut r) = reader else {
            return buf;
        };
        let mut chunk = [0u8; 64 * 1024];
        loop {
            match r.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    if buf.len() as u64 + n as u64 > cap {
                        match &overflow {
                            Some(flag) => {
                                flag.store(true, Ordering::Relaxed);
                                break;
                            }
                            None => continue,
                        }
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                Err(_) => break,
            }
        }
        buf
    })
}

fn join_reader(handle: std::thread::JoinHandle<Vec<u8>>) -> Result<Vec<u8>, EngineError> {
    handle
        .join()
        .map_err(|_| EngineError::Io(std::io::Error::other("pipe reader thread panicked")))
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}
