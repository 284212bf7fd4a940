use serde::{Deserialize, Serialize};

/// Untyped output of one recognition run. The stdout payload is expected to
/// be JSON but is not assumed well-formed until the interpreter parses it.
#[derive(Debug, Clone)]
pub struct RawRecognition {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDiag {
    pub python_exe: String,
    pub python_version: Option<String>,
    pub script: String,
    pub script_present: bool,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}
