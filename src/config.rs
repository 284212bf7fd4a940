use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: Default::default(),
            storage: Default::default(),
            engine: Default::default(),
            logging: Default::default(),
            debug: Default::default(),
            security: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
    /// Base URL prefixed onto `uploads/{storage_id}` when building access URLs.
    /// Stored files themselves are served by an external file server.
    pub public_base_url: String,
}
impl Default for Server {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 5000,
            public_base_url: "http://localhost:5000".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storage {
    pub upload_dir: String,
    pub max_upload_bytes: u64,
    /// Extension allow-list for ingested files. Empty means every type is
    /// accepted; populate it (e.g. ["pdf", "jpg", "jpeg", "png"]) to reject
    /// everything else at ingest time.
    pub allowed_extensions: Vec<String>,
}
impl Default for Storage {
    fn default() -> Self {
        Self {
            upload_dir: "uploads".into(),
            max_upload_bytes: 5 * 1024 * 1024,
            allowed_extensions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engine {
    pub python_exe: String,
    pub script: String,
    /// Wall-clock bound for one recognition run; the child is killed on expiry.
    pub timeout_seconds: u64,
    /// Cap on captured engine stdout. Exceeding it is an error, never a
    /// silent truncation.
    pub max_output_bytes: u64,
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
}
impl Default for Engine {
    fn default() -> Self {
        Self {
            python_exe: "python3".into(),
            script: "scripts/recognize.py".into(),
            timeout_seconds: 120,
            max_output_bytes: 10 * 1024 * 1024,
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debug {
    pub keep_engine_stderr: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            keep_engine_stderr: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Security {
    /// Require the recognizer script to live under the current working
    /// directory.
    pub pin_script_dir: bool,
}
impl Default for Security {
    fn default() -> Self {
        Self {
            pin_script_dir: true,
        }
    }
}
