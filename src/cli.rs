use crate::{
    config::Config,
    engine::{Recognizer, python::PythonRecognizer},
    interpret::{self, DocumentType},
    util::ensure_dir,
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "idverify")]
#[command(about = "Identity document upload and OCR verification service")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./idverify.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP service.
    Serve {
        /// Bind address, overriding [server] host/port.
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
    /// Recognize and interpret one local file without going through storage.
    Verify {
        #[arg(long)]
        input: PathBuf,
        /// Declared document type: StudentID, PANCard or AadharCard.
        #[arg(long)]
        doc_type: String,
    },
    /// Check that the recognition engine is runnable.
    Doctor {},
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref())?;
    let cfg = Config::load(&cfg_path)?;
    let _guard = init_logging(&args, &cfg)?;

    match &args.cmd {
        Command::Serve { addr } => serve(&cfg, *addr),
        Command::Verify { input, doc_type } => verify(&cfg, input, doc_type),
        Command::Doctor {} => doctor(&cfg),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = user {
        return Ok(p.to_path_buf());
    }
    let default = PathBuf::from("idverify.toml");
    if default.exists() {
        Ok(default)
    } else {
        Ok(PathBuf::from("idverify.example.toml"))
    }
}

fn init_logging(args: &Args, cfg: &Config) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    let (file_layer, guard) = if let Some(path) = resolve_log_path(cfg) {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(&path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from("idverify.log"))
}

fn serve(cfg: &Config, addr: Option<SocketAddr>) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().with_context(|| "building tokio runtime")?;
    runtime.block_on(crate::server::run(cfg.clone(), addr))
}

fn verify(cfg: &Config, input: &Path, doc_type: &str) -> Result<()> {
    if !input.exists() {
        return Err(anyhow!("input does not exist: {}", input.display()));
    }
    let doc_type = DocumentType::parse(doc_type.trim()).ok_or_else(|| {
        anyhow!(
            "unknown document type {:?}; expected one of {}",
            doc_type,
            DocumentType::WIRE_NAMES.join(", ")
        )
    })?;

    let engine = PythonRecognizer::new(cfg)?;
    let raw = engine
        .recognize(input)
        .with_context(|| format!("recognizing {}", input.display()))?;
    let result = interpret::interpret(&raw, doc_type)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    let engine = PythonRecognizer::new(cfg)?;
    let diag = engine.doctor()?;
    println!("{}", serde_json::to_string_pretty(&diag)?);
    if !diag.ok {
        return Err(anyhow!("engine is not runnable"));
    }
    Ok(())
}
