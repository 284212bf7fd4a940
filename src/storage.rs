//! Storage ingestor: persists uploaded document bytes under a flat directory
//! keyed by a unique, sanitized storage id.

use crate::config;
use crate::util::{now_rfc3339, now_unix_millis};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no file provided")]
    NoFileProvided,

    #[error("payload of {size} bytes exceeds limit of {max} bytes")]
    PayloadTooLarge { size: u64, max: u64 },

    #[error("file type not allowed: {0}")]
    TypeNotAllowed(String),

    #[error("invalid storage id: {0}")]
    InvalidId(String),

    #[error("stored file not found: {0}")]
    NotFound(String),

    #[error("storage write failed: {0}")]
    WriteFailed(#[from] std::io::Error),
}

/// One persisted upload. Created at ingestion and never mutated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub storage_id: String,
    pub original_name: String,
    pub size_bytes: u64,
    pub declared_mime_type: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub created_at: String,
}

pub struct Ingestor {
    root: PathBuf,
    max_upload_bytes: u64,
    allowed_extensions: Vec<String>,
}

impl Ingestor {
    pub fn new(cfg: &config::Storage) -> Result<Self, StorageError> {
        let root = PathBuf::from(&cfg.upload_dir);
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            max_upload_bytes: cfg.max_upload_bytes,
            allowed_extensions: cfg
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate and persist one upload, returning its `StoredFile` record.
    ///
    /// The write is atomic from a reader's point of view: bytes go to a
    /// `.part` file first and are linked into place only once fully synced.
    /// A same-millisecond collision on the derived name bumps a numeric
    /// suffix instead of overwriting.
    pub async fn ingest(
        &self,
        bytes: &[u8],
        original_name: &str,
        declared_mime_type: &str,
    ) -> Result<StoredFile, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::NoFileProvided);
        }
        let size = bytes.len() as u64;
        if size > self.max_upload_bytes {
            return Err(StorageError::PayloadTooLarge {
                size,
                max: self.max_upload_bytes,
            });
        }

        let (stem, ext) = sanitize_filename(original_name);
        if !self.allowed_extensions.is_empty() && !self.allowed_extensions.contains(&ext) {
            return Err(StorageError::TypeNotAllowed(if ext.is_empty() {
                "(no extension)".to_string()
            } else {
                ext
            }));
        }

        let millis = now_unix_millis();
        let mut attempt = 0u32;
        let storage_id = loop {
            let candidate = if attempt == 0 {
                format_id(millis, &stem, &ext, None)
            } else {
                format_id(millis, &stem, &ext, Some(attempt))
            };
            match self.write_unique(&candidate, bytes).await {
                Ok(()) => break candidate,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(StorageError::WriteFailed(e)),
            }
        };

        let path = self.root.join(&storage_id);
        info!(
            storage_id = %storage_id,
            size_bytes = size,
            original_name = %original_name,
            "file ingested"
        );

        Ok(StoredFile {
            storage_id,
            original_name: original_name.to_string(),
            size_bytes: size,
            declared_mime_type: declared_mime_type.to_string(),
            path,
            created_at: now_rfc3339(),
        })
    }

    /// Map a previously issued storage id back to its on-disk path.
    pub async fn resolve(&self, storage_id: &str) -> Result<PathBuf, StorageError> {
        if storage_id.is_empty()
            || storage_id.contains("..")
            || storage_id.contains('/')
            || storage_id.contains('\\')
        {
            return Err(StorageError::InvalidId(storage_id.to_string()));
        }
        let path = self.root.join(storage_id);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(storage_id.to_string()));
        }
        Ok(path)
    }

    /// Fully write bytes to a scratch `.part` file, then hard-link to the
    /// final name. The link fails with `AlreadyExists` rather than
    /// clobbering, which is what makes concurrent same-named ingests safe.
    async fn write_unique(&self, storage_id: &str, bytes: &[u8]) -> std::io::Result<()> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static SCRATCH: AtomicU64 = AtomicU64::new(0);

        let scratch = SCRATCH.fetch_add(1, Ordering::Relaxed);
        let tmp = self.root.join(format!("{storage_id}.{scratch}.part"));
        let dest = self.root.join(storage_id);

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);

        let linked = fs::hard_link(&tmp, &dest).await;
        let _ = fs::remove_file(&tmp).await;
        linked
    }
}

fn format_id(millis: i128, stem: &str, ext: &str, bump: Option<u32>) -> String {
    let mut id = format!("{millis}-{stem}");
    if let Some(n) = bump {
        id.push_str(&format!("-{n}"));
    }
    if !ext.is_empty() {
        id.push('.');
        id.push_str(ext);
    }
    id
}

/// Derive a safe (stem, extension) pair from a client-supplied filename:
/// path components stripped, whitespace runs collapsed to `-`, everything
/// outside `[A-Za-z0-9._-]` dropped, extension preserved lowercase.
pub fn sanitize_filename(original: &str) -> (String, String) {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original)
        .trim();

    let (stem_raw, ext_raw) = match base.rsplit_once('.') {
        Some((s, e)) if !e.is_empty() => (s, e),
        _ => (base, ""),
    };

    let stem: String = stem_raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    let stem = if stem.is_empty() || stem.chars().all(|c| c == '.') {
        "file".to_string()
    } else {
        stem
    };

    let ext: String = ext_raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    (stem, ext)
}
