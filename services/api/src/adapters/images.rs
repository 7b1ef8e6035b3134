//! services/api/src/adapters/images.rs
//!
//! Filesystem-backed `ImageStore`. Annotated images live under one upload
//! directory; the report keeps only the path.

use async_trait::async_trait;
use dumpster_core::ports::{ImageStore, PortError, PortResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Upper bound on `-N` suffixes tried when a file name is already taken.
const MAX_NAME_ATTEMPTS: u32 = 100;

#[derive(Clone, Debug)]
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    /// Creates the upload directory if needed.
    pub async fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn candidate(&self, file_name: &str, attempt: u32) -> PathBuf {
        if attempt == 0 {
            return self.root.join(file_name);
        }
        let path = Path::new(file_name);
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("upload");
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.root.join(format!("{stem}-{attempt}.{ext}")),
            None => self.root.join(format!("{stem}-{attempt}")),
        }
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn save(&self, file_name: &str, bytes: &[u8]) -> PortResult<String> {
        if file_name.contains(['/', '\\']) || file_name.starts_with('.') {
            return Err(PortError::InvalidInput(format!(
                "'{}' is not a plain file name",
                file_name
            )));
        }

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = self.candidate(file_name, attempt);
            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(PortError::StorageUnavailable(format!(
                        "cannot create {}: {}",
                        path.display(),
                        e
                    )))
                }
            };
            let written = async {
                file.write_all(bytes).await?;
                file.flush().await
            }
            .await;
            if let Err(e) = written {
                drop(file);
                if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %cleanup, "could not remove partial image");
                }
                return Err(PortError::StorageUnavailable(format!(
                    "cannot write {}: {}",
                    path.display(),
                    e
                )));
            }
            return Ok(path.to_string_lossy().into_owned());
        }

        Err(PortError::StorageUnavailable(format!(
            "no free file name for {}",
            file_name
        )))
    }

    async fn load(&self, path: &str) -> PortResult<Vec<u8>> {
        tokio::fs::read(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => PortError::NotFound(format!("Image {} not found", path)),
            _ => PortError::StorageUnavailable(format!("cannot read {}: {}", path, e)),
        })
    }

    async fn remove(&self, path: &str) -> PortResult<()> {
        if !Path::new(path).starts_with(&self.root) {
            return Err(PortError::InvalidInput(format!(
                "{} is outside the upload directory",
                path
            )));
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortError::StorageUnavailable(format!(
                "cannot remove {}: {}",
                path, e
            ))),
        }
    }
}
