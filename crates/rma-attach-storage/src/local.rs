use crate::traits::{ByteStream, Storage, StorageError, StorageResult, UploadReader};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;

/// Tag for bytes being written before they are renamed into place.
pub const STAGING_TAG: &str = "part";
/// Tag for the pre-overwrite copy kept until the tracking row is updated.
pub const BACKUP_TAG: &str = "bak";

/// Cross-device rename (EXDEV) on Linux and macOS.
const EXDEV: i32 = 18;

/// Local (or network-mounted) filesystem storage
#[derive(Clone, Debug)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory of the attachment tree (e.g. `/mnt/rma`)
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage { base_path })
    }

    /// Validate that `path` lies under the storage root.
    ///
    /// Paths are checked lexically: `..` components are rejected outright and
    /// the path must start with the root.
    fn checked<'a>(&self, path: &'a Path) -> StorageResult<&'a Path> {
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(StorageError::InvalidPath(format!(
                "Path {} contains parent directory components",
                path.display()
            )));
        }
        if path.strip_prefix(&self.base_path).is_err() {
            return Err(StorageError::InvalidPath(format!(
                "Path {} resolves outside storage directory",
                path.display()
            )));
        }
        Ok(path)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// `try_exists` with failures surfaced. An unreadable path is not a free one.
    async fn path_exists(path: &Path) -> StorageResult<bool> {
        fs::try_exists(path).await.map_err(|e| {
            StorageError::ReadFailed(format!("Failed to check {}: {}", path.display(), e))
        })
    }

    fn is_internal_temp(name: &str) -> bool {
        name.starts_with('.')
            && (name.ends_with(&format!(".{}", STAGING_TAG))
                || name.ends_with(&format!(".{}", BACKUP_TAG)))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn root(&self) -> &Path {
        &self.base_path
    }

    async fn ensure_dir(&self, dir: &Path) -> StorageResult<()> {
        let dir = self.checked(dir)?;
        fs::create_dir_all(dir).await.map_err(|e| {
            StorageError::WriteFailed(format!(
                "Failed to create directory {}: {}",
                dir.display(),
                e
            ))
        })
    }

    async fn exists(&self, path: &Path) -> StorageResult<bool> {
        let path = self.checked(path)?;
        Self::path_exists(path).await
    }

    async fn write_stream(
        &self,
        path: &Path,
        reader: UploadReader,
        max_bytes: Option<u64>,
    ) -> StorageResult<u64> {
        let path = self.checked(path)?;
        let start = std::time::Instant::now();

        self.ensure_parent_dir(path).await?;
        let staging = self.sibling_temp_path(path, STAGING_TAG);

        let result: StorageResult<u64> = async {
            let mut file = fs::File::create(&staging).await.map_err(|e| {
                StorageError::WriteFailed(format!(
                    "Failed to create file {}: {}",
                    staging.display(),
                    e
                ))
            })?;

            // Read one byte past the limit so an oversized upload is detectable.
            let mut limited = reader.take(max_bytes.map_or(u64::MAX, |m| m.saturating_add(1)));
            let bytes_copied = tokio::io::copy(&mut limited, &mut file)
                .await
                .map_err(|e| {
                    StorageError::WriteFailed(format!(
                        "Failed to write stream to file {}: {}",
                        staging.display(),
                        e
                    ))
                })?;

            if let Some(limit) = max_bytes {
                if bytes_copied > limit {
                    return Err(StorageError::TooLarge { limit });
                }
            }

            file.sync_all().await.map_err(|e| {
                StorageError::WriteFailed(format!(
                    "Failed to sync file {}: {}",
                    staging.display(),
                    e
                ))
            })?;
            drop(file);

            fs::rename(&staging, path).await.map_err(|e| {
                StorageError::WriteFailed(format!(
                    "Failed to move staged file into {}: {}",
                    path.display(),
                    e
                ))
            })?;

            Ok(bytes_copied)
        }
        .await;

        match result {
            Ok(size) => {
                tracing::info!(
                    path = %path.display(),
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Local storage stream write successful"
                );
                Ok(size)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&staging).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(
                            error = %cleanup,
                            path = %staging.display(),
                            "Failed to remove staging file"
                        );
                    }
                }
                Err(e)
            }
        }
    }

    async fn delete(&self, path: &Path) -> StorageResult<()> {
        let path = self.checked(path)?;
        let start = std::time::Instant::now();

        match fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(StorageError::DeleteFailed(format!(
                    "Failed to delete file {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        tracing::info!(
            path = %path.display(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
        let from = self.checked(from)?;
        let to = self.checked(to)?;

        if !Self::path_exists(from).await? {
            return Err(StorageError::NotFound(from.display().to_string()));
        }
        if Self::path_exists(to).await? {
            return Err(StorageError::AlreadyExists(to.display().to_string()));
        }

        self.ensure_parent_dir(to).await?;

        match fs::rename(from, to).await {
            Ok(()) => {}
            Err(e) if e.raw_os_error() == Some(EXDEV) => {
                // Different mount points: copy then remove the source.
                fs::copy(from, to).await.map_err(|e| {
                    StorageError::MoveFailed(format!(
                        "Failed to copy {} to {}: {}",
                        from.display(),
                        to.display(),
                        e
                    ))
                })?;
                if let Err(e) = fs::remove_file(from).await {
                    let _ = fs::remove_file(to).await;
                    return Err(StorageError::MoveFailed(format!(
                        "Failed to remove {} after copy: {}",
                        from.display(),
                        e
                    )));
                }
            }
            Err(e) => {
                return Err(StorageError::MoveFailed(format!(
                    "Failed to move {} to {}: {}",
                    from.display(),
                    to.display(),
                    e
                )))
            }
        }

        tracing::info!(
            from_path = %from.display(),
            to_path = %to.display(),
            "Local storage move successful"
        );

        Ok(())
    }

    async fn copy(&self, from: &Path, to: &Path) -> StorageResult<()> {
        let from = self.checked(from)?;
        let to = self.checked(to)?;

        if !Self::path_exists(from).await? {
            return Err(StorageError::NotFound(from.display().to_string()));
        }

        self.ensure_parent_dir(to).await?;

        fs::copy(from, to).await.map_err(|e| {
            StorageError::WriteFailed(format!(
                "Failed to copy {} to {}: {}",
                from.display(),
                to.display(),
                e
            ))
        })?;

        tracing::debug!(
            from_path = %from.display(),
            to_path = %to.display(),
            "Local storage copy successful"
        );

        Ok(())
    }

    async fn content_length(&self, path: &Path) -> StorageResult<u64> {
        let path = self.checked(path)?;
        let meta = fs::metadata(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(path.display().to_string())
            } else {
                StorageError::ReadFailed(e.to_string())
            }
        })?;
        Ok(meta.len())
    }

    async fn list_files(&self, dir: &Path) -> StorageResult<Vec<String>> {
        let dir = self.checked(dir)?;
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::ReadFailed(format!(
                    "Failed to read directory {}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if Self::is_internal_temp(&name) {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    async fn download_stream(&self, path: &Path) -> StorageResult<ByteStream> {
        let path = self.checked(path)?;

        let file = fs::File::open(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(path.display().to_string())
            } else {
                StorageError::ReadFailed(format!(
                    "Failed to open file {}: {}",
                    path.display(),
                    e
                ))
            }
        })?;

        let path_display = path.display().to_string();
        let stream = tokio_util::io::ReaderStream::new(file).map(move |result| {
            result.map_err(|e| {
                tracing::error!(path = %path_display, error = %e, "Local storage stream read error");
                StorageError::ReadFailed(format!("Failed to read chunk: {}", e))
            })
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::pin::Pin;
    use tempfile::tempdir;

    fn reader(data: &[u8]) -> UploadReader {
        Box::pin(std::io::Cursor::new(data.to_vec())) as Pin<Box<dyn tokio::io::AsyncRead + Send + Sync + Unpin>>
    }

    #[tokio::test]
    async fn test_write_stream_and_download() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        let path = dir.path().join("RECORD_1").join("photos").join("a.txt");

        let size = storage
            .write_stream(&path, reader(b"stream test data"), None)
            .await
            .unwrap();
        assert_eq!(size, 16);
        assert!(storage.exists(&path).await.unwrap());

        let mut stream = storage.download_stream(&path).await.unwrap();
        let mut downloaded = Vec::new();
        while let Some(chunk) = stream.next().await {
            downloaded.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(downloaded, b"stream test data");
    }

    #[tokio::test]
    async fn test_write_stream_replaces_existing() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        let path = dir.path().join("a.txt");

        storage.write_stream(&path, reader(b"old"), None).await.unwrap();
        storage
            .write_stream(&path, reader(b"newer bytes"), None)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"newer bytes");
        assert_eq!(storage.list_files(dir.path()).await.unwrap(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_write_stream_enforces_limit_without_touching_target() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        let path = dir.path().join("a.txt");
        storage.write_stream(&path, reader(b"keep"), None).await.unwrap();

        let result = storage
            .write_stream(&path, reader(b"far too many bytes"), Some(8))
            .await;
        assert!(matches!(result, Err(StorageError::TooLarge { limit: 8 })));
        assert_eq!(std::fs::read(&path).unwrap(), b"keep");
        assert_eq!(storage.list_files(dir.path()).await.unwrap(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_path_outside_root_rejected() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("root")).await.unwrap();

        let outside = dir.path().join("elsewhere.txt");
        assert!(matches!(
            storage.exists(&outside).await,
            Err(StorageError::InvalidPath(_))
        ));

        let traversal = dir.path().join("root").join("..").join("elsewhere.txt");
        assert!(matches!(
            storage.delete(&traversal).await,
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        assert!(storage.delete(&dir.path().join("nope.txt")).await.is_ok());
    }

    #[tokio::test]
    async fn test_rename_moves_and_refuses_to_clobber() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        let from = dir.path().join("RECORD_1").join("docs").join("a.pdf");
        let to = dir.path().join("RECORD_2").join("SUB_3").join("docs").join("a.pdf");

        storage.write_stream(&from, reader(b"pdf"), None).await.unwrap();
        storage.rename(&from, &to).await.unwrap();
        assert!(!storage.exists(&from).await.unwrap());
        assert!(storage.exists(&to).await.unwrap());

        storage.write_stream(&from, reader(b"other"), None).await.unwrap();
        assert!(matches!(
            storage.rename(&from, &to).await,
            Err(StorageError::AlreadyExists(_))
        ));
        assert_eq!(std::fs::read(&to).unwrap(), b"pdf");
    }

    #[tokio::test]
    async fn test_list_files_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        assert!(storage
            .list_files(&dir.path().join("RECORD_9"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_copy_and_content_length() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        let from = dir.path().join("a.bin");
        let to = dir.path().join("b.bin");

        storage.write_stream(&from, reader(b"12345"), None).await.unwrap();
        storage.copy(&from, &to).await.unwrap();
        assert_eq!(storage.content_length(&to).await.unwrap(), 5);
        assert!(matches!(
            storage.content_length(&dir.path().join("c.bin")).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_exists_reports_unreadable_paths() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        // A regular file where a directory is expected fails with ENOTDIR.
        std::fs::write(dir.path().join("blocker"), b"x").unwrap();
        let path = dir.path().join("blocker").join("a.txt");

        let result = storage.exists(&path).await;
        assert!(matches!(result, Err(StorageError::ReadFailed(_))));

        let target = dir.path().join("b.txt");
        let moved = storage.rename(&path, &target).await;
        assert!(matches!(moved, Err(StorageError::ReadFailed(_))));
        assert!(!target.exists());
    }
}
