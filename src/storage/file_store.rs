use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;

use crate::storage::ContentDigest;
use crate::utils::{P2PError, Result};

/// The directory a node shares with the overlay.
///
/// Filenames are flat identifiers: anything that would resolve outside the
/// shared directory is rejected.
pub struct FileStore {
    shared_dir: PathBuf,
    digest: Arc<dyn ContentDigest>,
}

impl FileStore {
    pub async fn new(shared_dir: PathBuf, digest: Arc<dyn ContentDigest>) -> Result<Self> {
        async_fs::create_dir_all(&shared_dir)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to create directory: {}", e)))?;

        Ok(Self { shared_dir, digest })
    }

    pub fn digest(&self) -> &Arc<dyn ContentDigest> {
        &self.digest
    }

    /// Enumerate regular files and digest each one. Files that cannot be
    /// read are skipped with a warning.
    pub async fn scan_files(&self) -> Result<BTreeMap<String, String>> {
        debug!("Scanning files in: {:?}", self.shared_dir);

        let mut entries = async_fs::read_dir(&self.shared_dir)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to read directory: {}", e)))?;

        let mut files = BTreeMap::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to read directory entry: {}", e)))?
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                warn!("Skipping file with non UTF-8 name: {:?}", path);
                continue;
            };
            if let Err(e) = validate_filename(name) {
                warn!("Skipping file that cannot be shared: {}", e);
                continue;
            }

            match async_fs::read(&path).await {
                Ok(content) => {
                    let digest = self.digest.digest(&content);
                    debug!("Processed file: {} -> {}", name, digest);
                    files.insert(name.to_string(), digest);
                }
                Err(e) => warn!("Failed to process file {:?}: {}", path, e),
            }
        }

        info!("Scanned {} files in {:?}", files.len(), self.shared_dir);
        Ok(files)
    }

    /// Read a file's full content as it exists right now.
    pub async fn read_file(&self, filename: &str) -> Result<Vec<u8>> {
        let path = self.path_for(filename)?;
        if !async_fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return Err(P2PError::NotFound(format!(
                "File '{}' not found on this node",
                filename
            )));
        }

        async_fs::read(&path)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to read {}: {}", filename, e)))
    }

    pub async fn write_file(&self, filename: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(filename)?;
        let mut file = async_fs::File::create(&path)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to create output file: {}", e)))?;

        file.write_all(content)
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to write {}: {}", filename, e)))?;
        file.flush()
            .await
            .map_err(|e| P2PError::IoError(format!("Failed to flush {}: {}", filename, e)))?;

        info!("Stored {} ({} bytes)", path.display(), content.len());
        Ok(path)
    }

    fn path_for(&self, filename: &str) -> Result<PathBuf> {
        validate_filename(filename)?;
        Ok(self.shared_dir.join(filename))
    }
}

pub fn validate_filename(filename: &str) -> Result<()> {
    let invalid = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\', '\0']);
    if invalid {
        return Err(P2PError::InvalidArgument(format!(
            "invalid filename: {:?}",
            filename
        )));
    }
    Ok(())
}
