//! Destination directory preparation and output file naming

use crate::error::LoaderError;
use std::path::{Path, PathBuf};
use tracing::info;

/// Make sure the destination directory exists, creating it if needed
pub async fn prepare_directory(path: &Path) -> Result<(), LoaderError> {
    if path.as_os_str().to_string_lossy().trim().is_empty() {
        return Err(LoaderError::InvalidConfig(
            "save directory must not be blank".to_string(),
        ));
    }

    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => {
            return Err(LoaderError::DirectoryCreation {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "path exists and is not a directory",
                ),
            })
        }
        Err(_) => {}
    }

    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| LoaderError::DirectoryCreation {
            path: path.to_path_buf(),
            source,
        })?;
    info!("Created save directory {}", path.display());

    Ok(())
}

/// File name for a URL: everything after the last `/`
///
/// Returns `None` when that leaves nothing usable as a single path component.
pub fn file_name_for(url: &str) -> Option<&str> {
    let name = url.rsplit('/').next()?;
    match name {
        "" | "." | ".." => None,
        name if name.contains('\\') => None,
        name => Some(name),
    }
}

/// Full destination path for a URL inside `directory`
pub fn destination_for(directory: &Path, url: &str) -> Option<PathBuf> {
    file_name_for(url).map(|name| directory.join(name))
}
