//! Locating the JDBC driver artifact the bridge runs.

use crate::Result;
use crate::error::AtlasDriverError;
use std::path::{Path, PathBuf};

/// File name the artifact is looked up under.
pub const ARTIFACT_FILE_NAME: &str = "MongoAtlasJDBC.jar";

/// Where operators can fetch the artifact from.
pub const ARTIFACT_DOWNLOAD_URL: &str =
    "https://repo1.maven.org/maven2/org/mongodb/mongodb-jdbc/2.0.3/mongodb-jdbc-2.0.3-all.jar";

/// Ordered search for the driver artifact.
///
/// Candidates, first existing file wins:
/// 1. the configured custom class path
/// 2. `MongoAtlasJDBC.jar` in the working directory
/// 3. `MongoAtlasJDBC.jar` in the download directory next to the executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocator {
    custom: Option<PathBuf>,
    working_dir: PathBuf,
    download_dir: Option<PathBuf>,
}

impl ArtifactLocator {
    /// Locator for the current process.
    pub fn new(custom: Option<PathBuf>) -> Self {
        let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let download_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join("download")));
        Self::with_dirs(custom, working_dir, download_dir)
    }

    /// Locator with explicit search directories.
    pub fn with_dirs(
        custom: Option<PathBuf>,
        working_dir: impl Into<PathBuf>,
        download_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            custom,
            working_dir: working_dir.into(),
            download_dir,
        }
    }

    /// Paths tried, in order.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::with_capacity(3);
        if let Some(custom) = &self.custom {
            candidates.push(custom.clone());
        }
        candidates.push(self.working_dir.join(ARTIFACT_FILE_NAME));
        if let Some(download_dir) = &self.download_dir {
            candidates.push(download_dir.join(ARTIFACT_FILE_NAME));
        }
        candidates
    }

    /// First candidate that exists as a file.
    ///
    /// # Errors
    /// Returns a configuration error naming the download location when no
    /// candidate exists
    pub fn resolve(&self) -> Result<PathBuf> {
        let found = self.candidates().into_iter().find(|path| is_file(path));
        match found {
            Some(path) => {
                tracing::debug!("Using bridge driver artifact {}", path.display());
                Ok(path)
            }
            None => Err(AtlasDriverError::configuration(format!(
                "Please download and place {} inside your project directory (available at {})",
                ARTIFACT_FILE_NAME, ARTIFACT_DOWNLOAD_URL
            ))),
        }
    }
}

fn is_file(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"jar").unwrap();
        path
    }

    #[test]
    fn test_custom_class_path_wins() {
        let work = TempDir::new().unwrap();
        let custom_dir = TempDir::new().unwrap();
        touch(work.path(), ARTIFACT_FILE_NAME);
        let custom = touch(custom_dir.path(), "driver.jar");

        let locator = ArtifactLocator::with_dirs(Some(custom.clone()), work.path(), None);
        assert_eq!(locator.resolve().unwrap(), custom);
    }

    #[test]
    fn test_missing_custom_falls_back_to_working_dir() {
        let work = TempDir::new().unwrap();
        let local = touch(work.path(), ARTIFACT_FILE_NAME);

        let locator = ArtifactLocator::with_dirs(
            Some(work.path().join("missing.jar")),
            work.path(),
            None,
        );
        assert_eq!(locator.resolve().unwrap(), local);
    }

    #[test]
    fn test_download_dir_is_last_resort() {
        let work = TempDir::new().unwrap();
        let download = TempDir::new().unwrap();
        let downloaded = touch(download.path(), ARTIFACT_FILE_NAME);

        let locator =
            ArtifactLocator::with_dirs(None, work.path(), Some(download.path().to_path_buf()));
        assert_eq!(locator.resolve().unwrap(), downloaded);
        assert_eq!(locator.candidates().len(), 2);
    }

    #[test]
    fn test_nothing_found_names_download_url() {
        let work = TempDir::new().unwrap();
        let locator = ArtifactLocator::with_dirs(None, work.path(), None);

        let error = locator.resolve().unwrap_err();
        assert!(matches!(error, AtlasDriverError::Configuration { .. }));
        assert!(error.to_string().contains(ARTIFACT_FILE_NAME));
        assert!(error.to_string().contains(ARTIFACT_DOWNLOAD_URL));
    }

    #[test]
    fn test_directory_named_like_artifact_is_ignored() {
        let work = TempDir::new().unwrap();
        std::fs::create_dir(work.path().join(ARTIFACT_FILE_NAME)).unwrap();
        let locator = ArtifactLocator::with_dirs(None, work.path(), None);
        assert!(locator.resolve().is_err());
    }
}
