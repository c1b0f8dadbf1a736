//! Bundled dataset resources and first-launch provisioning.
//!
//! # Responsibility
//! - Map dataset names to read-only bundled resources.
//! - Materialize a bundled dataset into writable storage exactly once.
//!
//! # Invariants
//! - Provisioning never touches a database connection.
//! - A partially copied file is never left at the final path.

mod bundle;

pub use bundle::{AssetBundle, BundledAsset, DirectoryBundle, StaticBundle};

use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug)]
pub enum ProvisionError {
    UnknownDataset(String),
    CreateDirectory { path: PathBuf, source: io::Error },
    Copy { path: PathBuf, source: io::Error },
    /// The copy reported success but the final file is not there.
    MissingAfterCopy(PathBuf),
}

impl Display for ProvisionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownDataset(name) => write!(f, "no bundled asset for dataset `{name}`"),
            Self::CreateDirectory { path, source } => {
                write!(f, "failed to create `{}`: {source}", path.display())
            }
            Self::Copy { path, source } => {
                write!(f, "failed to copy dataset to `{}`: {source}", path.display())
            }
            Self::MissingAfterCopy(path) => {
                write!(f, "dataset file `{}` missing after copy", path.display())
            }
        }
    }
}

impl Error for ProvisionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDirectory { source, .. } | Self::Copy { source, .. } => Some(source),
            Self::UnknownDataset(_) | Self::MissingAfterCopy(_) => None,
        }
    }
}

/// What [`ensure_local_file`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    AlreadyPresent,
    Copied { bytes: u64 },
}

/// Makes sure `local_path` holds the dataset `name`, copying it from `bundle`
/// when absent.
///
/// Idempotent: an existing file is left untouched. The copy lands in a
/// `.partial` sibling first and is renamed into place afterwards.
pub async fn ensure_local_file(
    bundle: &dyn AssetBundle,
    name: &str,
    local_path: &Path,
) -> Result<ProvisionOutcome, ProvisionError> {
    if file_exists(local_path).await {
        return Ok(ProvisionOutcome::AlreadyPresent);
    }

    let started_at = Instant::now();
    info!("event=provision module=provision status=start dataset={name}");

    let asset = bundle
        .resolve(name)
        .ok_or_else(|| ProvisionError::UnknownDataset(name.to_string()))?;

    if let Some(parent) = local_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| ProvisionError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    let partial = partial_path(local_path);
    let result = copy_into_place(&asset, &partial, local_path).await;
    match result {
        Ok(bytes) => {
            info!(
                "event=provision module=provision status=ok dataset={} bytes={} duration_ms={}",
                name,
                bytes,
                started_at.elapsed().as_millis()
            );
            Ok(ProvisionOutcome::Copied { bytes })
        }
        Err(err) => {
            let _ = tokio::fs::remove_file(&partial).await;
            error!(
                "event=provision module=provision status=error dataset={} duration_ms={} error={}",
                name,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

async fn copy_into_place(
    asset: &BundledAsset,
    partial: &Path,
    final_path: &Path,
) -> Result<u64, ProvisionError> {
    let copy_err = |source| ProvisionError::Copy {
        path: final_path.to_path_buf(),
        source,
    };

    let bytes = match asset {
        BundledAsset::File(source) => tokio::fs::copy(source, partial).await.map_err(copy_err)?,
        BundledAsset::Bytes(data) => {
            tokio::fs::write(partial, data).await.map_err(copy_err)?;
            data.len() as u64
        }
    };
    tokio::fs::rename(partial, final_path)
        .await
        .map_err(copy_err)?;

    if !file_exists(final_path).await {
        return Err(ProvisionError::MissingAfterCopy(final_path.to_path_buf()));
    }
    Ok(bytes)
}

pub(crate) async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

pub(crate) fn partial_path(path: &Path) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(".partial");
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::{ensure_local_file, partial_path, ProvisionError, ProvisionOutcome, StaticBundle};
    use std::path::Path;

    #[tokio::test]
    async fn copies_once_then_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/databases/KJV");
        let bundle = StaticBundle::new().with_asset("KJV", b"bundled bytes");

        let first = ensure_local_file(&bundle, "KJV", &target).await.unwrap();
        assert_eq!(first, ProvisionOutcome::Copied { bytes: 13 });

        std::fs::write(&target, b"local edits").unwrap();
        let second = ensure_local_file(&bundle, "KJV", &target).await.unwrap();
        assert_eq!(second, ProvisionOutcome::AlreadyPresent);
        assert_eq!(std::fs::read(&target).unwrap(), b"local edits");
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn unknown_dataset_fails_without_creating_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("databases/NOPE");
        let bundle = StaticBundle::new();

        let err = ensure_local_file(&bundle, "NOPE", &target).await.unwrap_err();
        assert!(matches!(err, ProvisionError::UnknownDataset(name) if name == "NOPE"));
        assert!(!target.exists());
        assert!(!dir.path().join("databases").exists());
    }

    #[test]
    fn partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/data/databases/KJV")),
            Path::new("/data/databases/KJV.partial")
        );
    }
}
