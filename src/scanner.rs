//! Pairing scanner.
//!
//! Walks a single directory (non-recursive), discovers image files by
//! extension, and pairs each with its sidecar candidate: the same filename
//! stem with an `.xml` extension. Sidecar files that match no image are
//! reported as orphans, never silently dropped. The listing is read-only
//! and the result ordering is lexicographic by image path so repeated scans
//! of an unchanged directory are identical.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::config::ScanConfig;
use crate::errors::{StoreError, StoreResult};
use crate::models::pairing::ImagePairing;

/// Extension of sidecar metadata files.
pub const METADATA_EXT: &str = "xml";

/// Everything one scan produces.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Pairings in lexicographic image-path order.
    pub pairings: Vec<ImagePairing>,
    /// Sidecar files with no matching image, in lexicographic order.
    pub orphans: Vec<PathBuf>,
}

/// The sidecar path an image's metadata lives at, whether or not the file
/// exists: same directory, same stem, `.xml` extension.
pub fn sidecar_path_for(image_path: &Path) -> PathBuf {
    image_path.with_extension(METADATA_EXT)
}

/// List a directory and pair images with their sidecars.
///
/// Fails with [`StoreError::DirectoryAccess`] when the path is missing,
/// unreadable, or not a directory; a failing scan never returns partial
/// results.
pub async fn scan_directory(directory: &Path, config: &ScanConfig) -> StoreResult<ScanOutcome> {
    let access_err = |source: io::Error| StoreError::DirectoryAccess {
        path: directory.to_path_buf(),
        source,
    };

    let meta = fs::metadata(directory).await.map_err(access_err)?;
    if !meta.is_dir() {
        return Err(access_err(io::Error::other("not a directory")));
    }

    let mut entries = fs::read_dir(directory).await.map_err(access_err)?;
    let mut images = Vec::new();
    let mut sidecars = BTreeSet::new();

    while let Some(entry) = entries.next_entry().await.map_err(access_err)? {
        let file_type = entry.file_type().await.map_err(access_err)?;
        if !file_type.is_file() {
            continue;
        }
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            continue;
        };
        if ext.eq_ignore_ascii_case(METADATA_EXT) {
            sidecars.insert(path);
        } else if config.matches(ext) {
            images.push(path);
        }
    }

    images.sort();

    let mut claimed = BTreeSet::new();
    let pairings = images
        .into_iter()
        .map(|image_path| {
            let candidate = sidecar_path_for(&image_path);
            let sidecar_path = if sidecars.contains(&candidate) {
                claimed.insert(candidate.clone());
                Some(candidate)
            } else {
                None
            };
            ImagePairing {
                image_path,
                sidecar_path,
            }
        })
        .collect::<Vec<_>>();

    let orphans: Vec<PathBuf> = sidecars
        .into_iter()
        .filter(|sidecar| !claimed.contains(sidecar))
        .collect();

    debug!(
        "scanned {}: {} image(s), {} orphan sidecar(s)",
        directory.display(),
        pairings.len(),
        orphans.len()
    );

    Ok(ScanOutcome { pairings, orphans })
}
