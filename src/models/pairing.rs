//! The association between an image file and its optional sidecar.

use std::path::PathBuf;

/// Transient scan result pairing one image with at most one sidecar file.
///
/// Recomputed on every scan, never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePairing {
    /// Path of the discovered image file.
    pub image_path: PathBuf,

    /// Path of the matching sidecar, if one existed at scan time.
    pub sidecar_path: Option<PathBuf>,
}
