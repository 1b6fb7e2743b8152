//! sidecar-store — metadata repository for image collections.
//!
//! Scans a directory, pairs each image with its optional XML sidecar file
//! (`foo.png` ↔ `foo.xml`), validates the metadata against a fixed schema,
//! and persists edits back one sidecar at a time with atomic replace.
//!
//! The entry point is [`MetadataRepository`]: open a directory, read and
//! stage edits through it, and commit per entity. A sidecar that fails
//! validation never fails the whole directory; its record is kept, flagged
//! corrupt with the exact violation, and stays editable.

pub mod codec;
pub mod config;
pub mod errors;
pub mod models;
pub mod scanner;
pub mod services;

pub use config::ScanConfig;
pub use errors::{StoreError, StoreResult, ValidationError};
pub use models::metadata::{FieldChange, ImageMetadata};
pub use models::pairing::ImagePairing;
pub use services::repository::{EntityRecord, MetadataRepository};
