//! Error taxonomy for the sidecar store.
//!
//! Two layers: `ValidationError` names a specific schema violation found in
//! one sidecar document or one staged edit; `StoreError` is the error type
//! of every repository operation and wraps validation, lookup, and I/O
//! failures.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// A specific violation of the sidecar metadata schema.
///
/// Carried by decode failures, rejected edits, and corrupt records. The
/// variant always names the offending piece of the document so the caller
/// can show the user exactly what is wrong.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("malformed XML: {0}")]
    Malformed(String),
    #[error("cannot read sidecar file: {0}")]
    Unreadable(String),
    #[error("expected `image` root element, found `{0}`")]
    UnexpectedRoot(String),
    #[error("missing required attribute `{0}` on `image`")]
    MissingAttribute(&'static str),
    #[error("unknown attribute `{0}` on `image`")]
    UnknownAttribute(String),
    #[error("attribute `id` is not a valid UUID: `{0}`")]
    InvalidId(String),
    #[error("unexpected element `{0}`")]
    UnexpectedElement(String),
    #[error("element `{0}` is duplicated or out of schema order")]
    OutOfOrder(String),
    #[error("`{0}` must contain at least one entry")]
    EmptyContainer(&'static str),
    #[error("unexpected text content `{0}`")]
    UnexpectedText(String),
    #[error("trailing content after the `image` element")]
    TrailingContent,
    #[error("metadata id `{0}` is already used by another sidecar in this directory")]
    DuplicateId(Uuid),
    #[error("`filename` attribute `{found}` does not match image file `{expected}`")]
    FilenameMismatch { expected: String, found: String },
    #[error("`{0}` entries must not be blank")]
    BlankValue(&'static str),
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The directory could not be scanned at all; nothing is loaded.
    #[error("cannot access directory {path:?}: {source}")]
    DirectoryAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A sidecar document or a staged edit violates the metadata schema.
    #[error("invalid metadata: {0}")]
    Validation(#[from] ValidationError),
    /// No entity with the given id in the current session.
    #[error("no entity with id `{0}`")]
    NotFound(Uuid),
    /// A commit- or delete-time filesystem failure. In-memory state is
    /// unchanged and the previous on-disk sidecar, if any, is intact.
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
