//! Core data models for the sidecar metadata store.
//!
//! These entities represent the logical structure of an image collection:
//! one `ImageMetadata` per image, plus the transient pairing the scanner
//! establishes between an image file and its optional sidecar.

pub mod metadata;
pub mod pairing;
