//! The structured metadata attached to one image.

use serde::Serialize;
use uuid::Uuid;

use crate::errors::ValidationError;

/// Structured metadata for a single image.
///
/// An all-defaults value (no author, no universe, no characters, no tags)
/// is the explicit "no metadata yet" state; it is valid and is never
/// persisted to disk. Empty `characters`/`tags` vectors mean the container
/// is absent; a container is never serialized with zero entries.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ImageMetadata {
    /// Unique identifier within one directory session.
    pub id: Uuid,

    /// Filename of the associated image (no directory component).
    pub filename: String,

    /// The image's author.
    pub author: Option<String>,

    /// Universe the characters or scenery belong to.
    pub universe: Option<String>,

    /// Characters involved, in display order.
    pub characters: Vec<String>,

    /// Free-form tags, in display order.
    pub tags: Vec<String>,
}

impl ImageMetadata {
    /// A fresh entity with no metadata for the given image.
    pub fn blank(id: Uuid, filename: impl Into<String>) -> Self {
        Self {
            id,
            filename: filename.into(),
            author: None,
            universe: None,
            characters: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// True when every optional field is absent.
    pub fn is_empty(&self) -> bool {
        self.author.is_none()
            && self.universe.is_none()
            && self.characters.is_empty()
            && self.tags.is_empty()
    }

    /// Check the data-model invariants: present single-valued fields and
    /// every list entry must contain something other than whitespace.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.author.as_deref().is_some_and(is_blank) {
            return Err(ValidationError::BlankValue("author"));
        }
        if self.universe.as_deref().is_some_and(is_blank) {
            return Err(ValidationError::BlankValue("universe"));
        }
        if self.characters.iter().any(|c| is_blank(c)) {
            return Err(ValidationError::BlankValue("characters"));
        }
        if self.tags.iter().any(|t| is_blank(t)) {
            return Err(ValidationError::BlankValue("tags"));
        }
        Ok(())
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// One staged edit to an entity. `None` on a single-valued field removes it;
/// an empty vector on a list field removes the whole container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldChange {
    Author(Option<String>),
    Universe(Option<String>),
    Characters(Vec<String>),
    Tags(Vec<String>),
}
