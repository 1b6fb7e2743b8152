//! src/services/repository.rs
//!
//! MetadataRepository — the stateful core of the sidecar store. One value
//! is one open directory session: it scans the directory, decodes every
//! paired sidecar into an in-memory entity, and owns all edits and writes
//! from then on. The repository is the sole writer of sidecar files; each
//! commit goes through a temporary file renamed into place so an existing
//! sidecar is never left half-written.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::codec;
use crate::config::ScanConfig;
use crate::errors::{StoreError, StoreResult, ValidationError};
use crate::models::metadata::{FieldChange, ImageMetadata};
use crate::scanner::{self, sidecar_path_for};

/// One entity plus its session bookkeeping.
#[derive(Clone, Debug)]
pub struct EntityRecord {
    /// Current in-memory entity, including staged edits.
    pub entity: ImageMetadata,

    /// Path of the image this entity describes.
    pub image_path: PathBuf,

    /// Where the sidecar lives (or would live); derived from the image path.
    pub sidecar_path: PathBuf,

    /// Whether a sidecar file existed at scan time or was written since.
    pub on_disk: bool,

    /// Whether the entity has staged edits not yet committed.
    pub dirty: bool,

    /// Set when the sidecar failed to load; the raw violation is kept and
    /// the entity stays editable. Cleared by the next successful commit.
    pub corrupt: Option<ValidationError>,
}

/// A loaded directory session.
///
/// Obtained through [`MetadataRepository::open`]; dropping the value closes
/// the session. All mutating operations take `&mut self`, which also
/// guarantees at most one in-flight commit per entity.
pub struct MetadataRepository {
    directory: PathBuf,
    entries: Vec<EntityRecord>,
    orphans: Vec<PathBuf>,
}

impl MetadataRepository {
    /// Open a directory with the default scan configuration.
    pub async fn open(directory: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::open_with(directory, &ScanConfig::default()).await
    }

    /// Open a directory session.
    ///
    /// Every recognized image gets exactly one record. A sidecar that fails
    /// to read or decode marks its record corrupt instead of failing the
    /// open; only a failing scan aborts the whole operation.
    pub async fn open_with(
        directory: impl Into<PathBuf>,
        config: &ScanConfig,
    ) -> StoreResult<Self> {
        let directory = directory.into();
        let outcome = scanner::scan_directory(&directory, config).await?;

        for orphan in &outcome.orphans {
            warn!("sidecar {} has no matching image", orphan.display());
        }

        let mut entries: Vec<EntityRecord> = Vec::with_capacity(outcome.pairings.len());
        for pairing in outcome.pairings {
            let filename = pairing
                .image_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let sidecar_path = sidecar_path_for(&pairing.image_path);

            let record = match &pairing.sidecar_path {
                Some(path) => {
                    let loaded = load_sidecar(path).await.and_then(|entity| {
                        if entity.filename != filename {
                            Err(ValidationError::FilenameMismatch {
                                expected: filename.clone(),
                                found: entity.filename,
                            })
                        } else if entries.iter().any(|rec| rec.entity.id == entity.id) {
                            Err(ValidationError::DuplicateId(entity.id))
                        } else {
                            Ok(entity)
                        }
                    });
                    match loaded {
                        Ok(entity) => EntityRecord {
                            entity,
                            image_path: pairing.image_path,
                            sidecar_path,
                            on_disk: true,
                            dirty: false,
                            corrupt: None,
                        },
                        Err(err) => {
                            warn!("sidecar {} is corrupt: {}", path.display(), err);
                            EntityRecord {
                                entity: ImageMetadata::blank(Uuid::new_v4(), filename),
                                image_path: pairing.image_path,
                                sidecar_path,
                                on_disk: true,
                                dirty: false,
                                corrupt: Some(err),
                            }
                        }
                    }
                }
                None => EntityRecord {
                    entity: ImageMetadata::blank(Uuid::new_v4(), filename),
                    image_path: pairing.image_path,
                    sidecar_path,
                    on_disk: false,
                    dirty: false,
                    corrupt: None,
                },
            };
            entries.push(record);
        }

        info!(
            "opened {}: {} image(s), {} corrupt, {} orphan sidecar(s)",
            directory.display(),
            entries.len(),
            entries.iter().filter(|rec| rec.corrupt.is_some()).count(),
            outcome.orphans.len()
        );

        Ok(Self {
            directory,
            entries,
            orphans: outcome.orphans,
        })
    }

    /// The directory this session is bound to.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// All records, in stable filename order.
    pub fn list(&self) -> &[EntityRecord] {
        &self.entries
    }

    /// Sidecar files found at scan time with no matching image.
    pub fn orphans(&self) -> &[PathBuf] {
        &self.orphans
    }

    /// Look up one record by entity id.
    pub fn get(&self, id: Uuid) -> StoreResult<&EntityRecord> {
        self.entries
            .iter()
            .find(|rec| rec.entity.id == id)
            .ok_or(StoreError::NotFound(id))
    }

    /// Stage one or more field edits in memory.
    ///
    /// The edits are applied to a copy and validated as a whole; a rejected
    /// batch leaves the entity untouched. Nothing is written to disk until
    /// [`commit`](Self::commit).
    pub fn update(
        &mut self,
        id: Uuid,
        changes: impl IntoIterator<Item = FieldChange>,
    ) -> StoreResult<ImageMetadata> {
        let idx = self.index_of(id)?;

        let mut next = self.entries[idx].entity.clone();
        for change in changes {
            match change {
                FieldChange::Author(value) => next.author = value,
                FieldChange::Universe(value) => next.universe = value,
                FieldChange::Characters(values) => next.characters = values,
                FieldChange::Tags(values) => next.tags = values,
            }
        }
        next.validate()?;

        let record = &mut self.entries[idx];
        record.entity = next.clone();
        record.dirty = true;
        Ok(next)
    }

    /// Reset an entity to the "no metadata" state, staged in memory.
    ///
    /// The next commit deletes the backing sidecar instead of writing an
    /// empty document.
    pub fn clear(&mut self, id: Uuid) -> StoreResult<ImageMetadata> {
        let idx = self.index_of(id)?;
        let record = &mut self.entries[idx];
        record.entity = ImageMetadata::blank(record.entity.id, record.entity.filename.clone());
        record.dirty = true;
        Ok(record.entity.clone())
    }

    /// Write an entity's current state to its sidecar file.
    ///
    /// A non-empty entity is serialized and written via temp-file-then-rename;
    /// an empty one has its sidecar deleted (a missing file is fine). On any
    /// I/O failure the in-memory state and the previous on-disk sidecar are
    /// both unchanged, and the edit stays staged for a retry.
    pub async fn commit(&mut self, id: Uuid) -> StoreResult<()> {
        let idx = self.index_of(id)?;
        let sidecar_path = self.entries[idx].sidecar_path.clone();

        if self.entries[idx].entity.is_empty() {
            match fs::remove_file(&sidecar_path).await {
                Ok(_) => debug!("removed sidecar {}", sidecar_path.display()),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!("sidecar {} already missing", sidecar_path.display());
                }
                Err(err) => return Err(StoreError::Io(err)),
            }
        } else {
            let document = codec::encode(&self.entries[idx].entity);
            write_atomic(&sidecar_path, document.as_bytes()).await?;
            debug!("wrote sidecar {}", sidecar_path.display());
        }

        let record = &mut self.entries[idx];
        record.on_disk = !record.entity.is_empty();
        record.dirty = false;
        record.corrupt = None;
        Ok(())
    }

    /// Remove an entity from the session and delete its sidecar file.
    ///
    /// The image file itself is never touched. After this the id is unknown
    /// to the session; a rescan of the directory yields a fresh blank entity
    /// for the still-present image.
    pub async fn delete(&mut self, id: Uuid) -> StoreResult<()> {
        let idx = self.index_of(id)?;
        let record = self.entries.remove(idx);

        match fs::remove_file(&record.sidecar_path).await {
            Ok(_) => debug!("removed sidecar {}", record.sidecar_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("sidecar {} already missing", record.sidecar_path.display());
            }
            Err(err) => {
                // Keep the session consistent with disk: the record stays
                // until its file is actually gone.
                self.entries.insert(idx, record);
                return Err(StoreError::Io(err));
            }
        }
        Ok(())
    }

    fn index_of(&self, id: Uuid) -> StoreResult<usize> {
        self.entries
            .iter()
            .position(|rec| rec.entity.id == id)
            .ok_or(StoreError::NotFound(id))
    }
}

/// Read and decode one sidecar file.
async fn load_sidecar(path: &Path) -> Result<ImageMetadata, ValidationError> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|err| ValidationError::Unreadable(err.to_string()))?;
    codec::decode(&text)
}

/// Write `contents` to `path` through a uniquely-named temporary sibling,
/// fsync, then rename into place. The parent directory is created on demand
/// in case it vanished between scan and commit.
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), io::Error> {
    let parent = path
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| io::Error::other("sidecar path missing parent directory"))?;
    fs::create_dir_all(&parent).await?;

    let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
    let mut file = File::create(&tmp_path).await?;

    if let Err(err) = file.write_all(contents).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(err);
    }
    if let Err(err) = file.flush().await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(err);
    }
    if let Err(err) = file.sync_all().await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(err);
    }
    drop(file);

    if let Err(err) = fs::rename(&tmp_path, path).await {
        if err.kind() == ErrorKind::AlreadyExists {
            if let Err(err) = fs::remove_file(path).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
            if let Err(err) = fs::rename(&tmp_path, path).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        } else {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }
    }
    Ok(())
}
