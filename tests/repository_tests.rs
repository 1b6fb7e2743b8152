//! Directory-session behavior of `MetadataRepository`: loading, isolation
//! of corrupt sidecars, staged edits, atomic commits, clears, and deletes.

use std::fs;
use std::path::Path;

use sidecar_store::codec;
use sidecar_store::errors::{StoreError, ValidationError};
use sidecar_store::{FieldChange, ImageMetadata, MetadataRepository};
use tempfile::tempdir;
use uuid::Uuid;

/// Create an image file plus a sidecar serialized from `entity`.
fn seed(dir: &Path, image: &str, entity: &ImageMetadata) {
    fs::write(dir.join(image), b"imagebytes").unwrap();
    let sidecar = Path::new(image).with_extension("xml");
    fs::write(dir.join(sidecar), codec::encode(entity)).unwrap();
}

fn tagged(image: &str) -> ImageMetadata {
    ImageMetadata {
        id: Uuid::new_v4(),
        filename: image.into(),
        author: Some("someone".into()),
        universe: Some("somewhere".into()),
        characters: vec!["hero".into()],
        tags: vec!["test".into()],
    }
}

#[tokio::test]
async fn open_loads_existing_sidecars() {
    let dir = tempdir().unwrap();
    let entity = tagged("a.png");
    seed(dir.path(), "a.png", &entity);

    let repo = MetadataRepository::open(dir.path()).await.unwrap();
    assert_eq!(repo.list().len(), 1);

    let rec = &repo.list()[0];
    assert_eq!(rec.entity, entity);
    assert!(rec.on_disk);
    assert!(!rec.dirty);
    assert!(rec.corrupt.is_none());
}

#[tokio::test]
async fn image_without_sidecar_gets_a_blank_entity_and_no_file() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("b.jpg"), b"img").unwrap();

    let repo = MetadataRepository::open(dir.path()).await.unwrap();
    let rec = &repo.list()[0];
    assert_eq!(rec.entity.filename, "b.jpg");
    assert!(rec.entity.is_empty());
    assert!(!rec.on_disk);
    // "No metadata yet" is never persisted until the first edit.
    assert!(!dir.path().join("b.xml").exists());
}

#[tokio::test]
async fn one_malformed_sidecar_does_not_fail_the_open() {
    let dir = tempdir().unwrap();
    seed(dir.path(), "a.png", &tagged("a.png"));
    seed(dir.path(), "c.png", &tagged("c.png"));
    fs::write(dir.path().join("b.png"), b"img").unwrap();
    fs::write(dir.path().join("b.xml"), b"<image id=>not xml").unwrap();

    let repo = MetadataRepository::open(dir.path()).await.unwrap();
    assert_eq!(repo.list().len(), 3);

    let corrupt: Vec<_> = repo
        .list()
        .iter()
        .filter(|rec| rec.corrupt.is_some())
        .collect();
    assert_eq!(corrupt.len(), 1);
    assert_eq!(corrupt[0].entity.filename, "b.png");
    assert!(corrupt[0].entity.is_empty());
}

#[tokio::test]
async fn duplicate_id_marks_the_second_sidecar_corrupt() {
    let dir = tempdir().unwrap();
    let mut first = tagged("a.png");
    first.id = Uuid::parse_str("6f1c8a34-2b0a-4f6e-9c3d-8f4a5b6c7d8e").unwrap();
    let mut second = first.clone();
    second.filename = "b.png".into();
    seed(dir.path(), "a.png", &first);
    seed(dir.path(), "b.png", &second);

    let repo = MetadataRepository::open(dir.path()).await.unwrap();
    let a = &repo.list()[0];
    let b = &repo.list()[1];
    assert!(a.corrupt.is_none());
    assert_eq!(b.corrupt, Some(ValidationError::DuplicateId(first.id)));
    // The corrupt record got a fresh id so the session invariant holds.
    assert_ne!(b.entity.id, first.id);
}

#[tokio::test]
async fn filename_mismatch_marks_the_sidecar_corrupt() {
    let dir = tempdir().unwrap();
    let entity = tagged("other.png");
    fs::write(dir.path().join("a.png"), b"img").unwrap();
    fs::write(dir.path().join("a.xml"), codec::encode(&entity)).unwrap();

    let repo = MetadataRepository::open(dir.path()).await.unwrap();
    assert!(matches!(
        repo.list()[0].corrupt,
        Some(ValidationError::FilenameMismatch { .. })
    ));
}

#[tokio::test]
async fn update_stages_in_memory_and_commit_persists() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.png"), b"img").unwrap();

    let mut repo = MetadataRepository::open(dir.path()).await.unwrap();
    let id = repo.list()[0].entity.id;

    repo.update(
        id,
        [
            FieldChange::Author(Some("me".into())),
            FieldChange::Tags(vec!["one".into(), "two".into()]),
        ],
    )
    .unwrap();

    // Staged only: nothing on disk yet.
    assert!(repo.get(id).unwrap().dirty);
    assert!(!dir.path().join("a.xml").exists());

    repo.commit(id).await.unwrap();
    let rec = repo.get(id).unwrap();
    assert!(!rec.dirty);
    assert!(rec.on_disk);

    let written = fs::read_to_string(dir.path().join("a.xml")).unwrap();
    let decoded = codec::decode(&written).unwrap();
    assert_eq!(decoded, rec.entity);
    assert_eq!(decoded.author.as_deref(), Some("me"));
    assert_eq!(decoded.tags, vec!["one".to_string(), "two".to_string()]);
}

#[tokio::test]
async fn commit_is_idempotent_byte_for_byte() {
    let dir = tempdir().unwrap();
    seed(dir.path(), "a.png", &tagged("a.png"));

    let mut repo = MetadataRepository::open(dir.path()).await.unwrap();
    let id = repo.list()[0].entity.id;

    repo.commit(id).await.unwrap();
    let first = fs::read(dir.path().join("a.xml")).unwrap();
    repo.commit(id).await.unwrap();
    let second = fs::read(dir.path().join("a.xml")).unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn update_rejects_blank_entries() {
    let dir = tempdir().unwrap();
    seed(dir.path(), "a.png", &tagged("a.png"));

    let mut repo = MetadataRepository::open(dir.path()).await.unwrap();
    let id = repo.list()[0].entity.id;
    let before = repo.get(id).unwrap().entity.clone();

    let err = repo
        .update(id, [FieldChange::Characters(vec!["ok".into(), "  ".into()])])
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Validation(ValidationError::BlankValue("characters"))
    ));

    // Rejected batch leaves the entity untouched and unstaged.
    let rec = repo.get(id).unwrap();
    assert_eq!(rec.entity, before);
    assert!(!rec.dirty);
}

#[tokio::test]
async fn clear_then_commit_deletes_the_sidecar() {
    let dir = tempdir().unwrap();
    seed(dir.path(), "a.png", &tagged("a.png"));

    let mut repo = MetadataRepository::open(dir.path()).await.unwrap();
    let id = repo.list()[0].entity.id;

    repo.clear(id).unwrap();
    // Clear is staged too; the file survives until commit.
    assert!(dir.path().join("a.xml").exists());

    repo.commit(id).await.unwrap();
    assert!(!dir.path().join("a.xml").exists());
    let rec = repo.get(id).unwrap();
    assert!(rec.entity.is_empty());
    assert!(!rec.on_disk);

    // Committing the still-empty entity again is fine.
    repo.commit(id).await.unwrap();
    assert!(!dir.path().join("a.xml").exists());
}

#[tokio::test]
async fn delete_removes_record_and_sidecar_but_not_the_image() {
    let dir = tempdir().unwrap();
    seed(dir.path(), "a.png", &tagged("a.png"));

    let mut repo = MetadataRepository::open(dir.path()).await.unwrap();
    let id = repo.list()[0].entity.id;

    repo.delete(id).await.unwrap();
    assert!(repo.list().is_empty());
    assert!(!dir.path().join("a.xml").exists());
    assert!(dir.path().join("a.png").exists());
    assert!(matches!(repo.get(id), Err(StoreError::NotFound(_))));

    // A rescan sees the image again with a fresh blank entity.
    let repo = MetadataRepository::open(dir.path()).await.unwrap();
    assert_eq!(repo.list().len(), 1);
    assert!(repo.list()[0].entity.is_empty());
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let dir = tempdir().unwrap();
    let mut repo = MetadataRepository::open(dir.path()).await.unwrap();
    let ghost = Uuid::new_v4();

    assert!(matches!(repo.get(ghost), Err(StoreError::NotFound(id)) if id == ghost));
    assert!(matches!(
        repo.update(ghost, [FieldChange::Author(None)]),
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(repo.commit(ghost).await, Err(StoreError::NotFound(_))));
    assert!(matches!(repo.clear(ghost), Err(StoreError::NotFound(_))));
    assert!(matches!(repo.delete(ghost).await, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn corrupt_record_becomes_clean_after_edit_and_commit() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.png"), b"img").unwrap();
    fs::write(dir.path().join("a.xml"), b"<garbage/>").unwrap();

    let mut repo = MetadataRepository::open(dir.path()).await.unwrap();
    let rec = &repo.list()[0];
    assert_eq!(
        rec.corrupt,
        Some(ValidationError::UnexpectedRoot("garbage".into()))
    );
    let id = rec.entity.id;

    repo.update(id, [FieldChange::Author(Some("fixer".into()))])
        .unwrap();
    repo.commit(id).await.unwrap();

    let rec = repo.get(id).unwrap();
    assert!(rec.corrupt.is_none());
    let decoded = codec::decode(&fs::read_to_string(dir.path().join("a.xml")).unwrap()).unwrap();
    assert_eq!(decoded.author.as_deref(), Some("fixer"));
}

#[tokio::test]
async fn commit_recreates_a_directory_removed_after_the_scan() {
    let dir = tempdir().unwrap();
    let gallery = dir.path().join("gallery");
    fs::create_dir(&gallery).unwrap();
    fs::write(gallery.join("a.png"), b"img").unwrap();

    let mut repo = MetadataRepository::open(&gallery).await.unwrap();
    let id = repo.list()[0].entity.id;
    repo.update(id, [FieldChange::Tags(vec!["late".into()])])
        .unwrap();

    // The directory disappears between scan and commit.
    fs::remove_dir_all(&gallery).unwrap();

    repo.commit(id).await.unwrap();
    assert!(gallery.join("a.xml").exists());
}

#[tokio::test]
async fn failed_commit_surfaces_io_and_keeps_the_edit_staged() {
    let dir = tempdir().unwrap();
    let gallery = dir.path().join("gallery");
    fs::create_dir(&gallery).unwrap();
    fs::write(gallery.join("a.png"), b"img").unwrap();

    let mut repo = MetadataRepository::open(&gallery).await.unwrap();
    let id = repo.list()[0].entity.id;
    repo.update(id, [FieldChange::Author(Some("edited".into()))])
        .unwrap();

    // The session directory becomes a plain file, so the write cannot land.
    fs::remove_dir_all(&gallery).unwrap();
    fs::write(&gallery, b"not a directory").unwrap();

    let err = repo.commit(id).await.unwrap_err();
    assert!(matches!(err, StoreError::Io(_)), "{err:?}");

    // The edit is still staged for a retry.
    let rec = repo.get(id).unwrap();
    assert!(rec.dirty);
    assert!(!rec.on_disk);
    assert_eq!(rec.entity.author.as_deref(), Some("edited"));
}

#[tokio::test]
async fn failed_commit_leaves_disk_untouched_and_no_temp_files() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.png"), b"img").unwrap();
    // The sidecar path is occupied by a non-empty directory, so the final
    // rename cannot succeed.
    fs::create_dir(dir.path().join("a.xml")).unwrap();
    fs::write(dir.path().join("a.xml").join("keep.txt"), b"keep").unwrap();

    let mut repo = MetadataRepository::open(dir.path()).await.unwrap();
    let id = repo.list()[0].entity.id;
    repo.update(id, [FieldChange::Tags(vec!["late".into()])])
        .unwrap();

    let err = repo.commit(id).await.unwrap_err();
    assert!(matches!(err, StoreError::Io(_)), "{err:?}");

    let rec = repo.get(id).unwrap();
    assert!(rec.dirty);
    assert_eq!(rec.entity.tags, vec!["late".to_string()]);

    // Whatever occupied the path is untouched, and the temporary file was
    // cleaned up.
    assert_eq!(
        fs::read(dir.path().join("a.xml").join("keep.txt")).unwrap(),
        b"keep"
    );
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".tmp-"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[tokio::test]
async fn failed_delete_keeps_the_record() {
    let dir = tempdir().unwrap();
    let gallery = dir.path().join("gallery");
    fs::create_dir(&gallery).unwrap();
    seed(&gallery, "a.png", &tagged("a.png"));

    let mut repo = MetadataRepository::open(&gallery).await.unwrap();
    let id = repo.list()[0].entity.id;

    fs::remove_dir_all(&gallery).unwrap();
    fs::write(&gallery, b"not a directory").unwrap();

    let err = repo.delete(id).await.unwrap_err();
    assert!(matches!(err, StoreError::Io(_)), "{err:?}");

    // The session still knows the entity until its file is actually gone.
    assert_eq!(repo.list().len(), 1);
    assert!(repo.get(id).is_ok());
}

#[tokio::test]
async fn orphan_sidecars_are_reported_and_left_alone() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("stray.xml"), b"<image/>").unwrap();

    let repo = MetadataRepository::open(dir.path()).await.unwrap();
    assert!(repo.list().is_empty());
    assert_eq!(repo.orphans(), vec![dir.path().join("stray.xml")]);
    assert!(dir.path().join("stray.xml").exists());
}
