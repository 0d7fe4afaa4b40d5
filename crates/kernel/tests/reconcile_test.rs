#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Limited editor reconciliation tests.
//!
//! Runs submissions through the real services against a local store.

mod common;

use std::sync::Arc;

use common::{FailingMoveStore, TestMedia};
use mediafield_kernel::file::{
    ContentItemId, DEFAULT_ROOT_FOLDER, FileHandlingError, FileItem, FileStore, FolderLayout,
    LimitedEditorFileService, LocalFileStore, Phase, StoreError,
};
use mediafield_kernel::media_field::{FieldEditor, FieldUpdateError, MediaFieldSettings};
use mediafield_test_utils::{content_item_id, repeated_content_item_id};

fn new_item(path: &str) -> FileItem {
    FileItem {
        path: path.to_string(),
        is_new: true,
        is_removed: false,
    }
}

fn discarded_item(path: &str) -> FileItem {
    FileItem {
        path: path.to_string(),
        is_new: true,
        is_removed: true,
    }
}

fn removed_item(path: &str) -> FileItem {
    FileItem {
        path: path.to_string(),
        is_new: false,
        is_removed: true,
    }
}

async fn reconcile(
    media: &TestMedia,
    items: &mut [FileItem],
    id: &str,
) -> Result<Vec<String>, FileHandlingError> {
    let id = ContentItemId::parse(id)?;
    media
        .state
        .limited_editor()
        .handle_files_on_field_update(items, &id)
        .await
}

fn limited_settings() -> MediaFieldSettings {
    MediaFieldSettings {
        display_name: "Gallery".to_string(),
        editor: FieldEditor::Limited,
        required: false,
        multiple: true,
    }
}

// ── Dispositions ───────────────────────────────────────────────────

#[tokio::test]
async fn test_commit_moves_upload_to_shard_dir() {
    let media = TestMedia::new("reconcile_commit");
    let id = repeated_content_item_id('A');
    let staged = media.stage("photo.jpg", b"jpeg").await;

    let mut items = vec![new_item(&staged)];
    let paths = reconcile(&media, &mut items, &id).await.unwrap();

    let expected = format!("mediafields/{}/photo.jpg", ["AA"; 13].join("/"));
    assert_eq!(paths, vec![expected.clone()]);
    assert_eq!(items[0].path, expected);
    assert!(media.exists(&expected).await);
    assert!(!media.exists(&staged).await);
    assert_eq!(media.read(&expected).await, b"jpeg");
}

#[tokio::test]
async fn test_discarded_upload_is_deleted() {
    let media = TestMedia::new("reconcile_discard");
    let staged = media.stage("draft.png", b"png").await;

    let mut items = vec![discarded_item(&staged)];
    let paths = reconcile(&media, &mut items, &content_item_id())
        .await
        .unwrap();

    assert!(paths.is_empty());
    assert!(!media.exists(&staged).await);
}

#[tokio::test]
async fn test_removed_file_goes_to_trash_with_id_prefix() {
    let media = TestMedia::new("reconcile_trash");
    let id = content_item_id();
    let committed = format!("{}/old.pdf", media.shard_dir(&id));
    media.put(&committed, b"pdf").await;

    let mut items = vec![removed_item(&committed)];
    let paths = reconcile(&media, &mut items, &id).await.unwrap();

    assert!(paths.is_empty());
    assert!(!media.exists(&committed).await);
    let trashed = format!("mediafields/trash/{id}old.pdf");
    assert!(media.exists(&trashed).await);
    assert_eq!(media.read(&trashed).await, b"pdf");
}

#[tokio::test]
async fn test_trash_collision_is_versioned() {
    let media = TestMedia::new("reconcile_trash_versioned");
    let id = content_item_id();
    media
        .put(&format!("mediafields/trash/{id}old.pdf"), b"first")
        .await;
    let committed = format!("{}/old.pdf", media.shard_dir(&id));
    media.put(&committed, b"second").await;

    let mut items = vec![removed_item(&committed)];
    reconcile(&media, &mut items, &id).await.unwrap();

    let versioned = format!("mediafields/trash/{id}old-v-1.pdf");
    assert_eq!(media.read(&versioned).await, b"second");
    assert_eq!(
        media.read(&format!("mediafields/trash/{id}old.pdf")).await,
        b"first"
    );
}

#[tokio::test]
async fn test_kept_file_is_untouched() {
    let media = TestMedia::new("reconcile_keep");
    let id = content_item_id();
    let committed = format!("{}/keep.txt", media.shard_dir(&id));
    media.put(&committed, b"keep").await;

    let mut items = vec![FileItem::existing(&committed)];
    let paths = reconcile(&media, &mut items, &id).await.unwrap();

    assert_eq!(paths, vec![committed.clone()]);
    assert!(media.exists(&committed).await);
}

#[tokio::test]
async fn test_mixed_submission() {
    let media = TestMedia::new("reconcile_mixed");
    let id = content_item_id();
    let shard_dir = media.shard_dir(&id);

    let kept = format!("{shard_dir}/kept.txt");
    let removed = format!("{shard_dir}/removed.txt");
    media.put(&kept, b"kept").await;
    media.put(&removed, b"removed").await;
    let discarded = media.stage("discarded.txt", b"discarded").await;
    let added = media.stage("added.txt", b"added").await;

    let mut items = vec![
        FileItem::existing(&kept),
        removed_item(&removed),
        discarded_item(&discarded),
        new_item(&added),
    ];
    let paths = reconcile(&media, &mut items, &id).await.unwrap();

    assert_eq!(paths, vec![kept, format!("{shard_dir}/added.txt")]);
    assert!(!media.exists(&removed).await);
    assert!(!media.exists(&discarded).await);
    assert!(
        media
            .exists(&format!("mediafields/trash/{id}removed.txt"))
            .await
    );
}

// ── Naming ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_commit_collision_is_versioned() {
    let media = TestMedia::new("reconcile_collision");
    let id = repeated_content_item_id('B');
    let shard_dir = media.shard_dir(&id);
    media.put(&format!("{shard_dir}/photo.jpg"), b"existing").await;

    let staged = media.stage("photo.jpg", b"new").await;
    let mut items = vec![new_item(&staged)];
    let paths = reconcile(&media, &mut items, &id).await.unwrap();

    let versioned = format!("{shard_dir}/photo-v-1.jpg");
    assert_eq!(paths, vec![versioned.clone()]);
    assert_eq!(media.read(&versioned).await, b"new");
    assert_eq!(
        media.read(&format!("{shard_dir}/photo.jpg")).await,
        b"existing"
    );
}

#[tokio::test]
async fn test_same_name_twice_in_one_submission() {
    let media = TestMedia::new("reconcile_same_name");
    let id = content_item_id();
    let shard_dir = media.shard_dir(&id);

    let first = media.stage("scan.png", b"one").await;
    let second = media.stage("scan.png", b"two").await;
    let mut items = vec![new_item(&first), new_item(&second)];
    let paths = reconcile(&media, &mut items, &id).await.unwrap();

    assert_eq!(
        paths,
        vec![
            format!("{shard_dir}/scan.png"),
            format!("{shard_dir}/scan-v-1.png"),
        ]
    );
    assert_eq!(media.read(&paths[0]).await, b"one");
    assert_eq!(media.read(&paths[1]).await, b"two");
}

// ── Failures ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_removed_file_is_not_found() {
    let media = TestMedia::new("reconcile_missing");
    let id = content_item_id();
    let missing = format!("{}/gone.txt", media.shard_dir(&id));

    let mut items = vec![removed_item(&missing)];
    let err = reconcile(&media, &mut items, &id).await.unwrap_err();

    assert!(matches!(err, FileHandlingError::NotFound { .. }));
}

#[tokio::test]
async fn test_invalid_content_item_id() {
    let media = TestMedia::new("reconcile_bad_id");
    let staged = media.stage("photo.jpg", b"jpeg").await;

    let mut items = vec![new_item(&staged)];
    let err = reconcile(&media, &mut items, "tooshort").await.unwrap_err();
    assert!(matches!(err, FileHandlingError::InvalidArgument(_)));

    let err = reconcile(&media, &mut items, "../../../../../../../../../")
        .await
        .unwrap_err();
    assert!(matches!(err, FileHandlingError::InvalidArgument(_)));

    // Nothing moved
    assert!(media.exists(&staged).await);
}

#[tokio::test]
async fn test_new_item_outside_temp_is_rejected() {
    let media = TestMedia::new("reconcile_outside_temp");
    let id = content_item_id();
    let victim = "mediafields/trash/someone-elses.txt";
    media.put(victim, b"keep me").await;

    let mut items = vec![discarded_item(victim)];
    let err = reconcile(&media, &mut items, &id).await.unwrap_err();

    assert!(matches!(err, FileHandlingError::InvalidArgument(_)));
    assert!(media.exists(victim).await);
}

#[tokio::test]
async fn test_removed_item_outside_shard_dir_is_rejected() {
    let media = TestMedia::new("reconcile_removed_outside");
    let id = content_item_id();
    let library = "library/banner.png";
    let trashed = "mediafields/trash/other.png";
    let foreign = format!("{}/theirs.png", media.shard_dir(&content_item_id()));
    media.put(library, b"library").await;
    media.put(trashed, b"trashed").await;
    media.put(&foreign, b"foreign").await;

    for path in [library, trashed, foreign.as_str()] {
        let mut items = vec![removed_item(path)];
        let err = reconcile(&media, &mut items, &id).await.unwrap_err();
        assert!(
            matches!(err, FileHandlingError::InvalidArgument(_)),
            "{path} should be rejected"
        );
        assert!(media.exists(path).await);
    }
    assert!(
        !media
            .exists(&format!("mediafields/trash/{id}banner.png"))
            .await
    );
}

#[tokio::test]
async fn test_rejected_item_stops_the_whole_submission() {
    let media = TestMedia::new("reconcile_rejected_batch");
    let id = content_item_id();
    let staged = media.stage("photo.jpg", b"jpeg").await;
    media.put("library/banner.png", b"library").await;

    let mut items = vec![new_item(&staged), removed_item("library/banner.png")];
    let err = reconcile(&media, &mut items, &id).await.unwrap_err();

    assert!(matches!(err, FileHandlingError::InvalidArgument(_)));
    assert!(media.exists(&staged).await);
    assert_eq!(items[0].path, staged);
}

#[tokio::test]
async fn test_discarding_missing_upload_succeeds() {
    let media = TestMedia::new("reconcile_discard_missing");
    let staged = media.stage("gone.png", b"png").await;
    media.store().try_delete_file(&staged).await.unwrap();

    let mut items = vec![discarded_item(&staged)];
    let paths = reconcile(&media, &mut items, &content_item_id())
        .await
        .unwrap();

    assert!(paths.is_empty());
}

#[tokio::test]
async fn test_committing_missing_upload_is_not_found() {
    let media = TestMedia::new("reconcile_commit_missing");
    let staged = media.stage("gone.png", b"png").await;
    media.store().try_delete_file(&staged).await.unwrap();

    let mut items = vec![new_item(&staged)];
    let err = reconcile(&media, &mut items, &content_item_id())
        .await
        .unwrap_err();

    match err {
        FileHandlingError::NotFound { path } => assert_eq!(path, staged),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

/// Limited editor service over a store whose moves fail for `failing_names`.
fn failing_service(media: &TestMedia, failing_names: &[&str]) -> LimitedEditorFileService {
    let store: Arc<dyn FileStore> = Arc::new(FailingMoveStore::new(
        LocalFileStore::new(media.dir.path()),
        failing_names,
    ));
    let layout = FolderLayout::new(DEFAULT_ROOT_FOLDER, store.as_ref());
    LimitedEditorFileService::new(store, layout)
}

#[tokio::test]
async fn test_commit_failures_are_aggregated_per_phase() {
    let media = TestMedia::new("reconcile_phase_failures");
    let id = ContentItemId::parse(&content_item_id()).unwrap();
    let shard_dir = media.shard_dir(id.as_str());
    let service = failing_service(&media, &["b.png", "c.png"]);

    let a = media.stage("a.png", b"a").await;
    let b = media.stage("b.png", b"b").await;
    let c = media.stage("c.png", b"c").await;
    let mut items = vec![new_item(&a), new_item(&b), new_item(&c)];

    let err = service
        .handle_files_on_field_update(&mut items, &id)
        .await
        .unwrap_err();

    match err {
        FileHandlingError::Phase { phase, failures } => {
            assert_eq!(phase, Phase::Commit);
            assert_eq!(failures.len(), 2);
            assert!(
                failures
                    .iter()
                    .all(|f| matches!(f, FileHandlingError::Storage(StoreError::Io { .. })))
            );
        }
        other => panic!("expected a commit phase failure, got {other:?}"),
    }

    // The move that succeeded is reflected; the failed ones keep their temp paths
    assert_eq!(items[0].path, format!("{shard_dir}/a.png"));
    assert!(media.exists(&items[0].path).await);
    assert_eq!(items[1].path, b);
    assert_eq!(items[2].path, c);
    assert!(media.exists(&b).await);
    assert!(media.exists(&c).await);
}

#[tokio::test]
async fn test_single_failure_is_returned_as_is() {
    let media = TestMedia::new("reconcile_single_failure");
    let id = ContentItemId::parse(&content_item_id()).unwrap();
    let service = failing_service(&media, &["b.png"]);

    let a = media.stage("a.png", b"a").await;
    let b = media.stage("b.png", b"b").await;
    let mut items = vec![new_item(&a), new_item(&b)];

    let err = service
        .handle_files_on_field_update(&mut items, &id)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FileHandlingError::Storage(StoreError::Io { .. })
    ));
    assert_eq!(items[0].path, format!("{}/a.png", media.shard_dir(id.as_str())));
    assert_eq!(items[1].path, b);
}

// ── Field service ──────────────────────────────────────────────────

#[tokio::test]
async fn test_field_update_commits_and_validates() {
    let media = TestMedia::new("field_update");
    let id = content_item_id();
    let staged = media.stage("cover.jpg", b"cover").await;
    let submitted = serde_json::json!([{ "path": staged, "isNew": true }]).to_string();

    let outcome = media
        .state
        .media_fields()
        .update(&limited_settings(), &submitted, &id)
        .await
        .unwrap();

    assert!(outcome.is_valid());
    assert_eq!(
        outcome.field.paths,
        vec![format!("{}/cover.jpg", media.shard_dir(&id))]
    );
}

#[tokio::test]
async fn test_field_update_required() {
    let media = TestMedia::new("field_required");
    let settings = MediaFieldSettings {
        required: true,
        ..limited_settings()
    };

    let outcome = media
        .state
        .media_fields()
        .update(&settings, "[]", &content_item_id())
        .await
        .unwrap();

    assert_eq!(
        outcome.errors,
        vec![FieldUpdateError::Required("Gallery".to_string())]
    );
    assert_eq!(outcome.errors[0].to_string(), "Gallery: A media is required.");
}

#[tokio::test]
async fn test_field_update_multiple_forbidden() {
    let media = TestMedia::new("field_multiple");
    let settings = MediaFieldSettings {
        editor: FieldEditor::Full,
        multiple: false,
        ..limited_settings()
    };
    let submitted = r#"[{"path":"a.jpg"},{"path":"b.jpg"}]"#;

    let outcome = media
        .state
        .media_fields()
        .update(&settings, submitted, &content_item_id())
        .await
        .unwrap();

    assert_eq!(
        outcome.errors,
        vec![FieldUpdateError::MultipleForbidden("Gallery".to_string())]
    );
}

#[tokio::test]
async fn test_field_update_reports_file_errors_without_paths() {
    let media = TestMedia::new("field_file_error");
    let id = content_item_id();
    let missing = format!("{}/gone.txt", media.shard_dir(&id));
    let submitted = serde_json::json!([{ "path": missing, "isRemoved": true }]).to_string();

    let outcome = media
        .state
        .media_fields()
        .update(&limited_settings(), &submitted, &id)
        .await
        .unwrap();

    assert!(!outcome.is_valid());
    let message = outcome.errors[0].to_string();
    assert_eq!(message, "Gallery: There was an error handling the files.");
    assert!(!message.contains("gone.txt"));
}

#[tokio::test]
async fn test_full_editor_does_not_touch_files() {
    let media = TestMedia::new("field_full");
    let staged = media.stage("raw.bin", b"raw").await;
    let settings = MediaFieldSettings {
        editor: FieldEditor::Full,
        ..limited_settings()
    };
    let submitted = serde_json::json!([{ "path": staged, "isNew": true }]).to_string();

    let outcome = media
        .state
        .media_fields()
        .update(&settings, &submitted, "not-an-id")
        .await
        .unwrap();

    assert!(outcome.is_valid());
    assert_eq!(outcome.field.paths, vec![staged.clone()]);
    assert!(media.exists(&staged).await);
}

#[tokio::test]
async fn test_invalid_submission_json() {
    let media = TestMedia::new("field_bad_json");
    let result = media
        .state
        .media_fields()
        .update(&limited_settings(), "{not json", &content_item_id())
        .await;
    assert!(result.is_err());
}
