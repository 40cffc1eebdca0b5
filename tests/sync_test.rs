//! Sync and cleanup passes against a mocked Gaudeam instance.

mod common;

use common::*;
use igitur::{sync, IgiturError, ResizedImageUploader, VerbatimNaming};
use image::{Rgb, RgbImage};
use serde_json::json;
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_upload_skips_files_already_present() {
    let server = MockServer::start().await;
    mount_properties(&server, 1, folder_entry(1, "Fotos")).await;
    mount_listing(&server, 1, vec![file_entry(10, "a.jpg"), file_entry(11, "b.jpg")]).await;
    mount_upload_flow(&server, 0).await;

    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.jpg"), b"a").unwrap();
    fs::write(dir.path().join("b.jpg"), b"b").unwrap();

    let mut folder = open(&server, 1).await;
    let report = sync::upload_folder(dir.path(), &mut folder).await.unwrap();
    assert_eq!(report.uploaded, 0);
    assert_eq!(report.skipped, 2);
}

#[tokio::test]
async fn test_upload_only_sends_missing_files() {
    let server = MockServer::start().await;
    mount_properties(&server, 1, folder_entry(1, "Fotos")).await;
    mount_listing(&server, 1, vec![file_entry(10, "a.jpg")]).await;
    mount_upload_flow(&server, 1).await;

    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.jpg"), b"a").unwrap();
    fs::write(dir.path().join("c.jpg"), b"c").unwrap();

    let mut folder = open(&server, 1).await;
    let report = sync::upload_folder(dir.path(), &mut folder).await.unwrap();
    assert_eq!((report.uploaded, report.skipped), (1, 1));
}

#[tokio::test]
async fn test_upload_creates_missing_sub_folders() {
    let server = MockServer::start().await;
    mount_properties(
        &server,
        1,
        json!({"id": 1, "type": "Folder", "name": "Fotos", "owner_type": "GroupMember", "owner_id": 9}),
    )
    .await;
    mount_listing(&server, 1, vec![folder_entry(2, "2023")]).await;
    mount_listing(&server, 2, vec![file_entry(20, "old.jpg")]).await;
    mount_properties(&server, 7, folder_entry(7, "2024")).await;
    mount_listing(&server, 7, Vec::new()).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/drive/folders"))
        .and(body_partial_json(json!({"inode": {
            "name": "2024",
            "parent_id": "1",
            "owner_type": "GroupMember",
            "owner_id": 9,
            "restrict_to_id": null
        }})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7})))
        .expect(1)
        .mount(&server)
        .await;
    mount_upload_flow(&server, 1).await;

    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("2023")).unwrap();
    fs::write(dir.path().join("2023").join("old.jpg"), b"old").unwrap();
    fs::create_dir_all(dir.path().join("2024")).unwrap();
    fs::write(dir.path().join("2024").join("new.jpg"), b"new").unwrap();

    let mut folder = open(&server, 1).await;
    let report = sync::upload_folder(dir.path(), &mut folder).await.unwrap();
    assert_eq!(report.folders_created, 1);
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn test_upload_stops_at_first_failure() {
    let server = MockServer::start().await;
    mount_properties(&server, 1, folder_entry(1, "Fotos")).await;
    mount_listing(&server, 1, Vec::new()).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/drive/sign"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.jpg"), b"a").unwrap();
    fs::write(dir.path().join("b.jpg"), b"b").unwrap();

    let mut folder = open(&server, 1).await;
    let err = sync::upload_folder(dir.path(), &mut folder).await.unwrap_err();
    assert!(matches!(err, IgiturError::Remote { .. }));
}

#[tokio::test]
async fn test_upload_from_missing_directory() {
    let server = MockServer::start().await;
    let mut folder = empty_folder(&server, 1, "Fotos").await;

    let result = sync::upload_folder(std::path::Path::new("/nonexistent/source"), &mut folder).await;
    assert!(matches!(result, Err(IgiturError::Filesystem(_))));
}

#[tokio::test]
async fn test_download_mirrors_tree_and_keeps_existing_files() {
    let server = MockServer::start().await;
    mount_properties(&server, 1, folder_entry(1, "Fotos")).await;
    mount_listing(
        &server,
        1,
        vec![folder_entry(52, "sub"), file_entry(50, "a.jpg"), file_entry(51, "b.jpg")],
    )
    .await;
    mount_listing(&server, 52, vec![file_entry(53, "c.jpg")]).await;

    for (id, body, times) in [(50, "remote a", 0), (51, "remote b", 1), (53, "remote c", 1)] {
        Mock::given(method("GET"))
            .and(path(format!("/drive/uploaded_files/{id}/download")))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(times)
            .mount(&server)
            .await;
    }

    let dir = TempDir::new().unwrap();
    let local = dir.path().join("mirror");
    fs::create_dir_all(&local).unwrap();
    fs::write(local.join("a.jpg"), b"local a").unwrap();

    let folder = open(&server, 1).await;
    let report = sync::download_folder(&folder, &local).await.unwrap();
    assert_eq!((report.downloaded, report.skipped), (2, 1));
    assert_eq!(fs::read_to_string(local.join("a.jpg")).unwrap(), "local a");
    assert_eq!(fs::read_to_string(local.join("b.jpg")).unwrap(), "remote b");
    assert_eq!(fs::read_to_string(local.join("sub").join("c.jpg")).unwrap(), "remote c");
}

#[tokio::test]
async fn test_download_ignores_unsafe_names() {
    let server = MockServer::start().await;
    mount_properties(&server, 1, folder_entry(1, "Fotos")).await;
    mount_listing(
        &server,
        1,
        vec![folder_entry(60, ".."), file_entry(61, "../escape.jpg")],
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/drive/uploaded_files/61/download"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let local = dir.path().join("mirror");
    let folder = open(&server, 1).await;
    let report = sync::download_folder(&folder, &local).await.unwrap();
    assert_eq!(report.downloaded, 0);
    assert!(!dir.path().join("escape.jpg").exists());
}

#[tokio::test]
async fn test_dedup_keeps_first_of_each_name() {
    let server = MockServer::start().await;
    mount_properties(&server, 1, folder_entry(1, "Fotos")).await;
    mount_listing(
        &server,
        1,
        vec![
            folder_entry(10, "A"),
            folder_entry(11, "A"),
            folder_entry(12, "B"),
            file_entry(20, "x.jpg"),
            file_entry(21, "x.jpg"),
            file_entry(22, "x.jpg"),
            file_entry(23, "y.jpg"),
        ],
    )
    .await;
    for id in [10, 11, 12] {
        mount_listing(&server, id, Vec::new()).await;
    }

    expect_delete(&server, "/api/v1/drive/folders/11").await;
    expect_delete(&server, "/api/v1/drive/uploaded_files/21").await;
    expect_delete(&server, "/api/v1/drive/uploaded_files/22").await;
    forbid_other_deletes(&server).await;

    let folder = open(&server, 1).await;
    let report = sync::delete_duplicates(&folder, false).await.unwrap();
    assert_eq!(report.removed, 3);
    assert!(report.is_success());
}

#[tokio::test]
async fn test_dedup_dry_run_deletes_nothing() {
    let server = MockServer::start().await;
    mount_properties(&server, 1, folder_entry(1, "Fotos")).await;
    mount_listing(&server, 1, vec![file_entry(20, "x.jpg"), file_entry(21, "x.jpg")]).await;
    forbid_other_deletes(&server).await;

    let folder = open(&server, 1).await;
    let report = sync::delete_duplicates(&folder, true).await.unwrap();
    assert_eq!(report.removed, 1);
}

#[tokio::test]
async fn test_prune_empty_cascades_to_root() {
    let server = MockServer::start().await;
    mount_properties(&server, 1, folder_entry(1, "Fotos")).await;
    // The first listing of the root still shows the empty sub-folder
    Mock::given(method("GET"))
        .and(path("/api/v1/drive/folders"))
        .and(query_param("parent_id", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [folder_entry(30, "leer")]})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_listing(&server, 1, Vec::new()).await;
    mount_listing(&server, 30, Vec::new()).await;

    expect_delete(&server, "/api/v1/drive/folders/30").await;
    expect_delete(&server, "/api/v1/drive/folders/1").await;
    forbid_other_deletes(&server).await;

    let folder = open(&server, 1).await;
    let report = sync::prune_empty_folders(&folder, false).await.unwrap();
    assert_eq!(report.removed, 2);
}

#[tokio::test]
async fn test_prune_empty_keeps_folders_with_files() {
    let server = MockServer::start().await;
    mount_properties(&server, 1, folder_entry(1, "Fotos")).await;
    mount_listing(&server, 1, vec![folder_entry(30, "leer"), folder_entry(31, "voll")]).await;
    mount_listing(&server, 30, Vec::new()).await;
    mount_listing(&server, 31, vec![file_entry(32, "a.jpg")]).await;

    expect_delete(&server, "/api/v1/drive/folders/30").await;
    forbid_other_deletes(&server).await;

    let folder = open(&server, 1).await;
    let report = sync::prune_empty_folders(&folder, false).await.unwrap();
    assert_eq!(report.removed, 1);
}

async fn mount_orphan_tree(server: &MockServer) {
    mount_properties(server, 1, folder_entry(1, "Fotos")).await;
    mount_listing(
        server,
        1,
        vec![
            folder_entry(40, "keep"),
            folder_entry(41, "gone"),
            file_entry(102, "photo.jpg"),
            file_entry(103, "orphan.jpg"),
        ],
    )
    .await;
    mount_listing(server, 40, vec![file_entry(104, "a.jpg")]).await;
}

fn orphan_source() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("photo.jpg"), b"p").unwrap();
    fs::create_dir_all(dir.path().join("keep")).unwrap();
    fs::write(dir.path().join("keep").join("a.jpg"), b"a").unwrap();
    dir
}

#[tokio::test]
async fn test_orphans_are_deleted() {
    let server = MockServer::start().await;
    mount_orphan_tree(&server).await;
    expect_delete(&server, "/api/v1/drive/folders/41").await;
    expect_delete(&server, "/api/v1/drive/uploaded_files/103").await;
    forbid_other_deletes(&server).await;

    let source = orphan_source();
    let folder = open(&server, 1).await;
    let report = sync::prune_remote_orphans(source.path(), &folder, &VerbatimNaming, false)
        .await
        .unwrap();
    assert_eq!(report.removed, 2);
}

#[tokio::test]
async fn test_orphan_dry_run_reaches_sub_folders() {
    let server = MockServer::start().await;
    mount_orphan_tree(&server).await;
    forbid_other_deletes(&server).await;

    let source = orphan_source();
    fs::remove_file(source.path().join("keep").join("a.jpg")).unwrap();

    let folder = open(&server, 1).await;
    let report = sync::prune_remote_orphans(source.path(), &folder, &VerbatimNaming, true)
        .await
        .unwrap();
    // gone/, orphan.jpg and keep/a.jpg
    assert_eq!(report.removed, 3);
}

#[tokio::test]
async fn test_resized_upload_skips_existing_targets() {
    let server = MockServer::start().await;
    mount_properties(&server, 1, folder_entry(1, "Fotos")).await;
    mount_listing(&server, 1, vec![file_entry(10, "photo.jpg")]).await;
    mount_upload_flow(&server, 0).await;

    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("photo.PNG"), b"never decoded").unwrap();
    fs::write(dir.path().join("photo.JPEG"), b"never decoded").unwrap();
    fs::write(dir.path().join("clip.mov"), b"video").unwrap();

    let mut folder = open(&server, 1).await;
    let report = ResizedImageUploader::default()
        .upload_folder_resized(dir.path(), &mut folder)
        .await
        .unwrap();
    assert_eq!((report.uploaded, report.skipped), (0, 3));
}

#[tokio::test]
async fn test_resized_upload_sends_one_jpeg_per_stem() {
    let server = MockServer::start().await;
    mount_properties(&server, 1, folder_entry(1, "Fotos")).await;
    mount_listing(&server, 1, Vec::new()).await;
    mount_upload_flow(&server, 1).await;

    let dir = TempDir::new().unwrap();
    let img = RgbImage::from_pixel(64, 48, Rgb([200, 10, 10]));
    img.save(dir.path().join("bild.jpeg")).unwrap();
    img.save(dir.path().join("bild.png")).unwrap();
    fs::write(dir.path().join("bild_komprimiert.jpg"), b"skipped by name").unwrap();

    let mut folder = open(&server, 1).await;
    let report = ResizedImageUploader::default()
        .with_skip_file_names(["komprimiert"])
        .upload_folder_resized(dir.path(), &mut folder)
        .await
        .unwrap();
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.skipped, 2);

    let requests = server.received_requests().await.unwrap();
    let registered = requests
        .iter()
        .find(|r| r.url.path() == "/api/v1/drive/uploaded_files")
        .unwrap();
    let body: serde_json::Value = registered.body_json().unwrap();
    assert_eq!(body["inode"]["name"], "bild");
    assert_eq!(body["inode"]["content_type"], "image/jpeg");
}

#[tokio::test]
async fn test_resized_orphans_use_jpg_names() {
    let server = MockServer::start().await;
    mount_properties(&server, 1, folder_entry(1, "Fotos")).await;
    mount_listing(
        &server,
        1,
        vec![file_entry(70, "bild.jpg"), file_entry(71, "bild.png"), file_entry(72, "alt.jpg")],
    )
    .await;
    expect_delete(&server, "/api/v1/drive/uploaded_files/71").await;
    expect_delete(&server, "/api/v1/drive/uploaded_files/72").await;
    forbid_other_deletes(&server).await;

    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bild.png"), b"p").unwrap();

    let folder = open(&server, 1).await;
    let report = ResizedImageUploader::default()
        .delete_remote_orphans(dir.path(), &folder, false)
        .await
        .unwrap();
    assert_eq!(report.removed, 2);
}

#[cfg(unix)]
#[tokio::test]
async fn test_dangling_symlink_does_not_stop_the_walk() {
    let server = MockServer::start().await;
    mount_properties(&server, 1, folder_entry(1, "Fotos")).await;
    mount_listing(&server, 1, vec![file_entry(10, "a.jpg"), file_entry(11, "stale.jpg")]).await;
    mount_upload_flow(&server, 0).await;
    expect_delete(&server, "/api/v1/drive/uploaded_files/11").await;
    forbid_other_deletes(&server).await;

    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.jpg"), b"a").unwrap();
    std::os::unix::fs::symlink("/nonexistent/target", dir.path().join("broken.jpg")).unwrap();

    let mut folder = open(&server, 1).await;
    let report = sync::upload_folder(dir.path(), &mut folder).await.unwrap();
    assert_eq!((report.uploaded, report.skipped), (0, 1));

    let report = sync::prune_remote_orphans(dir.path(), &folder, &VerbatimNaming, false)
        .await
        .unwrap();
    assert_eq!(report.removed, 1);
}

#[tokio::test]
async fn test_failed_delete_is_counted_and_cleanup_continues() {
    let server = MockServer::start().await;
    mount_properties(&server, 1, folder_entry(1, "Fotos")).await;
    mount_listing(
        &server,
        1,
        vec![
            file_entry(20, "x.jpg"),
            file_entry(21, "x.jpg"),
            file_entry(22, "x.jpg"),
            file_entry(23, "y.jpg"),
            file_entry(24, "y.jpg"),
        ],
    )
    .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/drive/uploaded_files/21"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;
    expect_delete(&server, "/api/v1/drive/uploaded_files/22").await;
    expect_delete(&server, "/api/v1/drive/uploaded_files/24").await;
    forbid_other_deletes(&server).await;

    let folder = open(&server, 1).await;
    let report = sync::delete_duplicates(&folder, false).await.unwrap();
    assert_eq!(report.removed, 2);
    assert_eq!(report.failed, 1);
    assert!(!report.is_success());
}

#[tokio::test]
async fn test_resized_upload_stops_on_storage_failure_and_cleans_up() {
    let server = MockServer::start().await;
    mount_properties(&server, 1, folder_entry(1, "Fotos")).await;
    mount_listing(&server, 1, Vec::new()).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/drive/sign"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "postEndpoint": format!("{}/s3-upload", server.uri()),
            "signature": {"key": "uploads/${filename}"}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/s3-upload"))
        .respond_with(ResponseTemplate::new(500).set_body_string("storage down"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/drive/uploaded_files"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let source = TempDir::new().unwrap();
    let img = RgbImage::from_pixel(32, 32, Rgb([0, 120, 255]));
    img.save(source.path().join("a.png")).unwrap();
    img.save(source.path().join("b.png")).unwrap();
    let scratch = TempDir::new().unwrap();

    let mut folder = open(&server, 1).await;
    let err = ResizedImageUploader::default()
        .with_scratch_root(scratch.path())
        .upload_folder_resized(source.path(), &mut folder)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}
