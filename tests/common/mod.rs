//! Mock Gaudeam instance shared by the integration tests.

#![allow(dead_code)]

use igitur::drive::DIRECTORY_LIST_LIMIT;
use igitur::{DriveClient, GaudeamSession, RemoteFolder};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const COOKIE: &str = "test-session";

pub fn session(server: &MockServer) -> GaudeamSession {
    GaudeamSession::with_base_url(COOKIE, server.uri())
}

pub fn client(server: &MockServer) -> DriveClient {
    DriveClient::new(session(server))
}

pub fn folder_entry(id: u64, name: &str) -> Value {
    json!({"id": id, "type": "Folder", "name": name, "owner_type": null, "owner_id": null})
}

/// A photo as listed by Gaudeam: display name without extension.
pub fn file_entry(id: u64, download_name: &str) -> Value {
    let name = download_name.rsplit_once('.').map_or(download_name, |(stem, _)| stem);
    json!({
        "id": id,
        "type": "Photo",
        "name": name,
        "download_name": download_name,
        "file_size": 1024,
        "content_type": "image/jpeg"
    })
}

pub async fn mount_properties(server: &MockServer, id: u64, properties: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/drive/folders/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(properties))
        .mount(server)
        .await;
}

/// Serves `entries` as the children of `parent_id`, split into pages the
/// way the Drive API does, including the trailing empty page when the
/// count is a multiple of the page size.
pub async fn mount_listing(server: &MockServer, parent_id: u64, entries: Vec<Value>) {
    let mut offset = 0;
    let mut remaining = entries.as_slice();
    loop {
        let take = remaining.len().min(DIRECTORY_LIST_LIMIT);
        let (page, rest) = remaining.split_at(take);
        mount_page(server, parent_id, offset, page.to_vec()).await;
        if page.len() < DIRECTORY_LIST_LIMIT {
            break;
        }
        remaining = rest;
        offset += DIRECTORY_LIST_LIMIT;
    }
}

pub async fn mount_page(server: &MockServer, parent_id: u64, offset: usize, page: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/api/v1/drive/folders"))
        .and(query_param("parent_id", parent_id.to_string()))
        .and(query_param("offset", offset.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": page})))
        .mount(server)
        .await;
}

/// Mounts properties and an empty listing for a folder and opens it.
pub async fn empty_folder(server: &MockServer, id: u64, name: &str) -> RemoteFolder {
    mount_properties(server, id, folder_entry(id, name)).await;
    mount_listing(server, id, Vec::new()).await;
    open(server, id).await
}

pub async fn open(server: &MockServer, id: u64) -> RemoteFolder {
    RemoteFolder::open(client(server), id.to_string())
        .await
        .expect("folder should open")
}

pub fn storage_receipt(key: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<PostResponse>
  <Location>https://storage.example/{key}</Location>
  <Bucket>gaudeam-test</Bucket>
  <Key>{key}</Key>
  <ETag>"d41d8cd98f00b204e9800998ecf8427e"</ETag>
</PostResponse>"#
    )
}

/// Mounts the three upload steps: signing, the storage POST and the
/// registration of the stored object. Each is expected `times` times.
pub async fn mount_upload_flow(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/api/v1/drive/sign"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "postEndpoint": format!("{}/s3-upload", server.uri()),
            "signature": {
                "key": "uploads/${filename}",
                "policy": "eyJleHBpcmF0aW9uIjoi",
                "success_action_status": 201
            }
        })))
        .expect(times)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/s3-upload"))
        .respond_with(ResponseTemplate::new(201).set_body_string(storage_receipt("uploads/abc/file")))
        .expect(times)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/drive/uploaded_files"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 999})))
        .expect(times)
        .mount(server)
        .await;
}

/// Fails any DELETE no other mock accepts, and expects none.
pub async fn forbid_other_deletes(server: &MockServer) {
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(10)
        .expect(0)
        .mount(server)
        .await;
}

pub async fn expect_delete(server: &MockServer, route: &str) {
    Mock::given(method("DELETE"))
        .and(path(route.to_string()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(server)
        .await;
}
