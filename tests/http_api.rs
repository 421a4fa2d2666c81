use std::sync::Arc;

use actix_web::http::{header, StatusCode};
use actix_web::{test, App};
use serde_json::{json, Value};

use stash_server::auth::AuthService;
use stash_server::blob::MemoryBlobStore;
use stash_server::config::QuotaLimits;
use stash_server::crypto;
use stash_server::handlers::{self, AppState};
use stash_server::storage::StorageEngine;
use stash_server::store::{FileStore, MemoryFileStore, MemoryUserStore};

const BOUNDARY: &str = "stashboundary7MA4YWxkTrZu0gW";
const JWT_SECRET: &[u8] = b"integration-test-secret";

struct Harness {
    state: AppState,
    files: Arc<MemoryFileStore>,
    blobs: Arc<MemoryBlobStore>,
}

fn harness(max_upload_bytes: u64) -> Harness {
    let users = Arc::new(MemoryUserStore::new());
    let files = Arc::new(MemoryFileStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let limits = QuotaLimits {
        max_upload_bytes,
        max_total_bytes: None,
    };
    let storage = StorageEngine::new(
        users.clone(),
        files.clone(),
        blobs.clone(),
        &[7u8; crypto::KEY_LEN],
        limits,
    )
    .unwrap();

    Harness {
        state: AppState {
            auth: AuthService::new(users, JWT_SECRET).unwrap(),
            storage,
        },
        files,
        blobs,
    }
}

fn token_for(state: &AppState, username: &str) -> String {
    let user = state.auth.register(username, "secret123").unwrap();
    state.auth.issue_token(&user).unwrap()
}

fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n",
        BOUNDARY, field, filename
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(token: &str, field: &str, filename: &str, data: &[u8]) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/upload")
        .header(header::AUTHORIZATION, token)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .set_payload(multipart_body(field, filename, data))
}

fn credentials(username: &str, password: &str) -> Value {
    json!({ "username": username, "password": password })
}

#[actix_rt::test]
async fn test_register_login_upload_download() {
    let h = harness(1024);
    let mut app =
        test::init_service(App::new().data(h.state.clone()).configure(handlers::configure)).await;

    let req = test::TestRequest::post()
        .uri("/register")
        .set_json(&credentials("alice", "secret123"))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = test::TestRequest::post()
        .uri("/login")
        .set_json(&credentials("alice", "secret123"))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    let token = body["token"].as_str().unwrap().to_string();
    assert_eq!(token.split('.').count(), 3);

    let resp = test::call_service(
        &mut app,
        upload_request(&token, "file", "notes.txt", &[0x41, 0x42, 0x43]).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(test::read_body(resp).await, "File uploaded successfully");

    let req = test::TestRequest::get()
        .uri("/download/notes.txt")
        .header(header::AUTHORIZATION, token.as_str())
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let headers = resp.headers();
    assert_eq!(
        headers.get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=notes.txt"
    );
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap(),
        "application/octet-stream"
    );
    assert_eq!(headers.get(header::CONTENT_LENGTH).unwrap(), "3");
    assert_eq!(test::read_body(resp).await, "ABC");

    // Only ciphertext reaches the blob store.
    assert_eq!(h.blobs.len(), 1);
    let record = h.files.get_by_user_and_filename(1, "notes.txt").unwrap().unwrap();
    assert_eq!(record.size as usize, crypto::sealed_len(3));
}

#[actix_rt::test]
async fn test_login_with_wrong_password() {
    let h = harness(1024);
    h.state.auth.register("alice", "secret123").unwrap();
    let mut app =
        test::init_service(App::new().data(h.state.clone()).configure(handlers::configure)).await;

    for (username, password) in [("alice", "wrongpass"), ("nobody", "secret123")].iter() {
        let req = test::TestRequest::post()
            .uri("/login")
            .set_json(&credentials(username, password))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Invalid credentials");
    }
}

#[actix_rt::test]
async fn test_duplicate_registration_is_server_error() {
    let h = harness(1024);
    let mut app =
        test::init_service(App::new().data(h.state.clone()).configure(handlers::configure)).await;

    for expected in [StatusCode::CREATED, StatusCode::INTERNAL_SERVER_ERROR].iter() {
        let req = test::TestRequest::post()
            .uri("/register")
            .set_json(&credentials("alice", "secret123"))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), *expected);
    }
}

#[actix_rt::test]
async fn test_malformed_json_is_bad_request() {
    let h = harness(1024);
    let mut app =
        test::init_service(App::new().data(h.state.clone()).configure(handlers::configure)).await;

    for uri in ["/register", "/login"].iter() {
        let req = test::TestRequest::post()
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .set_payload("{\"username\": ")
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}

#[actix_rt::test]
async fn test_missing_or_invalid_token() {
    let h = harness(1024);
    let mut app =
        test::init_service(App::new().data(h.state.clone()).configure(handlers::configure)).await;

    let req = test::TestRequest::get().uri("/download/notes.txt").to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Missing authorization token");

    let resp = test::call_service(
        &mut app,
        upload_request("not.a.token", "file", "notes.txt", b"ABC").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Invalid token");
    assert!(h.files.is_empty());

    // "Bearer " is not stripped.
    let token = token_for(&h.state, "alice");
    let req = test::TestRequest::get()
        .uri("/files")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_oversized_upload_rejected() {
    let h = harness(16);
    let token = token_for(&h.state, "alice");
    let mut app =
        test::init_service(App::new().data(h.state.clone()).configure(handlers::configure)).await;

    let req = upload_request(&token, "file", "big.bin", &[0u8; 17]).to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Error uploading file");
    assert!(h.files.is_empty());
    assert!(h.blobs.is_empty());

    let req = upload_request(&token, "file", "fits.bin", &[0u8; 16]).to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_rt::test]
async fn test_upload_without_file_field() {
    let h = harness(1024);
    let token = token_for(&h.state, "alice");
    let mut app =
        test::init_service(App::new().data(h.state.clone()).configure(handlers::configure)).await;

    let req = upload_request(&token, "attachment", "a.txt", b"ABC").to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(h.files.is_empty());
}

#[actix_rt::test]
async fn test_reupload_fails_and_keeps_original() {
    let h = harness(1024);
    let token = token_for(&h.state, "alice");
    let mut app =
        test::init_service(App::new().data(h.state.clone()).configure(handlers::configure)).await;

    let req = upload_request(&token, "file", "a.txt", b"v1").to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let req = upload_request(&token, "file", "a.txt", b"v2").to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Error uploading file");

    let req = test::TestRequest::get()
        .uri("/download/a.txt")
        .header(header::AUTHORIZATION, token.as_str())
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(test::read_body(resp).await, "v1");
}

#[actix_rt::test]
async fn test_cannot_download_other_users_file() {
    let h = harness(1024);
    let alice = token_for(&h.state, "alice");
    let bob = token_for(&h.state, "bob");
    let mut app =
        test::init_service(App::new().data(h.state.clone()).configure(handlers::configure)).await;

    let req = upload_request(&alice, "file", "secret.txt", b"ABC").to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/download/secret.txt")
        .header(header::AUTHORIZATION, bob.as_str())
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Error downloading file");

    let req = test::TestRequest::delete()
        .uri("/files/secret.txt")
        .header(header::AUTHORIZATION, bob.as_str())
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(h.files.len(), 1);
}

#[actix_rt::test]
async fn test_list_and_delete() {
    let h = harness(1024);
    let token = token_for(&h.state, "alice");
    let mut app =
        test::init_service(App::new().data(h.state.clone()).configure(handlers::configure)).await;

    for name in ["b.txt", "a.txt"].iter() {
        let req = upload_request(&token, "file", name, b"12345").to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let req = test::TestRequest::get()
        .uri("/files")
        .header(header::AUTHORIZATION, token.as_str())
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["usage"], json!(2 * crypto::sealed_len(5)));
    let files = body["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["filename"], "a.txt");
    assert!(files[0].get("blob_id").is_none());

    let req = test::TestRequest::delete()
        .uri("/files/a.txt")
        .header(header::AUTHORIZATION, token.as_str())
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(h.blobs.len(), 1);

    let req = test::TestRequest::get()
        .uri("/files")
        .header(header::AUTHORIZATION, token.as_str())
        .to_request();
    let body: Value = test::read_response_json(&mut app, req).await;
    assert_eq!(body["usage"], json!(crypto::sealed_len(5)));
    assert_eq!(body["files"].as_array().unwrap().len(), 1);
}
