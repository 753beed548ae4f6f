//! End-to-end tests driving the full router against an in-memory database.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use tower::ServiceExt;

use vault_crypto::Codec;
use vault_db::Database;
use vault_types::api::{DashboardPage, ErrorBody, FileListPage, FileViewPage, FormPage};
use vault_types::models::Role;

use crate::auth::{AppState, AppStateInner, ensure_admin};
use crate::middleware::{PREFILL_COOKIE, SESSION_COOKIE};
use crate::router;

const BOUNDARY: &str = "vault-test-boundary";
const UPLOAD_LIMIT: usize = 1024 * 1024;

fn app() -> (Router, AppState) {
    let state: AppState = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        codec: Codec::from_secret("test-secret"),
        jwt_secret: "test-jwt-secret".into(),
        secure_cookies: false,
    });
    (router(state.clone(), UPLOAD_LIMIT), state)
}

async fn send(app: &Router, req: Request<Body>) -> Response {
    app.clone().oneshot(req).await.unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn multipart_request(cookie: &str, field: &str, filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::post("/upload/")
        .header(header::COOKIE, cookie)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn location(resp: &Response) -> &str {
    resp.headers()[header::LOCATION].to_str().unwrap()
}

/// `name=value` of a Set-Cookie header, without attributes.
fn set_cookie(resp: &Response, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&prefix))
        .map(|v| v.split(';').next().unwrap_or_default().to_string())
}

async fn body_bytes(resp: Response) -> Vec<u8> {
    resp.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json<T: DeserializeOwned>(resp: Response) -> T {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

async fn register(app: &Router, username: &str, password: &str) -> Response {
    let body = format!("username={username}&email={username}%40x.com&password={password}");
    send(app, post_form("/register/", &body, None)).await
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let body = format!("username={username}&password={password}");
    let resp = send(app, post_form("/login/", &body, None)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/home/");
    set_cookie(&resp, SESSION_COOKIE).expect("session cookie")
}

async fn signed_up(app: &Router, username: &str) -> String {
    let resp = register(app, username, "pw1").await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    login(app, username, "pw1").await
}

async fn admin_session(app: &Router, state: &AppState) -> String {
    ensure_admin(&state.db, "root", "root@x.com", "rootpw").unwrap();
    let resp = send(app, post_form("/admin/login/", "username=root&password=rootpw", None)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/admin/dashboard/");
    set_cookie(&resp, SESSION_COOKIE).expect("session cookie")
}

async fn list(app: &Router, cookie: &str) -> FileListPage {
    let resp = send(app, get("/files/", Some(cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await
}

/// Upload and return the new file's id.
async fn upload(app: &Router, cookie: &str, filename: &str, content: &[u8]) -> i64 {
    let resp = send(app, multipart_request(cookie, "file", filename, content)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/files/");

    list(app, cookie)
        .await
        .files
        .iter()
        .filter(|f| f.filename == filename)
        .map(|f| f.id)
        .max()
        .expect("uploaded file is listed")
}

#[tokio::test]
async fn upload_list_download_delete_scenario() {
    let (app, _) = app();

    let resp = register(&app, "alice", "pw1").await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login/");
    let cookie = login(&app, "alice", "pw1").await;

    let id = upload(&app, &cookie, "a.txt", b"hello").await;

    let page = list(&app, &cookie).await;
    assert_eq!(page.username, "alice");
    assert_eq!(page.files.len(), 1);
    assert_eq!(page.files[0].filename, "a.txt");

    let resp = send(&app, get(&format!("/download/{id}/"), Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"a.txt\""
    );
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/octet-stream");
    assert_eq!(body_bytes(resp).await, b"hello");

    let resp = send(&app, get(&format!("/delete/{id}/"), Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/files/");

    assert!(list(&app, &cookie).await.files.is_empty());

    let resp = send(&app, get(&format!("/download/{id}/"), Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn files_are_stored_encrypted() {
    let (app, state) = app();
    let cookie = signed_up(&app, "alice").await;
    let id = upload(&app, &cookie, "a.txt", b"hello").await;

    let stored = state.db.get_file(id).unwrap().unwrap();
    assert!(!stored.encrypted_data.windows(5).any(|w| w == b"hello"));
    assert_eq!(state.codec.decrypt(&stored.encrypted_data).unwrap(), b"hello");
}

#[tokio::test]
async fn concurrent_uploads_of_the_same_content_are_independent() {
    let (app, state) = app();
    let cookie = signed_up(&app, "alice").await;

    let (r1, r2) = tokio::join!(
        send(&app, multipart_request(&cookie, "file", "same.txt", b"same")),
        send(&app, multipart_request(&cookie, "file", "same.txt", b"same")),
    );
    assert_eq!(r1.status(), StatusCode::SEE_OTHER);
    assert_eq!(r2.status(), StatusCode::SEE_OTHER);

    let files = list(&app, &cookie).await.files;
    assert_eq!(files.len(), 2);

    let c1 = state.db.get_file(files[0].id).unwrap().unwrap().encrypted_data;
    let c2 = state.db.get_file(files[1].id).unwrap().unwrap().encrypted_data;
    assert_ne!(c1, c2);
    assert_eq!(state.codec.decrypt(&c1).unwrap(), b"same");
    assert_eq!(state.codec.decrypt(&c2).unwrap(), b"same");
}

#[tokio::test]
async fn foreign_files_look_exactly_like_missing_ones() {
    let (app, _) = app();
    let alice = signed_up(&app, "alice").await;
    let bob = signed_up(&app, "bob").await;
    let id = upload(&app, &alice, "secret.txt", b"alice only").await;

    for action in ["view", "download", "delete"] {
        let foreign = send(&app, get(&format!("/{action}/{id}/"), Some(&bob))).await;
        let missing = send(&app, get(&format!("/{action}/999999/"), Some(&bob))).await;

        assert_eq!(foreign.status(), StatusCode::NOT_FOUND, "{action}");
        assert_eq!(missing.status(), StatusCode::NOT_FOUND, "{action}");
        assert_eq!(body_bytes(foreign).await, body_bytes(missing).await, "{action}");
    }

    assert!(list(&app, &bob).await.files.is_empty());

    let resp = send(&app, get(&format!("/download/{id}/"), Some(&alice))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, b"alice only");
}

#[tokio::test]
async fn admin_can_view_download_and_delete_any_file() {
    let (app, state) = app();
    let alice = signed_up(&app, "alice").await;
    let id = upload(&app, &alice, "notes.txt", b"meeting at noon").await;
    let admin = admin_session(&app, &state).await;

    let dashboard: DashboardPage =
        body_json(send(&app, get("/admin/dashboard/", Some(&admin))).await).await;
    assert_eq!(dashboard.users.len(), 2);
    assert_eq!(dashboard.files.len(), 1);
    assert_eq!(dashboard.files[0].owner_username, "alice");
    assert!(dashboard.users.iter().any(|u| u.username == "root" && u.role == Role::Admin));

    let view: FileViewPage =
        body_json(send(&app, get(&format!("/admin/view/{id}/"), Some(&admin))).await).await;
    assert_eq!(view.content.as_deref(), Some("meeting at noon"));

    let resp = send(&app, get(&format!("/admin/download/{id}/"), Some(&admin))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, b"meeting at noon");

    // The ownership bypass applies on the regular routes too.
    let resp = send(&app, get(&format!("/view/{id}/"), Some(&admin))).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(&app, get(&format!("/admin/delete/{id}/"), Some(&admin))).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/admin/dashboard/");

    assert!(list(&app, &alice).await.files.is_empty());
    let resp = send(&app, get(&format!("/admin/view/{id}/"), Some(&admin))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_area_is_closed_to_regular_users() {
    let (app, _) = app();
    let alice = signed_up(&app, "alice").await;

    for uri in ["/admin/dashboard/", "/admin/view/1/", "/admin/delete/1/"] {
        let resp = send(&app, get(uri, Some(&alice))).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(location(&resp), "/admin/login/", "{uri}");
    }

    let resp = send(&app, post_form("/admin/login/", "username=alice&password=pw1", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie(&resp, SESSION_COOKIE).is_none());
    let page: FormPage = body_json(resp).await;
    assert_eq!(page.error.as_deref(), Some("Invalid admin credentials"));
}

#[tokio::test]
async fn anonymous_requests_redirect_before_any_lookup() {
    let (app, _) = app();
    let alice = signed_up(&app, "alice").await;
    let id = upload(&app, &alice, "a.txt", b"hello").await;

    for action in ["view", "download", "delete"] {
        let existing = send(&app, get(&format!("/{action}/{id}/"), None)).await;
        let missing = send(&app, get(&format!("/{action}/999999/"), None)).await;
        for resp in [&existing, &missing] {
            assert_eq!(resp.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(resp), "/login/");
        }
    }

    for uri in ["/home/", "/files/"] {
        let resp = send(&app, get(uri, Some("vault_session=not-a-token"))).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/login/");
    }

    let resp = send(&app, get(&format!("/admin/view/{id}/"), None)).await;
    assert_eq!(location(&resp), "/admin/login/");

    // The anonymous delete attempts above must not have removed anything.
    assert_eq!(list(&app, &alice).await.files.len(), 1);
}

#[tokio::test]
async fn view_dispatches_on_extension() {
    let (app, _) = app();
    let cookie = signed_up(&app, "alice").await;

    let pdf = upload(&app, &cookie, "report.PDF", b"%PDF-1.4 minimal").await;
    let resp = send(&app, get(&format!("/view/{pdf}/"), Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(body_bytes(resp).await, b"%PDF-1.4 minimal");

    let md = upload(&app, &cookie, "notes.md", b"# Notes\n- one").await;
    let view: FileViewPage =
        body_json(send(&app, get(&format!("/view/{md}/"), Some(&cookie))).await).await;
    assert_eq!(view.filename, "notes.md");
    assert_eq!(view.content.as_deref(), Some("# Notes\n- one"));

    let zip = upload(&app, &cookie, "archive.zip", b"PK\x03\x04").await;
    let view: FileViewPage =
        body_json(send(&app, get(&format!("/view/{zip}/"), Some(&cookie))).await).await;
    assert_eq!(view.filename, "archive.zip");
    assert!(view.content.is_none());
}

#[tokio::test]
async fn non_utf8_text_fails_the_request() {
    let (app, _) = app();
    let cookie = signed_up(&app, "alice").await;
    let id = upload(&app, &cookie, "broken.txt", &[0xff, 0xfe, 0xfd]).await;

    let resp = send(&app, get(&format!("/view/{id}/"), Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorBody = body_json(resp).await;
    assert_eq!(body.error, "file content is not valid UTF-8");

    // Downloading the same bytes is fine.
    let resp = send(&app, get(&format!("/download/{id}/"), Some(&cookie))).await;
    assert_eq!(body_bytes(resp).await, vec![0xff, 0xfe, 0xfd]);
}

#[tokio::test]
async fn corrupt_ciphertext_fails_the_request() {
    let (app, state) = app();
    let cookie = signed_up(&app, "alice").await;
    let owner = state.db.get_user_by_username("alice").unwrap().unwrap().id;
    let id = state
        .db
        .create_file(owner, "x.txt", b"gAAAAAB-not-a-real-token", chrono::Utc::now())
        .unwrap();

    for action in ["view", "download"] {
        let resp = send(&app, get(&format!("/{action}/{id}/"), Some(&cookie))).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR, "{action}");
        let body: ErrorBody = body_json(resp).await;
        assert_eq!(body.error, "stored file could not be decrypted");
    }
}

#[tokio::test]
async fn logout_revokes_the_session() {
    let (app, state) = app();
    let cookie = signed_up(&app, "alice").await;
    assert_eq!(send(&app, get("/home/", Some(&cookie))).await.status(), StatusCode::OK);

    let resp = send(&app, get("/logout/", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");
    assert_eq!(set_cookie(&resp, SESSION_COOKIE).as_deref(), Some("vault_session="));

    let user = state.db.get_user_by_username("alice").unwrap().unwrap();
    assert!(user.last_logout.is_some());
    assert!(user.last_login.is_some());

    let resp = send(&app, get("/home/", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login/");

    let fresh = login(&app, "alice", "pw1").await;
    assert_eq!(send(&app, get("/home/", Some(&fresh))).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn bearer_tokens_work_like_cookies() {
    let (app, _) = app();
    let cookie = signed_up(&app, "alice").await;
    let token = cookie.trim_start_matches("vault_session=");

    let req = Request::get("/files/")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, req).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn registration_validates_its_form() {
    let (app, _) = app();

    let resp = send(&app, post_form("/register/", "username=alice&password=pw1", None)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let page: FormPage = body_json(resp).await;
    assert_eq!(page.error.as_deref(), Some("All fields are required"));

    let resp = send(
        &app,
        post_form("/register/", "username=bad+name&email=a%40x.com&password=pw1", None),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert_eq!(register(&app, "alice", "pw1").await.status(), StatusCode::SEE_OTHER);

    let resp = register(&app, "alice", "other").await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let page: FormPage = body_json(resp).await;
    assert_eq!(page.error.as_deref(), Some("Username already taken"));
}

#[tokio::test]
async fn login_form_is_prefilled_once_after_registration() {
    let (app, _) = app();
    let resp = register(&app, "alice", "pw1").await;
    let prefill = set_cookie(&resp, PREFILL_COOKIE).expect("prefill cookie");
    assert_eq!(prefill, "vault_prefill=alice");

    let resp = send(&app, get("/login/", Some(&prefill))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(set_cookie(&resp, PREFILL_COOKIE).as_deref(), Some("vault_prefill="));
    let page: FormPage = body_json(resp).await;
    assert_eq!(page.prefill_username.as_deref(), Some("alice"));

    let page: FormPage = body_json(send(&app, get("/login/", None)).await).await;
    assert!(page.prefill_username.is_none());
}

#[tokio::test]
async fn failed_login_rerenders_the_form() {
    let (app, _) = app();
    register(&app, "alice", "pw1").await;

    let resp = send(&app, post_form("/login/", "username=alice&password=wrong", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie(&resp, SESSION_COOKIE).is_none());
    let page: FormPage = body_json(resp).await;
    assert_eq!(page.error.as_deref(), Some("Invalid credentials"));
    assert_eq!(page.prefill_username.as_deref(), Some("alice"));

    let resp = send(&app, post_form("/login/", "username=nobody&password=pw1", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn upload_form_requires_a_non_empty_file() {
    let (app, _) = app();
    let cookie = signed_up(&app, "alice").await;

    let cases = [
        ("other", "a.txt", &b"data"[..], "This field is required."),
        ("file", "", &b"data"[..], "This field is required."),
        ("file", "empty.txt", &b""[..], "The submitted file is empty."),
    ];
    for (field, filename, content, expected) in cases {
        let resp = send(&app, multipart_request(&cookie, field, filename, content)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{field}/{filename}");
        let body: ErrorBody = body_json(resp).await;
        assert_eq!(body.error, expected);
    }

    assert!(list(&app, &cookie).await.files.is_empty());
}

#[tokio::test]
async fn oversized_upload_is_refused() {
    let (app, _) = app();
    let cookie = signed_up(&app, "alice").await;

    let big = vec![b'x'; UPLOAD_LIMIT * 2];
    let resp = send(&app, multipart_request(&cookie, "file", "big.txt", &big)).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(list(&app, &cookie).await.files.is_empty());
}

#[tokio::test]
async fn admin_can_promote_users() {
    let (app, state) = app();
    signed_up(&app, "alice").await;
    let admin = admin_session(&app, &state).await;
    let alice_id = state.db.get_user_by_username("alice").unwrap().unwrap().id;

    let resp = send(&app, post_form(&format!("/admin/promote/{alice_id}/"), "", Some(&admin))).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    let resp = send(&app, post_form("/admin/login/", "username=alice&password=pw1", None)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/admin/dashboard/");

    let resp = send(&app, post_form("/admin/promote/999999/", "", Some(&admin))).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn landing_page_and_health() {
    let (app, _) = app();

    let page: serde_json::Value = body_json(send(&app, get("/", None)).await).await;
    assert_eq!(page["authenticated"], false);

    let cookie = signed_up(&app, "alice").await;
    let page: serde_json::Value = body_json(send(&app, get("/", Some(&cookie))).await).await;
    assert_eq!(page["authenticated"], true);

    let resp = send(&app, get("/health", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn concurrent_deletes_of_one_file_never_fail_hard() {
    let (app, _) = app();
    let cookie = signed_up(&app, "alice").await;
    let id = upload(&app, &cookie, "a.txt", b"hello").await;
    let uri = format!("/delete/{id}/");

    let (r1, r2) = tokio::join!(
        send(&app, get(&uri, Some(&cookie))),
        send(&app, get(&uri, Some(&cookie))),
    );
    let mut statuses = [r1.status(), r2.status()];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::SEE_OTHER, StatusCode::NOT_FOUND]);
    assert!(list(&app, &cookie).await.files.is_empty());
}
