//! End-to-end tests: drive the full router in-process, with an in-memory
//! database and a throwaway media directory.
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use civic_api::AppStateInner;
use civic_api::media::LocalMediaStore;
use civic_db::Database;

const BASE_URL: &str = "http://localhost";
const BOUNDARY: &str = "civic-test-boundary";

struct TestApp {
    router: Router,
    media_dir: PathBuf,
}

impl TestApp {
    async fn new() -> Self {
        let media_dir = std::env::temp_dir().join(format!("civic_api_test_{}", Uuid::new_v4()));
        let media = Arc::new(LocalMediaStore::new(media_dir.clone(), BASE_URL).await.unwrap());
        let db = Arc::new(Database::open_in_memory().unwrap());
        let state = AppStateInner::new(db, media, "test-secret".to_string());
        let router = civic_api::router(state, &media_dir, 16 * 1024 * 1024);
        Self { router, media_dir }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn json(&self, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(req).await
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(req).await
    }

    async fn get_bytes(&self, uri: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn signup_user(&self, username: &str) -> String {
        let (status, body) = self
            .json(
                Method::POST,
                "/api/users/signup",
                json!({ "username": username, "password": "correct horse" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["user"]["id"].as_str().unwrap().to_string()
    }

    async fn create_issue(&self, fields: &[(&str, &str)], images: &[&[u8]]) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/issues")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(fields, images)))
            .unwrap();
        self.send(req).await
    }

    fn media_file_count(&self) -> usize {
        std::fs::read_dir(&self.media_dir).unwrap().count()
    }
}

fn multipart_body(fields: &[(&str, &str)], images: &[&[u8]]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (i, image) in images.iter().enumerate() {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"images\"; filename=\"photo{i}.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(image);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn pothole_fields(user_id: &str) -> Vec<(&'static str, String)> {
    vec![
        ("latitude", "1".to_string()),
        ("longitude", "2".to_string()),
        ("location", "X".to_string()),
        ("issue_title", "Pothole".to_string()),
        ("category", "Road".to_string()),
        ("user_id", user_id.to_string()),
    ]
}

fn as_refs<'a>(fields: &'a [(&'static str, String)]) -> Vec<(&'static str, &'a str)> {
    fields.iter().map(|(k, v)| (*k, v.as_str())).collect()
}

#[tokio::test]
async fn upvote_scenario() {
    let app = TestApp::new().await;
    let u1 = app.signup_user("u1").await;
    let u2 = app.signup_user("u2").await;

    let fields = pothole_fields(&u1);
    let (status, body) = app
        .create_issue(&as_refs(&fields), &[b"first photo".as_slice(), b"second photo".as_slice()])
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["images"].as_array().unwrap().len(), 2);
    assert_eq!(body["issue"]["upvotes"]["count"], 1);
    assert_eq!(body["issue"]["upvotes"]["users"], json!([u1]));
    assert_eq!(body["issue"]["status"], "open");
    assert!(body["issue"]["assigned_official"].is_null());

    // Every returned URL is retrievable.
    for (url, expected) in body["images"]
        .as_array()
        .unwrap()
        .iter()
        .zip([b"first photo".as_slice(), b"second photo".as_slice()])
    {
        let path = url.as_str().unwrap().strip_prefix(BASE_URL).unwrap();
        let (status, bytes) = app.get_bytes(path).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, expected);
    }

    let issue_id = body["issue"]["id"].as_str().unwrap().to_string();
    let upvote_uri = format!("/api/issues/{}/upvote", issue_id);

    let (status, body) = app
        .json(Method::POST, &upvote_uri, json!({ "user_id": u2 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["upvotes"]["count"], 2);

    let (status, _) = app
        .json(Method::POST, &upvote_uri, json!({ "user_id": u2 }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = app.get(&format!("/api/issues/{}", issue_id)).await;
    assert_eq!(body["issue"]["upvotes"]["count"], 2);

    let (status, body) = app
        .json(Method::DELETE, &upvote_uri, json!({ "user_id": u2 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["upvotes"]["count"], 1);
    assert_eq!(body["upvotes"]["users"], json!([u1]));

    // Removing again changes nothing and still succeeds.
    let (status, body) = app
        .json(Method::DELETE, &upvote_uri, json!({ "user_id": u2 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["upvotes"]["count"], 1);
}

#[tokio::test]
async fn more_than_ten_images_is_rejected() {
    let app = TestApp::new().await;
    let u1 = app.signup_user("u1").await;

    let fields = pothole_fields(&u1);
    let photos: Vec<&[u8]> = vec![b"img".as_slice(); 11];
    let (status, _) = app.create_issue(&as_refs(&fields), &photos).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.get("/api/issues").await;
    assert_eq!(body["issues"], json!([]));
    assert_eq!(app.media_file_count(), 0);
}

#[tokio::test]
async fn missing_fields_are_rejected() {
    let app = TestApp::new().await;
    let u1 = app.signup_user("u1").await;

    let fields: Vec<_> = pothole_fields(&u1)
        .into_iter()
        .filter(|(k, _)| *k != "category")
        .collect();
    let (status, body) = app.create_issue(&as_refs(&fields), &[b"img".as_slice()]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Required fields missing"));
    assert_eq!(app.media_file_count(), 0);
}

#[tokio::test]
async fn issues_are_listed_newest_first() {
    let app = TestApp::new().await;
    let u1 = app.signup_user("u1").await;
    let fields = pothole_fields(&u1);

    let mut created = Vec::new();
    for _ in 0..3 {
        let (_, body) = app.create_issue(&as_refs(&fields), &[]).await;
        created.push(body["issue"]["id"].as_str().unwrap().to_string());
    }

    let (status, body) = app.get("/api/issues").await;
    assert_eq!(status, StatusCode::OK);
    let listed: Vec<String> = body["issues"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_str().unwrap().to_string())
        .collect();
    created.reverse();
    assert_eq!(listed, created);

    for issue in body["issues"].as_array().unwrap() {
        assert_eq!(
            issue["upvotes"]["count"].as_u64().unwrap() as usize,
            issue["upvotes"]["users"].as_array().unwrap().len()
        );
    }
}

#[tokio::test]
async fn patch_updates_only_given_fields() {
    let app = TestApp::new().await;
    let u1 = app.signup_user("u1").await;
    let fields = pothole_fields(&u1);
    let (_, body) = app.create_issue(&as_refs(&fields), &[]).await;
    let uri = format!("/api/issues/{}", body["issue"]["id"].as_str().unwrap());

    let (status, _) = app.json(Method::PATCH, &uri, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, body) = app.get(&uri).await;
    assert_eq!(body["issue"]["status"], "open");

    let (status, body) = app
        .json(Method::PATCH, &uri, json!({ "status": "resolved" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["issue"]["status"], "resolved");
    assert_eq!(body["issue"]["issue_title"], "Pothole");

    let (status, _) = app
        .json(
            Method::PATCH,
            &format!("/api/issues/{}", Uuid::new_v4()),
            json!({ "status": "resolved" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_and_malformed_issue_ids() {
    let app = TestApp::new().await;

    let (status, body) = app.get(&format!("/api/issues/{}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, body) = app.get("/api/issues/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "expected a JSON error body, got {body}");

    let (status, body) = app
        .json(
            Method::POST,
            "/api/issues/not-a-uuid/upvote",
            json!({ "user_id": Uuid::new_v4() }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = app
        .json(
            Method::DELETE,
            &format!("/api/issues/{}/comments/42", Uuid::new_v4()),
            json!({ "user_id": Uuid::new_v4() }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn comments_can_only_be_deleted_by_their_author() {
    let app = TestApp::new().await;
    let u1 = app.signup_user("u1").await;
    let u2 = app.signup_user("u2").await;
    let fields = pothole_fields(&u1);
    let (_, body) = app.create_issue(&as_refs(&fields), &[]).await;
    let issue_id = body["issue"]["id"].as_str().unwrap().to_string();
    let comments_uri = format!("/api/issues/{}/comments", issue_id);

    let (status, _) = app
        .json(Method::POST, &comments_uri, json!({ "user_id": u1, "comment": "" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .json(
            Method::POST,
            &comments_uri,
            json!({ "user_id": u1, "comment": "Still there" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let comment_uri = format!("{}/{}", comments_uri, body["comment"]["id"].as_str().unwrap());

    let (status, _) = app
        .json(Method::DELETE, &comment_uri, json!({ "user_id": u2 }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, body) = app.get(&format!("/api/issues/{}", issue_id)).await;
    assert_eq!(body["issue"]["comments"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .json(Method::DELETE, &comment_uri, json!({ "user_id": u1 }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .json(Method::DELETE, &comment_uri, json!({ "user_id": u1 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn signup_login_and_session() {
    let app = TestApp::new().await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/admin/signup",
            json!({ "username": "root", "password": "pw" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Admin created");
    assert!(body["admin"]["password_hash"].is_null());

    let (status, _) = app
        .json(
            Method::POST,
            "/api/admin/signup",
            json!({ "username": "root", "password": "pw" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .json(Method::POST, "/api/admin/signup", json!({ "username": "x" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .json(
            Method::POST,
            "/api/admin/login",
            json!({ "username": "root", "password": "wrong" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .json(
            Method::POST,
            "/api/admin/login",
            json!({ "username": "root", "password": "pw" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["admin"]["username"], "root");
    let token = body["token"].as_str().unwrap().to_string();

    let me = |uri: &'static str, token: Option<String>| {
        let mut req = Request::builder().uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        req.body(Body::empty()).unwrap()
    };

    let (status, body) = app.send(me("/api/admin/me", Some(token.clone()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "root");
    assert_eq!(body["kind"], "admin");

    let (status, _) = app.send(me("/api/users/me", Some(token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(me("/api/admin/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_check() {
    let app = TestApp::new().await;
    let (status, bytes) = app.get_bytes("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"ok");
}
