#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use quill_api::auth::create_token;
use quill_api::uploads::{DEFAULT_MAX_IMAGE_BYTES, ImageStore};
use quill_api::{AppState, AppStateInner};
use quill_db::Database;
use quill_types::models::Role;

pub const SECRET: &str = "integration-test-secret";
const BOUNDARY: &str = "quill-test-boundary";

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
}

pub struct Seeded {
    pub id: i64,
    pub token: String,
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        file_name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

/// Fresh in-memory database and a scratch upload directory per test.
pub async fn spawn() -> TestApp {
    let dir = std::env::temp_dir().join(format!("quill_api_test_{}", Uuid::new_v4()));
    let state: AppState = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        jwt_secret: SECRET.to_string(),
        token_ttl: chrono::Duration::hours(1),
        images: ImageStore::new(dir, DEFAULT_MAX_IMAGE_BYTES).await.unwrap(),
    });
    TestApp {
        app: quill_api::router(state.clone()),
        state,
    }
}

impl TestApp {
    /// Insert a user directly, skipping password hashing; such users can only
    /// act through the returned token.
    pub fn seed_user(&self, email: &str, name: &str, role: Role) -> Seeded {
        let user = self
            .state
            .db
            .create_user(email, "unusable-hash", name, role)
            .unwrap()
            .unwrap();
        let token = create_token(SECRET, chrono::Duration::hours(1), &user).unwrap();
        Seeded { id: user.id, token }
    }

    pub fn image_count(&self) -> usize {
        std::fs::read_dir(self.state.images.dir()).unwrap().count()
    }

    pub async fn request(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let req = builder(Method::GET, uri, token).body(Body::empty()).unwrap();
        self.request(req).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let req = builder(Method::DELETE, uri, token).body(Body::empty()).unwrap();
        self.request(req).await
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> (StatusCode, Value) {
        let req = builder(method, uri, token)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.request(req).await
    }

    pub async fn multipart(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        parts: &[Part<'_>],
    ) -> (StatusCode, Value) {
        let req = builder(method, uri, token)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        self.request(req).await
    }

    /// Create a post as `token` and return its id.
    pub async fn create_post(&self, token: &str, title: &str) -> i64 {
        let (status, body) = self
            .multipart(
                Method::POST,
                "/posts",
                Some(token),
                &[Part::Text("title", title), Part::Text("content", "body text")],
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_i64().unwrap()
    }

    /// Comment on a post as `token` and return the comment id.
    pub async fn create_comment(&self, token: &str, post_id: i64, content: &str) -> i64 {
        let (status, body) = self
            .json(
                Method::POST,
                "/comments",
                Some(token),
                serde_json::json!({ "postId": post_id, "content": content }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_i64().unwrap()
    }
}

fn builder(method: Method, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match token {
        Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {token}")),
        None => builder,
    }
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File { name, file_name, content_type, bytes } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Assert no object nested anywhere in `value` under `author` or `user`
/// carries an email or password.
pub fn assert_redacted(value: &Value) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                if key == "author" || key == "user" {
                    let obj = inner.as_object().expect("embedded user is an object");
                    assert!(!obj.contains_key("email"), "email leaked: {inner}");
                    assert!(!obj.contains_key("password"), "password leaked: {inner}");
                }
                assert_redacted(inner);
            }
        }
        Value::Array(items) => items.iter().for_each(assert_redacted),
        _ => {}
    }
}
