#![allow(dead_code)]

use std::convert::Infallible;

use axum::{
    body::{Body, Bytes},
    extract::Path,
    http::{header, HeaderMap, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{stream, StreamExt};
use http_body_util::BodyExt;
use phrasechat::{app, config::Config, AppState};
use serde_json::{json, Value};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tokio::net::TcpListener;
use tower::ServiceExt;

pub const PASSWORD: &str = "correct-horse";

pub struct TestApp {
    pub router: Router,
    pub db_pool: SqlitePool,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("json body")
    }

    pub fn cookie(&self) -> Option<String> {
        let set_cookie = self.headers.get(header::SET_COOKIE)?.to_str().ok()?;
        Some(set_cookie.split(';').next()?.to_owned())
    }
}

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("mock server");
    });
    format!("http://{addr}")
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers.get(header::AUTHORIZATION)?
        .to_str().ok()?
        .strip_prefix("Bearer ")
        .map(str::to_owned)
}

/// `tok-<name>` and `recovery-<name>` both belong to `user-<name>`.
fn user_for_token(token: &str) -> Option<String> {
    token.strip_prefix("tok-")
        .or_else(|| token.strip_prefix("recovery-"))
        .map(|name| format!("user-{name}"))
}

/// Stand-in for the hosted identity provider.
async fn identity_provider() -> String {
    async fn signup(Json(body): Json<Value>) -> impl IntoResponse {
        if body["email"] == "taken@example.com" {
            return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "msg": "User already registered" })));
        }
        (StatusCode::OK, Json(json!({ "id": "new-user" })))
    }

    async fn token(Json(body): Json<Value>) -> impl IntoResponse {
        let email = body["email"].as_str().unwrap_or_default();
        if body["password"] != PASSWORD {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" })),
            );
        }
        let name = email.split('@').next().unwrap_or_default();
        (
            StatusCode::OK,
            Json(json!({ "access_token": format!("tok-{name}"), "user": { "id": format!("user-{name}") } })),
        )
    }

    async fn user(headers: HeaderMap) -> impl IntoResponse {
        match bearer(&headers).as_deref().and_then(user_for_token) {
            Some(id) => (StatusCode::OK, Json(json!({ "id": id }))),
            None => (StatusCode::UNAUTHORIZED, Json(json!({ "msg": "invalid JWT" }))),
        }
    }

    async fn update_user(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
        let Some(id) = bearer(&headers).as_deref().and_then(user_for_token) else {
            return (StatusCode::UNAUTHORIZED, Json(json!({ "msg": "invalid JWT" })));
        };
        if body["password"] == "rejected" {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "msg": "New password should be different from the old password." })),
            );
        }
        (StatusCode::OK, Json(json!({ "id": id })))
    }

    serve(
        Router::new()
            .route("/auth/v1/signup", post(signup))
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/recover", post(|| async { Json(json!({})) }))
            .route("/auth/v1/user", get(user).put(update_user)),
    )
    .await
}

fn sse_event(value: Value) -> String {
    format!("data: {value}\r\n\r\n")
}

fn text_event(text: &str) -> String {
    sse_event(json!({
        "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] }, "index": 0 }]
    }))
}

/// Stand-in for Gemini. The model name picks the behaviour:
/// `broken*` fails up front, `faulty*` errors mid-stream, `stalled*` sends
/// one chunk and then goes silent, anything else answers with two text chunks.
async fn gemini() -> String {
    async fn generate(Path(action): Path<String>) -> impl IntoResponse {
        if action.starts_with("broken") {
            return (StatusCode::INTERNAL_SERVER_ERROR, "model overloaded".to_owned()).into_response();
        }

        if action.starts_with("stalled") {
            let first = stream::once(async { Ok::<_, Infallible>(text_event("1. \"Let's move on.\"\n")) });
            let body = Body::from_stream(first.chain(stream::pending()));
            return ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response();
        }

        let mut body = text_event("1. \"Let's move on.\"\n");
        if action.starts_with("faulty") {
            body += &sse_event(json!({ "error": { "code": 500, "message": "internal model error" } }));
        } else {
            body += &text_event("2. \"Shall we continue?\"");
            body += &sse_event(json!({ "candidates": [{ "finishReason": "STOP", "index": 0 }] }));
        }

        ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
    }

    serve(Router::new().route("/v1beta/models/{action}", post(generate))).await
}

async fn collect(response: Response) -> TestResponse {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.expect("body").to_bytes();
    TestResponse { status, headers, body }
}

pub async fn test_app() -> TestApp {
    test_app_with_model("gemini-test").await
}

pub async fn test_app_with_model(model: &str) -> TestApp {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("memory db");
    phrasechat::db::migrate(&db_pool).await.expect("migrate");

    let config = Config {
        database_url: "sqlite::memory:".to_owned(),
        bind_addr: "127.0.0.1:0".to_owned(),
        site_url: "http://localhost:3000".to_owned(),
        cors_origin: "http://localhost:3000".to_owned(),
        auth_url: identity_provider().await,
        auth_api_key: "anon-key".to_owned(),
        gemini_base_url: gemini().await,
        gemini_api_key: "gemini-key".to_owned(),
        gemini_model: model.to_owned(),
        temperature: 0.7,
        max_tokens: 1000,
        idle_timeout_ms: 500,
        session_inactivity_days: 7,
        secure_cookies: false,
    };

    let app_state = AppState::with_pool(config, db_pool.clone()).expect("state");
    TestApp { router: app(app_state), db_pool }
}

impl TestApp {
    /// Sends a request and hands back the response without reading its body.
    pub async fn send(&self, method: Method, uri: &str, cookie: Option<&str>, body: Option<String>) -> Response {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let body = match body {
            Some(body) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(body)
            }
            None => Body::empty(),
        };

        self.router.clone()
            .oneshot(request.body(body).expect("request"))
            .await
            .expect("response")
    }

    /// Like [`TestApp::request`] but with a body that need not be valid JSON.
    pub async fn request_text(&self, method: Method, uri: &str, cookie: Option<&str>, body: &str) -> TestResponse {
        collect(self.send(method, uri, cookie, Some(body.to_owned())).await).await
    }

    pub async fn request(&self, method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> TestResponse {
        collect(self.send(method, uri, cookie, body.map(|body| body.to_string())).await).await
    }

    pub async fn get(&self, uri: &str, cookie: &str) -> TestResponse {
        self.request(Method::GET, uri, Some(cookie), None).await
    }

    pub async fn post(&self, uri: &str, cookie: &str, body: Value) -> TestResponse {
        self.request(Method::POST, uri, Some(cookie), Some(body)).await
    }

    /// Signs in as `<name>@example.com` and returns the session cookie.
    pub async fn sign_in(&self, name: &str) -> String {
        let response = self.request(
            Method::POST,
            "/auth/signin",
            None,
            Some(json!({ "email": format!("{name}@example.com"), "password": PASSWORD })),
        ).await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
        response.cookie().expect("session cookie")
    }

    pub async fn create_group(&self, cookie: &str, title: &str) -> i64 {
        let response = self.post("/g", cookie, json!({ "title": title })).await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        response.json()["id"].as_i64().expect("group id")
    }
}
