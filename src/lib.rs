pub mod auth;
pub mod bookmarks;
pub mod chat;
pub mod config;
pub mod db;
pub mod extract;
pub mod groups;
pub mod profiles;
pub mod session;

use std::{borrow::Cow, sync::Arc};

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRef,
    },
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

use crate::{auth::IdentityProvider, chat::Gemini, config::Config};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub identity: IdentityProvider,
    pub gemini: Gemini,
    pub config: Arc<Config>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db_pool = db::connect(&config.database_url).await?;
        Self::with_pool(config, db_pool)
    }

    pub fn with_pool(config: Config, db_pool: SqlitePool) -> anyhow::Result<Self> {
        Ok(AppState {
            db_pool,
            identity: IdentityProvider::from_config(&config)?,
            gemini: Gemini::from_config(&config)?,
            config: Arc::new(config),
        })
    }
}

pub fn app(app_state: AppState) -> Router {
    let config = app_state.config.clone();

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(config.secure_cookies)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::days(config.session_inactivity_days)));

    let cors = match HeaderValue::from_str(&config.cors_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE]),
        Err(_) => {
            tracing::warn!("invalid CORS_ORIGIN {:?}, cross-origin requests disabled", config.cors_origin);
            CorsLayer::new()
        }
    };

    Router::new()
        .merge(auth::router())
        .nest("/p", profiles::router())
        .nest("/g", groups::router())
        .nest("/b", bookmarks::router())

        .with_state(app_state)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn get_obj_field(&self, field: &str) -> AppResult<&Value>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn get_obj_field(&self, field: &str) -> AppResult<&Value> {
        self.get(field)
        .ok_or(format!("expected {field} in {self}").into())
    }
}


pub type AppResult<T> = Result<T, AppError>;

/// An error that becomes a JSON `{"success": false, "error": ...}` response.
///
/// `message` is what the caller gets to see. For server-side failures it is a
/// generic sentence and the underlying cause stays in `source`, which is only
/// logged.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: Cow<'static, str>,
    pub source: Option<anyhow::Error>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self { status, message: message.into(), source: None }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "authentication required")
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "access denied")
    }

    pub fn not_found(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(source: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal server error".into(),
            source: Some(source),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(status = %self.status, "{}: {source:#}", self.message),
                None => tracing::error!(status = %self.status, "{}", self.message),
            }
        }

        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self::internal(anyhow::Error::msg(err))
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self::internal(anyhow::Error::msg(err.to_owned()))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err)
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self::internal(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(serde_json::Error);
apperr_impl!(sqlx::Error);
apperr_impl!(tower_sessions::session::Error);
apperr_impl!(reqwest::Error);

macro_rules! rejection_impl {
    ($R:ty) => {
        impl From<$R> for AppError {
            fn from(rejection: $R) -> Self {
                Self::new(rejection.status(), rejection.body_text())
            }
        }
    };
}

rejection_impl!(JsonRejection);
rejection_impl!(PathRejection);
rejection_impl!(QueryRejection);

/// Replaces the client-facing message of a server-side failure, keeping the
/// cause for the log.
pub trait Describe<T> {
    fn describe(self, message: &'static str) -> AppResult<T>;
}

impl<T, E> Describe<T> for Result<T, E>
where
    E: Into<AppError>,
{
    fn describe(self, message: &'static str) -> AppResult<T> {
        self.map_err(|err| {
            let mut err = err.into();
            if err.status.is_server_error() {
                err.message = message.into();
            }
            err
        })
    }
}
