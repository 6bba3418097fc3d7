use std::sync::LazyLock;

use axum::{routing::{get, post}, Router};
use regex::Regex;

use crate::{AppError, AppResult, AppState};

mod clients;
mod login;
mod lockin;
mod logout;

pub use clients::{IdentityProvider, Tokens};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(login::sign_up))
        .route("/auth/signin", post(login::sign_in))
        .route("/auth/signout", post(logout::sign_out))
        .route("/auth/me", get(login::me))
        .route("/auth/reset-password", post(lockin::request_reset))
        .route("/auth/reset-password/callback", post(lockin::reset_callback))
        .route("/auth/update-password", post(lockin::update_password))
}

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
});

pub(crate) const MIN_PASSWORD_LEN: usize = 6;

pub(crate) fn validate_email(email: &str) -> AppResult<()> {
    if !EMAIL.is_match(email) {
        return Err(AppError::bad_request("please enter a valid email address"));
    }
    Ok(())
}

pub(crate) fn validate_new_password(password: &str, confirm_password: &str) -> AppResult<()> {
    if password != confirm_password {
        return Err(AppError::bad_request("passwords do not match"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request("password must be at least 6 characters"));
    }
    Ok(())
}
