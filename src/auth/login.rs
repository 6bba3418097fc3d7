use axum::{debug_handler, extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    extract::AppJson,
    profiles,
    session::{SignedIn, ACCESS_TOKEN, USER_ID},
    AppError, AppResult, AppState, Describe,
};

use super::{validate_email, validate_new_password, IdentityProvider};

#[derive(Deserialize)]
pub(crate) struct SignUpRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    confirm_password: String,
}

#[derive(Deserialize)]
pub(crate) struct SignInRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn sign_up(
    State(identity): State<IdentityProvider>,
    AppJson(SignUpRequest { email, password, confirm_password }): AppJson<SignUpRequest>,
) -> AppResult<impl IntoResponse> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() || confirm_password.is_empty() {
        return Err(AppError::bad_request("please fill in every field"));
    }
    validate_new_password(&password, &confirm_password)?;
    validate_email(email)?;

    identity.sign_up(email, &password).await
        .describe("an error occurred while creating the account")?;

    tracing::info!("signed up {email}");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "account created, check your email to confirm",
        })),
    ))
}

#[debug_handler(state = AppState)]
pub(crate) async fn sign_in(
    State(identity): State<IdentityProvider>,
    State(db_pool): State<SqlitePool>,
    session: Session,
    AppJson(SignInRequest { email, password }): AppJson<SignInRequest>,
) -> AppResult<impl IntoResponse> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(AppError::bad_request("please enter your email address and password"));
    }

    let Some(tokens) = identity.sign_in(email, &password).await
        .describe("an error occurred while signing in")? else {
        return Err(AppError::new(
            StatusCode::UNAUTHORIZED,
            "sign-in failed, check your email and password",
        ));
    };

    // no session until the profile row exists; groups reference it
    profiles::ensure_profile(&db_pool, &tokens.user_id).await
        .describe("an error occurred while signing in")?;

    session.cycle_id().await?;
    session.insert(USER_ID, &tokens.user_id).await?;
    session.insert(ACCESS_TOKEN, &tokens.access_token).await?;

    tracing::info!("welcome u/{}", tokens.user_id);
    Ok(Json(json!({
        "success": true,
        "message": "signed in",
        "user_id": tokens.user_id,
    })))
}

#[debug_handler]
pub(crate) async fn me(SignedIn(user_id): SignedIn) -> impl IntoResponse {
    Json(json!({ "user_id": user_id }))
}
