use axum::{debug_handler, extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;

use crate::{
    extract::AppJson,
    session::{ACCESS_TOKEN, RECOVERY_TOKEN},
    AppError, AppResult, AppState, Describe,
};

use super::{validate_email, validate_new_password, IdentityProvider};

#[derive(Deserialize)]
pub(crate) struct ResetRequest {
    #[serde(default)]
    email: String,
}

#[derive(Deserialize)]
pub(crate) struct CallbackRequest {
    #[serde(default)]
    access_token: String,
}

#[derive(Deserialize)]
pub(crate) struct UpdatePasswordRequest {
    #[serde(default)]
    password: String,
    #[serde(default)]
    confirm_password: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn request_reset(
    State(identity): State<IdentityProvider>,
    AppJson(ResetRequest { email }): AppJson<ResetRequest>,
) -> AppResult<impl IntoResponse> {
    let email = email.trim();
    validate_email(email)?;

    // Whether the address is registered is not revealed to the caller.
    if let Err(err) = identity.recover(email).await {
        tracing::warn!("password recovery for {email} failed: {}", err.message);
    }

    Ok(Json(json!({
        "success": true,
        "message": "if that address is registered, a reset link is on its way",
    })))
}

/// Landing point of the emailed reset link. The browser forwards the token it
/// found in the link and we keep it in the session for `update_password`.
#[debug_handler(state = AppState)]
pub(crate) async fn reset_callback(
    State(identity): State<IdentityProvider>,
    session: Session,
    AppJson(CallbackRequest { access_token }): AppJson<CallbackRequest>,
) -> AppResult<impl IntoResponse> {
    let invalid = || AppError::new(StatusCode::UNAUTHORIZED, "the reset link is invalid or has expired");

    if access_token.is_empty() {
        return Err(invalid());
    }

    let Some(user_id) = identity.user_id(&access_token).await
        .describe("failed to verify the reset link")? else {
        return Err(invalid());
    };

    session.insert(RECOVERY_TOKEN, access_token).await?;
    tracing::info!("password recovery started for u/{user_id}");

    Ok(Json(json!({ "success": true })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn update_password(
    State(identity): State<IdentityProvider>,
    session: Session,
    AppJson(UpdatePasswordRequest { password, confirm_password }): AppJson<UpdatePasswordRequest>,
) -> AppResult<impl IntoResponse> {
    let recovery = session.get::<String>(RECOVERY_TOKEN).await?;
    let token = match recovery {
        Some(token) => token,
        None => session.get::<String>(ACCESS_TOKEN).await?
            .ok_or_else(AppError::unauthorized)?,
    };

    if password.is_empty() || confirm_password.is_empty() {
        return Err(AppError::bad_request("please fill in every field"));
    }
    validate_new_password(&password, &confirm_password)?;

    identity.update_password(&token, &password).await
        .describe("failed to update the password")?;

    session.remove::<String>(RECOVERY_TOKEN).await?;

    Ok(Json(json!({ "success": true, "message": "password updated" })))
}
