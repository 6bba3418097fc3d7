use axum::{debug_handler, extract::State, response::IntoResponse, Json};
use serde_json::json;
use sqlx::SqlitePool;

use crate::{
    db::{Profile, NOW},
    extract::{AppJson, AppPath},
    session::SignedIn,
    AppError, AppResult, AppState, Describe,
};

use super::new::ProfileForm;

async fn find_profile(db_pool: &SqlitePool, user_id: &str) -> AppResult<Profile> {
    sqlx::query_as("SELECT * FROM profiles WHERE user_id=?")
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| AppError::not_found("profile not found"))
}

#[debug_handler(state = AppState)]
pub(crate) async fn profile(
    AppPath(user_id): AppPath<String>,
    State(db_pool): State<SqlitePool>,
    signed_in: SignedIn,
) -> AppResult<impl IntoResponse> {
    signed_in.authorize(&user_id)?;

    let profile = find_profile(&db_pool, &user_id).await
        .describe("failed to load the profile")?;

    Ok(Json(profile))
}

#[debug_handler(state = AppState)]
pub(crate) async fn update_profile(
    AppPath(user_id): AppPath<String>,
    State(db_pool): State<SqlitePool>,
    signed_in: SignedIn,
    AppJson(form): AppJson<ProfileForm>,
) -> AppResult<impl IntoResponse> {
    signed_in.authorize(&user_id)?;

    find_profile(&db_pool, &user_id).await
        .describe("failed to update the profile")?;

    let profile: Profile = sqlx::query_as(&format!(
        "UPDATE profiles SET name=?, updated_at={NOW} WHERE user_id=? RETURNING *"
    ))
        .bind(form.name())
        .bind(&user_id)
        .fetch_one(&db_pool)
        .await
        .describe("failed to update the profile")?;

    Ok(Json(json!({ "success": true, "data": profile })))
}
