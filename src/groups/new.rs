use axum::{debug_handler, extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{db::ChatGroup, extract::AppJson, session::SignedIn, AppResult, AppState, Describe};

use super::clean_title;

#[derive(Debug, Deserialize)]
pub(crate) struct GroupForm {
    #[serde(default)]
    pub(crate) title: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_group(
    State(db_pool): State<SqlitePool>,
    SignedIn(user_id): SignedIn,
    AppJson(GroupForm { title }): AppJson<GroupForm>,
) -> AppResult<impl IntoResponse> {
    let title = clean_title(&title)?;

    let group: ChatGroup = sqlx::query_as("INSERT INTO chat_groups (user_id,title) VALUES (?,?) RETURNING *")
        .bind(&user_id)
        .bind(title)
        .fetch_one(&db_pool)
        .await
        .describe("failed to create chat group")?;

    tracing::debug!("u/{user_id} created group {}", group.id);
    Ok((StatusCode::CREATED, Json(group)))
}
