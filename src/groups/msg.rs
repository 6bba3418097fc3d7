use axum::{debug_handler, extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::{
    db::{ChatMessage, Role, NOW},
    extract::{AppJson, AppPath},
    session::SignedIn,
    AppError, AppResult, AppState, Describe,
};

use super::owned_group;

#[derive(Deserialize)]
pub(crate) struct SaveMessageForm {
    role: Role,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize, FromRow)]
pub(crate) struct MessageView {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub(crate) message: ChatMessage,
    pub(crate) is_bookmarked: bool,
}

/// Appends a message to a group and marks the group as recently used.
pub(crate) async fn insert_message(
    db_pool: &SqlitePool,
    group_id: i64,
    role: Role,
    content: &str,
) -> Result<ChatMessage, sqlx::Error> {
    let mut tx = db_pool.begin().await?;

    let message: ChatMessage =
        sqlx::query_as("INSERT INTO chat_messages (chat_group_id,role,message) VALUES (?,?,?) RETURNING *")
            .bind(group_id)
            .bind(role)
            .bind(content)
            .fetch_one(&mut *tx)
            .await?;

    sqlx::query(&format!("UPDATE chat_groups SET updated_at={NOW} WHERE id=?"))
        .bind(group_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(message)
}

pub(crate) async fn messages_with_bookmarks(
    db_pool: &SqlitePool,
    group_id: i64,
    user_id: &str,
) -> Result<Vec<MessageView>, sqlx::Error> {
    sqlx::query_as(
        "SELECT m.*, (m.role = 'ai' AND b.id IS NOT NULL) AS is_bookmarked
        FROM chat_messages m
        LEFT JOIN bookmarks b ON b.chat_message_id = m.id AND b.user_id = ?
        WHERE m.chat_group_id = ?
        ORDER BY m.created_at ASC, m.id ASC",
    )
        .bind(user_id)
        .bind(group_id)
        .fetch_all(db_pool)
        .await
}

#[debug_handler(state = AppState)]
pub(crate) async fn messages(
    AppPath(group_id): AppPath<i64>,
    State(db_pool): State<SqlitePool>,
    SignedIn(user_id): SignedIn,
) -> AppResult<impl IntoResponse> {
    owned_group(&db_pool, group_id, &user_id).await
        .describe("failed to fetch chat messages")?;

    let messages = messages_with_bookmarks(&db_pool, group_id, &user_id).await
        .describe("failed to fetch chat messages")?;

    Ok(Json(messages))
}

#[debug_handler(state = AppState)]
pub(crate) async fn save_message(
    AppPath(group_id): AppPath<i64>,
    State(db_pool): State<SqlitePool>,
    SignedIn(user_id): SignedIn,
    AppJson(SaveMessageForm { role, message }): AppJson<SaveMessageForm>,
) -> AppResult<impl IntoResponse> {
    if message.trim().is_empty() {
        return Err(AppError::bad_request("message is required"));
    }

    owned_group(&db_pool, group_id, &user_id).await
        .describe("failed to save chat message")?;

    let message = insert_message(&db_pool, group_id, role, &message).await
        .describe("failed to save chat message")?;

    Ok((StatusCode::CREATED, Json(message)))
}
