use axum::{debug_handler, extract::State, response::IntoResponse, Json};
use serde_json::json;
use sqlx::SqlitePool;

use crate::{
    db::{ChatGroup, NOW},
    extract::{AppJson, AppPath},
    session::SignedIn,
    AppResult, AppState, Describe,
};

use super::{clean_title, new::GroupForm, owned_group};

#[debug_handler(state = AppState)]
pub(crate) async fn group(
    AppPath(group_id): AppPath<i64>,
    State(db_pool): State<SqlitePool>,
    SignedIn(user_id): SignedIn,
) -> AppResult<impl IntoResponse> {
    let group = owned_group(&db_pool, group_id, &user_id).await
        .describe("failed to fetch chat group")?;

    Ok(Json(group))
}

#[debug_handler(state = AppState)]
pub(crate) async fn rename_group(
    AppPath(group_id): AppPath<i64>,
    State(db_pool): State<SqlitePool>,
    SignedIn(user_id): SignedIn,
    AppJson(GroupForm { title }): AppJson<GroupForm>,
) -> AppResult<impl IntoResponse> {
    let title = clean_title(&title)?;
    owned_group(&db_pool, group_id, &user_id).await
        .describe("failed to update chat group")?;

    let group: ChatGroup = sqlx::query_as(&format!(
        "UPDATE chat_groups SET title=?, updated_at={NOW} WHERE id=? RETURNING *"
    ))
        .bind(title)
        .bind(group_id)
        .fetch_one(&db_pool)
        .await
        .describe("failed to update chat group")?;

    Ok(Json(group))
}

pub(crate) async fn delete_group_data(db_pool: &SqlitePool, group_id: i64) -> Result<(), sqlx::Error> {
    let mut tx = db_pool.begin().await?;

    sqlx::query("DELETE FROM bookmarks WHERE chat_message_id IN (SELECT id FROM chat_messages WHERE chat_group_id=?)")
        .bind(group_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM chat_messages WHERE chat_group_id=?")
        .bind(group_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM chat_groups WHERE id=?")
        .bind(group_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_group(
    AppPath(group_id): AppPath<i64>,
    State(db_pool): State<SqlitePool>,
    SignedIn(user_id): SignedIn,
) -> AppResult<impl IntoResponse> {
    owned_group(&db_pool, group_id, &user_id).await
        .describe("failed to delete chat group")?;

    delete_group_data(&db_pool, group_id).await
        .describe("failed to delete chat group")?;

    tracing::debug!("u/{user_id} deleted group {group_id}");
    Ok(Json(json!({ "success": true })))
}
