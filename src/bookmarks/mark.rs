use axum::{debug_handler, extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;

use crate::{
    db::{Bookmark, Role},
    extract::{AppJson, AppPath},
    session::SignedIn,
    AppError, AppResult, AppState, Describe,
};

#[derive(Deserialize)]
pub(crate) struct AddBookmarkForm {
    chat_message_id: i64,
}

pub(crate) async fn is_bookmarked(db_pool: &SqlitePool, user_id: &str, chat_message_id: i64) -> Result<bool, sqlx::Error> {
    Ok(
        sqlx::query("SELECT 1 FROM bookmarks WHERE user_id=? AND chat_message_id=?")
            .bind(user_id)
            .bind(chat_message_id)
            .fetch_optional(db_pool)
            .await?
            .is_some()
    )
}

pub(crate) async fn bookmark_message(db_pool: &SqlitePool, user_id: &str, chat_message_id: i64) -> AppResult<Bookmark> {
    let role: Option<(Role,)> = sqlx::query_as(
        "SELECT m.role FROM chat_messages m
        JOIN chat_groups g ON g.id = m.chat_group_id
        WHERE m.id=? AND g.user_id=?",
    )
        .bind(chat_message_id)
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?;

    match role {
        None => return Err(AppError::not_found("message not found")),
        Some((Role::User,)) => return Err(AppError::bad_request("only assistant responses can be bookmarked")),
        Some((Role::Ai,)) => {}
    }

    if is_bookmarked(db_pool, user_id, chat_message_id).await? {
        return Err(AppError::conflict("this message is already bookmarked"));
    }

    let bookmark = sqlx::query_as("INSERT INTO bookmarks (user_id,chat_message_id) VALUES (?,?) RETURNING *")
        .bind(user_id)
        .bind(chat_message_id)
        .fetch_one(db_pool)
        .await;

    match bookmark {
        Ok(bookmark) => Ok(bookmark),
        // lost a race with a concurrent request for the same message
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(AppError::conflict("this message is already bookmarked"))
        }
        Err(e) => Err(e.into()),
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn add_bookmark(
    State(db_pool): State<SqlitePool>,
    SignedIn(user_id): SignedIn,
    AppJson(AddBookmarkForm { chat_message_id }): AppJson<AddBookmarkForm>,
) -> AppResult<impl IntoResponse> {
    let bookmark = bookmark_message(&db_pool, &user_id, chat_message_id).await
        .describe("failed to add the bookmark")?;

    Ok((StatusCode::CREATED, Json(json!({ "success": true, "data": bookmark }))))
}

#[debug_handler(state = AppState)]
pub(crate) async fn remove_bookmark(
    AppPath(chat_message_id): AppPath<i64>,
    State(db_pool): State<SqlitePool>,
    SignedIn(user_id): SignedIn,
) -> AppResult<impl IntoResponse> {
    sqlx::query("DELETE FROM bookmarks WHERE user_id=? AND chat_message_id=?")
        .bind(&user_id)
        .bind(chat_message_id)
        .execute(&db_pool)
        .await
        .describe("failed to remove the bookmark")?;

    Ok(Json(json!({ "success": true })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn bookmark_status(
    AppPath(chat_message_id): AppPath<i64>,
    State(db_pool): State<SqlitePool>,
    SignedIn(user_id): SignedIn,
) -> AppResult<impl IntoResponse> {
    let is_bookmarked = is_bookmarked(&db_pool, &user_id, chat_message_id).await
        .describe("failed to check the bookmark")?;

    Ok(Json(json!({ "success": true, "is_bookmarked": is_bookmarked })))
}

#[cfg(test)]
mod tests {
    use crate::db::memory_pool;

    use super::*;

    async fn seeded() -> SqlitePool {
        let db_pool = memory_pool().await;
        for statement in [
            "INSERT INTO profiles (id,user_id) VALUES ('p1','u1'),('p2','u2')",
            "INSERT INTO chat_groups (id,user_id,title) VALUES (1,'u1','travel')",
            "INSERT INTO chat_messages (id,chat_group_id,role,message) VALUES (1,1,'user','airport phrases'),(2,1,'ai','1. Where is the gate?')",
        ] {
            sqlx::query(statement).execute(&db_pool).await.unwrap();
        }
        db_pool
    }

    #[tokio::test]
    async fn bookmarks_an_assistant_reply_once() {
        let db_pool = seeded().await;

        let bookmark = bookmark_message(&db_pool, "u1", 2).await.unwrap();
        assert_eq!(bookmark.chat_message_id, 2);
        assert!(is_bookmarked(&db_pool, "u1", 2).await.unwrap());

        let err = bookmark_message(&db_pool, "u1", 2).await.unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn refuses_user_messages_and_foreign_messages() {
        let db_pool = seeded().await;

        let err = bookmark_message(&db_pool, "u1", 1).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = bookmark_message(&db_pool, "u2", 2).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err = bookmark_message(&db_pool, "u1", 99).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
