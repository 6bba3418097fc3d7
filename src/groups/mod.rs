mod group;
mod list;
pub(crate) mod msg;
mod new;

use axum::{routing::{get, post}, Router};
use sqlx::SqlitePool;

use crate::{chat, db::ChatGroup, AppError, AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list::groups).post(new::new_group))
        .route("/{id}", get(group::group).patch(group::rename_group).delete(group::delete_group))
        .route("/{id}/messages", get(msg::messages).post(msg::save_message))
        .route("/{id}/chat", post(chat::chat))
}

/// Loads a group the caller owns. Someone else's group looks exactly like a
/// missing one.
pub(crate) async fn owned_group(db_pool: &SqlitePool, group_id: i64, user_id: &str) -> AppResult<ChatGroup> {
    sqlx::query_as("SELECT * FROM chat_groups WHERE id=? AND user_id=?")
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| AppError::not_found("unauthorized or group not found"))
}

/// Titles are trimmed and must not be empty.
pub(crate) fn clean_title(title: &str) -> AppResult<&str> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("title is required"));
    }
    Ok(title)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::db::memory_pool;

    use super::*;

    #[test]
    fn titles_are_trimmed() {
        assert_eq!(clean_title("  Business phrases ").unwrap(), "Business phrases");
        assert_eq!(clean_title(" \t ").unwrap_err().status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn foreign_group_is_not_found() {
        let db_pool = memory_pool().await;
        sqlx::query("INSERT INTO profiles (id,user_id) VALUES ('p1','u1'),('p2','u2')")
            .execute(&db_pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO chat_groups (id,user_id,title) VALUES (7,'u1','travel')")
            .execute(&db_pool)
            .await
            .unwrap();

        assert_eq!(owned_group(&db_pool, 7, "u1").await.unwrap().title.as_deref(), Some("travel"));

        let err = owned_group(&db_pool, 7, "u2").await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        let err = owned_group(&db_pool, 8, "u1").await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
