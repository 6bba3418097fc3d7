use axum::{debug_handler, extract::State, response::IntoResponse, Json};
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{extract::AppPath, session::SignedIn, AppResult, AppState, Describe};

/// Removes everything the account owns, children first.
pub(crate) async fn delete_account_data(db_pool: &SqlitePool, user_id: &str) -> Result<(), sqlx::Error> {
    let mut tx = db_pool.begin().await?;

    sqlx::query(
        "DELETE FROM bookmarks WHERE user_id=? OR chat_message_id IN (
            SELECT m.id FROM chat_messages m
            JOIN chat_groups g ON g.id = m.chat_group_id
            WHERE g.user_id=?
        )",
    )
        .bind(user_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM chat_messages WHERE chat_group_id IN (SELECT id FROM chat_groups WHERE user_id=?)")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM chat_groups WHERE user_id=?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM profiles WHERE user_id=?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_account(
    AppPath(user_id): AppPath<String>,
    State(db_pool): State<SqlitePool>,
    signed_in: SignedIn,
    session: Session,
) -> AppResult<impl IntoResponse> {
    signed_in.authorize(&user_id)?;

    delete_account_data(&db_pool, &user_id).await
        .describe("failed to delete the account")?;
    session.flush().await?;

    tracing::info!("deleted account u/{user_id}");
    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use crate::db::memory_pool;

    use super::*;

    #[tokio::test]
    async fn removes_only_the_callers_rows() {
        let db_pool = memory_pool().await;
        for statement in [
            "INSERT INTO profiles (id,user_id) VALUES ('p1','u1'),('p2','u2')",
            "INSERT INTO chat_groups (id,user_id,title) VALUES (1,'u1','mine'),(2,'u2','theirs')",
            "INSERT INTO chat_messages (id,chat_group_id,role,message) VALUES (1,1,'ai','a'),(2,2,'ai','b')",
            "INSERT INTO bookmarks (user_id,chat_message_id) VALUES ('u1',1),('u2',2)",
        ] {
            sqlx::query(statement).execute(&db_pool).await.unwrap();
        }

        delete_account_data(&db_pool, "u1").await.unwrap();

        for (table, expected) in [("profiles", 1), ("chat_groups", 1), ("chat_messages", 1), ("bookmarks", 1)] {
            let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&db_pool)
                .await
                .unwrap();
            assert_eq!(count, expected, "{table}");
        }

        let (owner,): (String,) = sqlx::query_as("SELECT user_id FROM chat_groups")
            .fetch_one(&db_pool)
            .await
            .unwrap();
        assert_eq!(owner, "u2");
    }
}
