use axum::{debug_handler, extract::State, response::IntoResponse, Json};
use sqlx::SqlitePool;

use crate::{db::ChatGroup, session::SignedIn, AppResult, AppState, Describe};

#[debug_handler(state = AppState)]
pub(crate) async fn groups(
    State(db_pool): State<SqlitePool>,
    SignedIn(user_id): SignedIn,
) -> AppResult<impl IntoResponse> {
    let groups: Vec<ChatGroup> =
        sqlx::query_as("SELECT * FROM chat_groups WHERE user_id=? ORDER BY updated_at DESC, id DESC")
            .bind(&user_id)
            .fetch_all(&db_pool)
            .await
            .describe("failed to fetch chat groups")?;

    Ok(Json(groups))
}
