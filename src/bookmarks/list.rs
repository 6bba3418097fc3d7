use axum::{debug_handler, extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, SqlitePool};

use crate::{db::Role, extract::AppQuery, session::SignedIn, AppResult, AppState, Describe};

const DEFAULT_LIMIT: i64 = 10;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PageQuery {
    page: Option<i64>,
    limit: Option<i64>,
}

/// A bookmark together with the reply it points at and the group it came from.
#[derive(Debug, Serialize, FromRow)]
pub(crate) struct BookmarkEntry {
    pub(crate) id: i64,
    pub(crate) chat_message_id: i64,
    pub(crate) created_at: String,
    pub(crate) message: String,
    pub(crate) role: Role,
    pub(crate) message_created_at: String,
    pub(crate) chat_group_id: i64,
    pub(crate) chat_group_title: String,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub(crate) struct Pagination {
    pub(crate) current_page: i64,
    pub(crate) total_pages: i64,
    pub(crate) total_count: i64,
    pub(crate) limit: i64,
    pub(crate) has_next_page: bool,
    pub(crate) has_prev_page: bool,
}

impl Pagination {
    pub(crate) fn new(page: i64, limit: i64, total_count: i64) -> Self {
        let total_pages = (total_count + limit - 1) / limit;
        Pagination {
            current_page: page,
            total_pages,
            total_count,
            limit,
            has_next_page: page < total_pages,
            has_prev_page: page > 1,
        }
    }

    pub(crate) fn offset(&self) -> i64 {
        (self.current_page - 1) * self.limit
    }
}

impl PageQuery {
    /// Bounded so that `(page - 1) * limit` always fits in an `i64`.
    fn page(&self) -> i64 {
        self.page.unwrap_or(1).clamp(1, i64::MAX / MAX_LIMIT)
    }

    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

pub(crate) async fn bookmark_page(
    db_pool: &SqlitePool,
    user_id: &str,
    page: i64,
    limit: i64,
) -> Result<(Vec<BookmarkEntry>, Pagination), sqlx::Error> {
    let total_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookmarks WHERE user_id=?")
        .bind(user_id)
        .fetch_one(db_pool)
        .await?;

    let pagination = Pagination::new(page, limit, total_count);

    let entries = sqlx::query_as(
        "SELECT b.id, b.chat_message_id, b.created_at,
            m.message, m.role, m.created_at AS message_created_at, m.chat_group_id,
            COALESCE(g.title, 'untitled group') AS chat_group_title
        FROM bookmarks b
        JOIN chat_messages m ON m.id = b.chat_message_id
        JOIN chat_groups g ON g.id = m.chat_group_id
        WHERE b.user_id = ?
        ORDER BY b.created_at DESC, b.id DESC
        LIMIT ? OFFSET ?",
    )
        .bind(user_id)
        .bind(pagination.limit)
        .bind(pagination.offset())
        .fetch_all(db_pool)
        .await?;

    Ok((entries, pagination))
}

#[debug_handler(state = AppState)]
pub(crate) async fn bookmarks(
    AppQuery(query): AppQuery<PageQuery>,
    State(db_pool): State<SqlitePool>,
    SignedIn(user_id): SignedIn,
) -> AppResult<impl IntoResponse> {
    let (entries, pagination) = bookmark_page(&db_pool, &user_id, query.page(), query.limit()).await
        .describe("failed to fetch bookmarks")?;

    Ok(Json(json!({
        "success": true,
        "data": entries,
        "pagination": pagination,
    })))
}
