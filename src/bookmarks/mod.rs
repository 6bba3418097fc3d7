mod list;
mod mark;

use axum::{routing::get, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list::bookmarks).post(mark::add_bookmark))
        .route("/{chat_message_id}", get(mark::bookmark_status).delete(mark::remove_bookmark))
}
