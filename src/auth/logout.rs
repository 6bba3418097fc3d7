use axum::{debug_handler, response::IntoResponse, Json};
use serde_json::json;
use tower_sessions::Session;

use crate::AppResult;

#[debug_handler]
pub(crate) async fn sign_out(session: Session) -> AppResult<impl IntoResponse> {
    session.flush().await?;
    Ok(Json(json!({ "success": true, "message": "signed out" })))
}
