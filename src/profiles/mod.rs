mod page;
mod new;
mod delete;

use axum::{routing::get, Router};

use crate::AppState;

pub(crate) use new::ensure_profile;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/{user_id}",
            get(page::profile)
                .post(new::new_profile)
                .patch(page::update_profile)
                .delete(delete::delete_account),
        )
}
