use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::{AppError, AppResult};

pub const USER_ID: &str = "user_id";
pub const ACCESS_TOKEN: &str = "access_token";
pub const RECOVERY_TOKEN: &str = "recovery_token";

/// The id of the signed-in user. Rejects with 401 when the session has none.
#[derive(Debug, Clone)]
pub struct SignedIn(pub String);

impl<S> FromRequestParts<S> for SignedIn
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::from(msg))?;

        let Some(user_id) = session.get::<String>(USER_ID).await? else {
            return Err(AppError::unauthorized());
        };

        Ok(SignedIn(user_id))
    }
}

impl SignedIn {
    /// Checks that the caller is acting on their own account.
    pub fn authorize(&self, user_id: &str) -> AppResult<()> {
        if self.0 != user_id {
            return Err(AppError::forbidden());
        }
        Ok(())
    }
}
