use axum::{debug_handler, extract::State, http::StatusCode, response::IntoResponse, Json};
use rand::seq::IndexedRandom;
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    db::Profile,
    extract::{AppJson, AppPath},
    session::SignedIn,
    AppError, AppResult, AppState, Describe,
};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProfileForm {
    pub(crate) name: Option<String>,
}

impl ProfileForm {
    /// Blank names are stored as NULL.
    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|name| !name.is_empty())
    }
}

fn random_alias() -> String {
    let adjectives = [
        "Quick", "Lazy", "Mysterious", "Jolly", "Brave", "Silent", "Witty", "Fierce",
        "Clever", "Gentle", "Wild", "Calm", "Bold", "Shy", "Proud", "Happy", "Sad",
        "Eager", "Fancy", "Rusty", "Golden", "Silver", "Bright", "Dark", "Lucky",
    ];

    let nouns = [
        "Fox", "Bear", "Eagle", "Wolf", "Dragon", "Tiger", "Lion", "Owl", "Rabbit",
        "Falcon", "Hawk", "Shark", "Panda", "Kitten", "Puppy", "Phoenix", "Griffin",
        "Unicorn", "Turtle", "Dolphin", "Whale", "Elephant", "Giraffe", "Zebra",
    ];

    let mut rng = rand::rng();
    format!(
        "{} {}",
        adjectives.choose(&mut rng).unwrap_or(&"Quiet"),
        nouns.choose(&mut rng).unwrap_or(&"Learner"),
    )
}

async fn insert_profile(db_pool: &SqlitePool, user_id: &str, name: Option<&str>) -> Result<Profile, sqlx::Error> {
    sqlx::query_as("INSERT INTO profiles (id,user_id,name) VALUES (?,?,?) RETURNING *")
        .bind(Uuid::now_v7().to_string())
        .bind(user_id)
        .bind(name)
        .fetch_one(db_pool)
        .await
}

/// Creates a profile with a random display name on first sign-in.
pub(crate) async fn ensure_profile(db_pool: &SqlitePool, user_id: &str) -> Result<(), sqlx::Error> {
    let exists = sqlx::query("SELECT 1 FROM profiles WHERE user_id=?")
        .bind(user_id)
        .fetch_optional(db_pool)
        .await?
        .is_some();
    if exists {
        return Ok(());
    }

    let alias = random_alias();
    tracing::info!("adding profile u/{user_id}, {alias}");
    insert_profile(db_pool, user_id, Some(&alias)).await?;
    Ok(())
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_profile(
    AppPath(user_id): AppPath<String>,
    State(db_pool): State<SqlitePool>,
    signed_in: SignedIn,
    AppJson(form): AppJson<ProfileForm>,
) -> AppResult<impl IntoResponse> {
    signed_in.authorize(&user_id)?;

    let profile = match insert_profile(&db_pool, &user_id, form.name()).await {
        Ok(profile) => profile,
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(AppError::conflict("a profile already exists"));
        }
        Err(e) => Err(e).describe("failed to create the profile")?,
    };

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "data": profile })),
    ))
}
