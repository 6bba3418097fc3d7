use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, FromRow, SqlitePool};

/// Current time as stored in every `created_at`/`updated_at` column.
pub(crate) const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ','now')";

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect_with(options)
        .await?;

    migrate(&db_pool).await?;
    Ok(db_pool)
}

pub async fn migrate(db_pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(db_pool).await
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Profile {
    pub id: String,
    pub user_id: String,
    pub name: Option<String>,
    pub created_at: String,
    pub updated_at: String,

    // unique: user_id
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ChatGroup {
    pub id: i64,
    pub user_id: String,
    pub title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "assistant", alias = "model")]
    Ai,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub chat_group_id: i64,
    pub role: Role,
    pub message: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Bookmark {
    pub id: i64,
    pub user_id: String,
    pub chat_message_id: i64,
    pub created_at: String,
    pub updated_at: String,

    // unique: user_id, chat_message_id
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate(&db_pool).await.unwrap();
    db_pool
}
