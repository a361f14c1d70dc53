use crate::models::{DashboardStats, GenerationOptions, Story, UserProfile};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Row, Sqlite, SqlitePool};
use std::path::Path;
use uuid::Uuid;

// Fixed keys in the settings table
pub const SETTINGS_KEY: &str = "image_settings";
pub const PROFILE_KEY: &str = "user_profile";
pub const SESSION_KEY: &str = "auth_session";

// Define the database schema using CREATE TABLE IF NOT EXISTS statements
const MIGRATIONS_SQL: &str = "
-- Stories Table
CREATE TABLE IF NOT EXISTS stories (
    id TEXT PRIMARY KEY NOT NULL, -- UUID
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    images TEXT NOT NULL, -- JSON array of generated images, gallery order
    created_at INTEGER NOT NULL, -- Unix Timestamp (milliseconds)
    updated_at INTEGER NOT NULL -- Unix Timestamp (milliseconds)
);
CREATE INDEX IF NOT EXISTS idx_stories_updated_at ON stories(updated_at);

-- Users Table
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL, -- UUID
    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
    name TEXT NOT NULL,
    password_hash TEXT NOT NULL, -- Argon2id PHC string
    created_at INTEGER NOT NULL -- Unix Timestamp (milliseconds)
);

-- Application Settings Table (Key-Value, JSON values)
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);
";

// Row from the users table. Never leaves the crate's account code.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StorageManager {
    pool: SqlitePool,
}

fn timestamp_from_millis(ms: i64, what: &str) -> Result<DateTime<Utc>, anyhow::Error> {
    DateTime::from_timestamp_millis(ms).context(format!("Invalid {} timestamp", what))
}

fn story_from_row(row: &SqliteRow) -> Result<Story, anyhow::Error> {
    let id: String = row.try_get("id")?;
    let images: String = row.try_get("images")?;
    Ok(Story {
        id: Uuid::parse_str(&id).context("Failed to parse story ID")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        images: serde_json::from_str(&images).context("Failed to parse story images JSON")?,
        created_at: timestamp_from_millis(row.try_get("created_at")?, "created_at")?,
        updated_at: timestamp_from_millis(row.try_get("updated_at")?, "updated_at")?,
    })
}

fn user_from_row(row: &SqliteRow) -> Result<UserRecord, anyhow::Error> {
    let id: String = row.try_get("id")?;
    Ok(UserRecord {
        id: Uuid::parse_str(&id).context("Failed to parse user ID")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        password_hash: row.try_get("password_hash")?,
        created_at: timestamp_from_millis(row.try_get("created_at")?, "created_at")?,
    })
}

impl StorageManager {
    /// Creates a new StorageManager, connects to the database, and runs migrations.
    pub async fn new(db_path: &Path) -> Result<Self, anyhow::Error> {
        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.to_string_lossy());
        log::info!("Connecting to database: {}", db_url);

        // Create the database file if it doesn't exist
        if !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            log::info!("Database file not found, creating...");
            Sqlite::create_database(&db_url)
                .await
                .context("Failed to create database")?;
        }

        let pool = SqlitePoolOptions::new()
            .connect(&db_url)
            .await
            .context("Failed to connect to SQLite database")?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies the database schema migrations.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), anyhow::Error> {
        log::info!("Running database migrations...");
        sqlx::query(MIGRATIONS_SQL)
            .execute(pool)
            .await
            .context("Failed to run database migrations")?;
        log::info!("Database migrations completed.");
        Ok(())
    }

    // --- Stories ---

    /// Fetches all stories, most recently updated first.
    pub async fn list_stories(&self) -> Result<Vec<Story>, anyhow::Error> {
        log::debug!("Fetching all stories from database");
        let rows = sqlx::query(
            r#"
            SELECT id, title, description, images, created_at, updated_at
            FROM stories
            ORDER BY updated_at DESC, rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch stories from database")?;

        let stories = rows
            .iter()
            .map(story_from_row)
            .collect::<Result<Vec<Story>, anyhow::Error>>()?;

        log::info!("Fetched {} stories", stories.len());
        Ok(stories)
    }

    /// Story totals and the most recent stories as of `now`.
    pub async fn dashboard_stats(&self, now: DateTime<Utc>) -> Result<DashboardStats, anyhow::Error> {
        let stories = self.list_stories().await?;
        Ok(DashboardStats::from_stories(stories, now))
    }

    pub async fn get_story(&self, story_id: Uuid) -> Result<Option<Story>, anyhow::Error> {
        let id_text = story_id.to_string();
        let row = sqlx::query(
            r#"
            SELECT id, title, description, images, created_at, updated_at
            FROM stories
            WHERE id = ?
            "#,
        )
        .bind(&id_text)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch story from database")?;

        row.as_ref().map(story_from_row).transpose()
    }

    /// Inserts the story, or replaces the stored copy with the same ID.
    pub async fn save_story(&self, story: &Story) -> Result<(), anyhow::Error> {
        log::debug!("Saving story ID: {} ({} images)", story.id, story.images.len());
        let id_text = story.id.to_string();
        let images_json =
            serde_json::to_string(&story.images).context("Failed to serialize story images")?;

        sqlx::query(
            r#"
            INSERT INTO stories (id, title, description, images, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                images = excluded.images,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&id_text)
        .bind(&story.title)
        .bind(&story.description)
        .bind(&images_json)
        .bind(story.created_at.timestamp_millis())
        .bind(story.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to save story to database")?;

        log::info!("Saved story '{}' ({})", story.title, story.id);
        Ok(())
    }

    /// Deletes a story. Returns whether a row was removed.
    pub async fn delete_story(&self, story_id: Uuid) -> Result<bool, anyhow::Error> {
        let id_text = story_id.to_string();
        log::warn!("Deleting story with ID: {}", id_text);

        let result = sqlx::query("DELETE FROM stories WHERE id = ?")
            .bind(&id_text)
            .execute(&self.pool)
            .await
            .context("Failed to delete story from database")?;

        if result.rows_affected() == 0 {
            log::warn!("Attempted to delete non-existent story: {}", story_id);
            return Ok(false);
        }
        Ok(true)
    }

    // --- Key-value settings ---

    pub async fn get_setting<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, anyhow::Error> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .context(format!("Failed to read setting '{}'", key))?;

        match row {
            Some(row) => {
                let value: String = row.try_get("value")?;
                let parsed = serde_json::from_str(&value)
                    .context(format!("Failed to parse setting '{}'", key))?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    pub async fn set_setting<T: Serialize>(&self, key: &str, value: &T) -> Result<(), anyhow::Error> {
        let value_json = serde_json::to_string(value).context("Failed to serialize setting")?;
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(&value_json)
        .execute(&self.pool)
        .await
        .context(format!("Failed to write setting '{}'", key))?;
        log::debug!("Stored setting '{}'", key);
        Ok(())
    }

    pub async fn delete_setting(&self, key: &str) -> Result<(), anyhow::Error> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .context(format!("Failed to delete setting '{}'", key))?;
        Ok(())
    }

    /// Generation settings, or the defaults when none were saved.
    pub async fn get_generation_options(&self) -> Result<GenerationOptions, anyhow::Error> {
        Ok(self.get_setting(SETTINGS_KEY).await?.unwrap_or_default())
    }

    pub async fn save_generation_options(&self, options: &GenerationOptions) -> Result<(), anyhow::Error> {
        self.set_setting(SETTINGS_KEY, options).await
    }

    pub async fn get_profile(&self) -> Result<UserProfile, anyhow::Error> {
        Ok(self.get_setting(PROFILE_KEY).await?.unwrap_or_default())
    }

    pub async fn save_profile(&self, profile: &UserProfile) -> Result<(), anyhow::Error> {
        self.set_setting(PROFILE_KEY, profile).await
    }

    // --- Users ---

    /// Inserts a new user. Returns `false` when the email is already registered.
    pub async fn insert_user(&self, user: &UserRecord) -> Result<bool, anyhow::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, email, name, password_hash, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.created_at.timestamp_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                log::info!("Created user {} ({})", user.email, user.id);
                Ok(true)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                log::warn!("User insert rejected, email already registered: {}", user.email);
                Ok(false)
            }
            Err(e) => Err(e).context("Failed to insert user into database"),
        }
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, anyhow::Error> {
        let row = sqlx::query(
            "SELECT id, email, name, password_hash, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query user by email")?;

        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn update_password_hash(&self, user_id: Uuid, password_hash: &str) -> Result<(), anyhow::Error> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update password hash")?;
        if result.rows_affected() == 0 {
            anyhow::bail!("No user with ID {}", user_id);
        }
        Ok(())
    }
}
