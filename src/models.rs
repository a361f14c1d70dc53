use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Payload returned by the image service: inline base64 bytes or a fetchable URL
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ImageData {
    Inline(String), // base64, no data: prefix
    Url(String),
}

impl ImageData {
    /// Returns something a browser or viewer can load directly.
    pub fn to_src(&self) -> String {
        match self {
            ImageData::Inline(b64) => format!("data:image/png;base64,{}", b64),
            ImageData::Url(url) => url.clone(),
        }
    }

    /// Decodes inline bytes. URL payloads have to be fetched by the caller.
    pub fn decode_inline(&self) -> anyhow::Result<Option<Vec<u8>>> {
        match self {
            ImageData::Inline(b64) => Ok(Some(STANDARD.decode(b64)?)),
            ImageData::Url(_) => Ok(None),
        }
    }
}

// One produced image. Created only on a successful generation, never mutated.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GeneratedImage {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub prompt: String,
    pub image_data: ImageData,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

// Generation parameters, snapshotted when a request is issued
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GenerationOptions {
    pub width: u32,
    pub height: u32,
    pub guidance_scale: f32,
    pub num_inference_steps: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            guidance_scale: 0.0,
            num_inference_steps: 4,
            seed: None,
        }
    }
}

// A named, ordered bundle of generated images
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Story {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub images: Vec<GeneratedImage>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

pub const DASHBOARD_RECENT_LIMIT: usize = 6;

/// Dashboard summary over all saved stories.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DashboardStats {
    pub total_stories: usize,
    pub total_images: usize,
    /// Stories updated within the last 24 hours
    pub recent_activity: usize,
    pub recent: Vec<Story>,
}

impl DashboardStats {
    /// `stories` must be ordered most recently updated first.
    pub fn from_stories(stories: Vec<Story>, now: DateTime<Utc>) -> Self {
        let day_ago = now - chrono::Duration::hours(24);
        let total_images = stories.iter().map(|s| s.images.len()).sum();
        let recent_activity = stories.iter().filter(|s| s.updated_at > day_ago).count();
        let total_stories = stories.len();
        let mut recent = stories;
        recent.truncate(DASHBOARD_RECENT_LIMIT);
        Self {
            total_stories,
            total_images,
            recent_activity,
            recent,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserProfile {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            name: "User".to_string(),
            email: String::new(),
            avatar: None,
        }
    }
}

// Public identity carried by a session
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub user: SessionUser,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

// Where the API key for the image service comes from, plus endpoint details
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ProviderConfig {
    pub name: String, // also the keyring "username"
    pub api_url: String, // Base URL, e.g. https://api.together.xyz/v1
    pub model: String,
    // 'keyring' or 'env:MY_API_KEY' or null
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_ref: Option<String>,
}
