// Commands exposed to the embedding UI layer. Errors come back as
// user-facing strings; the detailed error is logged here.

use crate::accounts::AccountError;
use crate::config;
use crate::models::{DashboardStats, GenerationOptions, SessionUser, Story, UserProfile};
use crate::state::AppState;
use chrono::Utc;
use uuid::Uuid;

fn parse_id(kind: &str, id: &str) -> Result<Uuid, String> {
    Uuid::parse_str(id).map_err(|_| {
        let err_msg = format!("Invalid {} ID format: {}", kind, id);
        log::error!("{}", err_msg);
        err_msg
    })
}

fn account_error(action: &str, e: AccountError) -> String {
    match e {
        AccountError::Internal(inner) => {
            log::error!("{} failed: {:?}", action, inner);
            format!("Failed to {}", action)
        }
        other => other.to_string(),
    }
}

// --- Story Commands ---

/// Bundles the current gallery into a new story.
pub async fn save_gallery_as_story(
    state: &AppState,
    title: String,
    description: String,
) -> Result<Story, String> {
    log::info!("Frontend requested to save gallery as story: {}", title);

    if title.trim().is_empty() {
        return Err("Please enter a title for your story".to_string());
    }

    state
        .controller
        .flush()
        .await
        .map_err(|e| format!("Failed to read gallery: {}", e))?;
    let images = state.controller.current_images();
    if images.is_empty() {
        return Err("Please generate at least one image".to_string());
    }

    let now = Utc::now();
    let story = Story {
        id: Uuid::new_v4(),
        title: title.trim().to_string(),
        description: description.trim().to_string(),
        images,
        created_at: now,
        updated_at: now,
    };

    match state.storage.save_story(&story).await {
        Ok(()) => Ok(story),
        Err(e) => {
            log::error!("Failed to save story {}: {:?}", story.id, e);
            Err(format!("Failed to save story: {}", e))
        }
    }
}

pub async fn list_stories(state: &AppState) -> Result<Vec<Story>, String> {
    log::info!("Frontend requested to list stories");
    match state.storage.list_stories().await {
        Ok(stories) => Ok(stories),
        Err(e) => {
            log::error!("Failed to list stories: {:?}", e);
            Err(format!("Failed to load stories: {}", e))
        }
    }
}

pub async fn dashboard_stats(state: &AppState) -> Result<DashboardStats, String> {
    state.storage.dashboard_stats(Utc::now()).await.map_err(|e| {
        log::error!("Failed to compute dashboard stats: {:?}", e);
        format!("Failed to load dashboard: {}", e)
    })
}

pub async fn get_story(state: &AppState, story_id: String) -> Result<Story, String> {
    let story_uuid = parse_id("story", &story_id)?;
    match state.storage.get_story(story_uuid).await {
        Ok(Some(story)) => Ok(story),
        Ok(None) => Err(format!("Story {} not found", story_id)),
        Err(e) => {
            log::error!("Failed to load story {}: {:?}", story_id, e);
            Err(format!("Failed to load story: {}", e))
        }
    }
}

pub async fn delete_story(state: &AppState, story_id: String) -> Result<(), String> {
    log::warn!("Frontend requested to delete story ID: {}", story_id);
    let story_uuid = parse_id("story", &story_id)?;
    state
        .storage
        .delete_story(story_uuid)
        .await
        .map(|_| ())
        .map_err(|e| {
            log::error!("Failed to delete story {}: {:?}", story_id, e);
            format!("Failed to delete story: {}", e)
        })
}

// --- Live Gallery Commands ---

pub async fn remove_image(state: &AppState, image_id: String) -> Result<bool, String> {
    let image_uuid = parse_id("image", &image_id)?;
    state
        .controller
        .remove_image(image_uuid)
        .await
        .map_err(|e| format!("Failed to remove image: {}", e))
}

// --- Settings & Profile Commands ---

pub async fn get_settings(state: &AppState) -> Result<GenerationOptions, String> {
    state.storage.get_generation_options().await.map_err(|e| {
        log::error!("Failed to load settings: {:?}", e);
        format!("Failed to load settings: {}", e)
    })
}

/// Persists new generation settings. The live controller uses them from the
/// next request on; an in-flight request keeps its snapshot.
pub async fn update_settings(state: &AppState, options: GenerationOptions) -> Result<(), String> {
    log::info!("Frontend requested to update settings: {:?}", options);
    if options.width == 0 || options.height == 0 {
        return Err("Width and height must be greater than zero.".to_string());
    }
    if options.num_inference_steps == 0 {
        return Err("Inference steps must be greater than zero.".to_string());
    }
    if !options.guidance_scale.is_finite() || options.guidance_scale < 0.0 {
        return Err("Guidance scale must be a non-negative number.".to_string());
    }

    state
        .storage
        .save_generation_options(&options)
        .await
        .map_err(|e| format!("Failed to save settings: {}", e))?;
    state.controller.update_options(options);
    Ok(())
}

pub async fn get_profile(state: &AppState) -> Result<UserProfile, String> {
    state.storage.get_profile().await.map_err(|e| {
        log::error!("Failed to load profile: {:?}", e);
        format!("Failed to load profile: {}", e)
    })
}

pub async fn update_profile(state: &AppState, profile: UserProfile) -> Result<(), String> {
    log::info!("Frontend requested to update profile");
    if profile.name.trim().is_empty() {
        return Err("Name cannot be empty.".to_string());
    }
    state
        .storage
        .save_profile(&profile)
        .await
        .map_err(|e| format!("Failed to save profile: {}", e))
}

pub fn set_api_key(state: &AppState, api_key: String) -> Result<(), String> {
    if api_key.trim().is_empty() {
        return Err("API key cannot be empty.".to_string());
    }
    config::set_api_key_in_keyring(&state.provider_config, api_key.trim())
        .map_err(|e| format!("Failed to store API key: {}", e))
}

// --- Account Commands ---

// Re-runs the session gate so the controller follows the account state
async fn refresh_gate(state: &AppState) {
    if let Err(e) = state.controller.start().await {
        log::error!("Failed to re-evaluate session gate: {:?}", e);
    }
}

pub async fn sign_up(
    state: &AppState,
    email: String,
    password: String,
    name: String,
) -> Result<SessionUser, String> {
    log::info!("Frontend requested sign-up for {}", email);
    let session = state
        .accounts
        .sign_up(&email, &password, &name)
        .await
        .map_err(|e| account_error("create account", e))?;
    refresh_gate(state).await;
    Ok(session.user)
}

pub async fn login(state: &AppState, email: String, password: String) -> Result<SessionUser, String> {
    log::info!("Frontend requested login for {}", email);
    let session = state
        .accounts
        .login(&email, &password)
        .await
        .map_err(|e| account_error("login", e))?;
    refresh_gate(state).await;
    Ok(session.user)
}

pub async fn logout(state: &AppState) -> Result<(), String> {
    state
        .accounts
        .logout()
        .await
        .map_err(|e| account_error("logout", e))?;
    refresh_gate(state).await;
    Ok(())
}

pub async fn current_user(state: &AppState) -> Result<Option<SessionUser>, String> {
    state.accounts.current_user().await.map_err(|e| {
        log::error!("Failed to read session: {:?}", e);
        format!("Failed to read session: {}", e)
    })
}

pub async fn change_password(
    state: &AppState,
    current_password: String,
    new_password: String,
) -> Result<(), String> {
    let Some(user) = current_user(state).await? else {
        return Err("User not authenticated".to_string());
    };
    state
        .accounts
        .change_password(&user.email, &current_password, &new_password)
        .await
        .map_err(|e| account_error("change password", e))
}
