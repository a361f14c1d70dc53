use crate::accounts::AccountStore;
use crate::api::{ImageGenerationProvider, OpenAiImagesProvider};
use crate::config::AppConfig;
use crate::controller::{self, ControllerConfig, LiveControllerHandle};
use crate::models::ProviderConfig;
use crate::session::SessionProvider;
use crate::storage::StorageManager;
use anyhow::Result;
use std::sync::Arc;

// Application state shared by the embedding commands
#[derive(Clone)]
pub struct AppState {
    // The sqlx pool is already shareable, so no extra Mutex around storage
    pub storage: StorageManager,
    pub accounts: AccountStore,
    pub controller: LiveControllerHandle,
    pub provider_config: ProviderConfig,
}

impl AppState {
    pub fn new(
        storage: StorageManager,
        accounts: AccountStore,
        controller: LiveControllerHandle,
        provider_config: ProviderConfig,
    ) -> Self {
        Self {
            storage,
            accounts,
            controller,
            provider_config,
        }
    }

    /// Opens storage, builds the image provider and spawns the live controller
    /// with the saved generation settings. Must run inside a tokio runtime.
    pub async fn initialize(config: &AppConfig) -> Result<Self> {
        let storage = StorageManager::new(&config.db_path).await?;
        let accounts = AccountStore::new(storage.clone());

        let api_provider: Arc<dyn ImageGenerationProvider> = Arc::new(OpenAiImagesProvider::new(
            config.provider.clone(),
            config.request_timeout,
        )?);
        let sessions: Arc<dyn SessionProvider> = Arc::new(accounts.clone());
        let options = storage.get_generation_options().await?;

        let controller = controller::spawn(
            api_provider,
            sessions,
            ControllerConfig::from(config),
            options,
        );

        Ok(Self::new(storage, accounts, controller, config.provider.clone()))
    }
}
