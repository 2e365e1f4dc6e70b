use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::{
    config::{Config, ProfileBackend},
    database::{MemoryProfileStore, PgProfileStore, ProfileStore},
    store::Collections,
};

pub struct AppState {
    pub config: Config,
    pub collections: Collections,
    pub profiles: Arc<dyn ProfileStore>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        info!("Opening collections in {}", config.data_dir.display());
        let collections = Collections::open(&config.data_dir)
            .await
            .context("Failed to initialize collection files")?;

        let profiles: Arc<dyn ProfileStore> = match config.profile_backend {
            ProfileBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL is required for the postgres profile store")?;
                Arc::new(PgProfileStore::connect_lazy(url).context("Invalid DATABASE_URL")?)
            }
            ProfileBackend::Memory => {
                warn!("Using in-memory profile store, profiles are lost on restart");
                Arc::new(MemoryProfileStore::default())
            }
        };

        Ok(Self::with_profiles(config, collections, profiles))
    }

    pub fn with_profiles(
        config: Config,
        collections: Collections,
        profiles: Arc<dyn ProfileStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            collections,
            profiles,
        })
    }
}
