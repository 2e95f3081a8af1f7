use crate::config::{AppConfig, StoreBackend};
use crate::trainees::{InMemoryTraineeStore, PgTraineeStore, TraineeStore};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn TraineeStore>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = match config.store_backend {
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL must be set")?;
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await?;
                sqlx::migrate!("./migrations").run(&db).await?;
                info!("postgres store ready");
                Arc::new(PgTraineeStore::new(db, config.import.write_concurrency))
                    as Arc<dyn TraineeStore>
            }
            StoreBackend::Memory => {
                warn!("using in-memory store; data is lost on restart");
                Arc::new(InMemoryTraineeStore::new()) as Arc<dyn TraineeStore>
            }
        };

        Ok(Self::from_parts(config, store))
    }

    pub fn from_parts(config: Arc<AppConfig>, store: Arc<dyn TraineeStore>) -> Self {
        Self { config, store }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use crate::config::{ImportConfig, JwtConfig};

        let config = Arc::new(AppConfig {
            store_backend: StoreBackend::Memory,
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
            },
            import: ImportConfig::default(),
            admin_seed: None,
        });

        Self::from_parts(config, Arc::new(InMemoryTraineeStore::new()))
    }
}
