use crate::config::{AppConfig, StoreBackend};
use crate::db;
use crate::users::{
    memory::InMemoryUserStore,
    repo::{PgUserStore, UserStore},
    services::AccountService,
};
use anyhow::Context;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let store: Arc<dyn UserStore> = match config.store {
            StoreBackend::Postgres => {
                let db_config = config
                    .database
                    .as_ref()
                    .context("database config missing for postgres store")?;
                let pool = db::connect(db_config).await?;
                db::migrate(&pool).await;
                Arc::new(PgUserStore::new(pool))
            }
            StoreBackend::Memory => {
                tracing::warn!("using in-memory user store; records are lost on restart");
                Arc::new(InMemoryUserStore::new())
            }
        };

        Ok(Self::from_parts(store, Arc::new(config)))
    }

    pub fn from_parts(store: Arc<dyn UserStore>, config: Arc<AppConfig>) -> Self {
        Self {
            accounts: AccountService::new(store),
            config,
        }
    }

    #[cfg(test)]
    pub fn with_store(store: Arc<dyn UserStore>, policy: crate::config::AccountPolicy) -> Self {
        let config = Arc::new(AppConfig {
            store: StoreBackend::Memory,
            database: None,
            host: "127.0.0.1".into(),
            port: 0,
            policy,
        });
        Self::from_parts(store, config)
    }

    #[cfg(test)]
    pub fn fake(policy: crate::config::AccountPolicy) -> Self {
        Self::with_store(Arc::new(InMemoryUserStore::new()), policy)
    }
}
