//! Shared application state handed to every handler.

use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::Config,
    controllers::registry::{ControllerRegistry, RegistryError, ResourceStores, build_registry},
    db::DbPool,
    services::{
        ban_cache::BanListCache,
        localization::{Localizer, PassThrough},
    },
    store::{
        AbuseLedger, BanStore, KeyStore,
        memory::{MemoryAbuseLedger, MemoryBanStore, MemoryKeyStore},
        postgres::{PgAbuseLedger, PgBanStore, PgKeyStore},
    },
};

/// Storage backends the dispatcher runs on.
#[derive(Clone)]
pub struct Backends {
    pub keys: Arc<dyn KeyStore>,
    pub ledger: Arc<dyn AbuseLedger>,
    pub bans: Arc<dyn BanStore>,
    pub resources: ResourceStores,
}

impl Backends {
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            keys: Arc::new(PgKeyStore::new(pool.clone())),
            ledger: Arc::new(PgAbuseLedger::new(pool.clone())),
            bans: Arc::new(PgBanStore::new(pool.clone())),
            resources: ResourceStores::postgres(pool),
        }
    }

    /// Everything in process. Keys must be added to `keys` before use.
    pub fn in_memory(
        keys: Arc<MemoryKeyStore>,
        ledger: Arc<MemoryAbuseLedger>,
        bans: Arc<MemoryBanStore>,
    ) -> Self {
        Self {
            keys,
            ledger,
            bans,
            resources: ResourceStores::in_memory(),
        }
    }
}

/// Cloned into every request by axum; everything inside is shared.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub keys: Arc<dyn KeyStore>,
    pub ledger: Arc<dyn AbuseLedger>,
    pub bans: Arc<BanListCache>,
    pub registry: Arc<ControllerRegistry>,
    pub localizer: Arc<dyn Localizer>,
}

impl AppState {
    /// Build the state and the controller registry.
    ///
    /// # Errors
    ///
    /// Returns an error if a bundled controller fails to register.
    pub fn new(config: Config, backends: Backends) -> Result<Self, RegistryError> {
        let registry = build_registry(&backends.resources, &config)?;
        let bans = BanListCache::new(
            backends.bans,
            Duration::from_secs(config.ban_cache_ttl_secs),
        );

        Ok(Self {
            config: Arc::new(config),
            keys: backends.keys,
            ledger: backends.ledger,
            bans: Arc::new(bans),
            registry: Arc::new(registry),
            localizer: Arc::new(PassThrough),
        })
    }

    pub fn with_localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = localizer;
        self
    }
}
