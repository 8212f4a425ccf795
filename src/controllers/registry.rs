//! Startup-built table of applications and their resource controllers.
//!
//! Nothing is looked up by name at request time beyond a map hit: every
//! `{app}/{controller}` pair is registered once when the server starts.

use std::collections::HashMap;
use std::sync::Arc;

use super::{
    ResourceController, blog::EntriesController, forums::ForumsController,
    members::MembersController,
};
use crate::{
    config::Config,
    db::DbPool,
    error::{ApiError, RouteFault},
    models::{blog_entry::BlogEntry, forum::Forum, member::Member},
    routing::is_route_token,
    store::{EntityStore, memory::MemoryEntityStore, postgres::PgEntityStore},
};

/// An installed application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub token: String,
    pub enabled: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("`{0}` is not a valid route token")]
    InvalidToken(String),

    #[error("Application `{0}` is not registered")]
    UnknownApp(String),

    #[error("Application `{0}` is already registered")]
    DuplicateApp(String),

    #[error("Controller `{app}/{controller}` is already registered")]
    DuplicateController { app: String, controller: String },
}

fn normalize(token: &str) -> Result<String, RegistryError> {
    let token = token.to_ascii_lowercase();
    if is_route_token(&token) {
        Ok(token)
    } else {
        Err(RegistryError::InvalidToken(token))
    }
}

#[derive(Default)]
pub struct ControllerRegistry {
    apps: HashMap<String, Application>,
    controllers: HashMap<(String, String), Arc<dyn ResourceController>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_app(&mut self, token: &str, enabled: bool) -> Result<(), RegistryError> {
        let token = normalize(token)?;
        if self.apps.contains_key(&token) {
            return Err(RegistryError::DuplicateApp(token));
        }

        self.apps.insert(token.clone(), Application { token, enabled });
        Ok(())
    }

    pub fn register(
        &mut self,
        app: &str,
        controller: &str,
        handler: Arc<dyn ResourceController>,
    ) -> Result<(), RegistryError> {
        let app = normalize(app)?;
        let controller = normalize(controller)?;

        if !self.apps.contains_key(&app) {
            return Err(RegistryError::UnknownApp(app));
        }

        let key = (app, controller);
        if self.controllers.contains_key(&key) {
            let (app, controller) = key;
            return Err(RegistryError::DuplicateController { app, controller });
        }

        self.controllers.insert(key, handler);
        Ok(())
    }

    pub fn application(&self, token: &str) -> Option<&Application> {
        self.apps.get(token)
    }

    /// Find the controller for already-validated, lower-cased tokens.
    ///
    /// # Errors
    ///
    /// - `InvalidApp` (404) if no such application is installed
    /// - `AppDisabled` (503) if the application is switched off
    /// - `InvalidController` (404) if the application has no such controller
    pub fn resolve(
        &self,
        app: &str,
        controller: &str,
    ) -> Result<Arc<dyn ResourceController>, ApiError> {
        let application = self
            .apps
            .get(app)
            .ok_or(ApiError::InvalidApp(RouteFault::Unknown))?;

        if !application.enabled {
            return Err(ApiError::AppDisabled);
        }

        self.controllers
            .get(&(app.to_string(), controller.to_string()))
            .cloned()
            .ok_or(ApiError::InvalidController(RouteFault::Unknown))
    }
}

/// Tables behind the bundled resource controllers.
#[derive(Clone)]
pub struct ResourceStores {
    pub members: Arc<dyn EntityStore<Member>>,
    pub entries: Arc<dyn EntityStore<BlogEntry>>,
    pub forums: Arc<dyn EntityStore<Forum>>,
}

impl ResourceStores {
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            members: Arc::new(PgEntityStore::<Member>::new(pool.clone())),
            entries: Arc::new(PgEntityStore::<BlogEntry>::new(pool.clone())),
            forums: Arc::new(PgEntityStore::<Forum>::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            members: Arc::new(MemoryEntityStore::<Member>::new()),
            entries: Arc::new(MemoryEntityStore::<BlogEntry>::new()),
            forums: Arc::new(MemoryEntityStore::<Forum>::new()),
        }
    }
}

/// Register the bundled applications: `core`, `blog` and `forums`.
///
/// Applications named in `DISABLED_APPS` are installed but switched off.
pub fn build_registry(
    stores: &ResourceStores,
    config: &Config,
) -> Result<ControllerRegistry, RegistryError> {
    let mut registry = ControllerRegistry::new();

    for app in ["core", "blog", "forums"] {
        registry.register_app(app, !config.is_app_disabled(app))?;
    }

    registry.register(
        "core",
        "members",
        Arc::new(MembersController::new(
            stores.members.clone(),
            stores.entries.clone(),
        )),
    )?;
    registry.register(
        "blog",
        "entries",
        Arc::new(EntriesController::new(
            stores.entries.clone(),
            stores.members.clone(),
        )),
    )?;
    registry.register(
        "forums",
        "forums",
        Arc::new(ForumsController::new(stores.forums.clone())),
    )?;

    Ok(registry)
}
