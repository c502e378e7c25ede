use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::clients::app_service_client::AppServiceClient;
use crate::config::Config;
use crate::services::access::{AccessChecker, CachedAccessChecker, DenyAll, OpenAccess};
use crate::websocket::router::MessageRouter;
use crate::ws::registry::{ConnectionRegistry, InMemoryRegistry};

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub router: Arc<MessageRouter>,
    pub access: Arc<dyn AccessChecker>,
    pub access_cache: Option<Arc<CachedAccessChecker>>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wire the state with an explicit access checker.
    pub fn new(config: Config, access: Arc<dyn AccessChecker>) -> Self {
        let registry: Arc<dyn ConnectionRegistry> = Arc::new(InMemoryRegistry::new());
        Self {
            config: Arc::new(config),
            router: Arc::new(MessageRouter::new(registry, access.clone())),
            access,
            access_cache: None,
            started_at: Utc::now(),
        }
    }

    /// Wire the state from configuration: the app service when configured,
    /// otherwise open access in development and no access anywhere else.
    pub fn from_config(config: Config) -> Self {
        let backend: Option<Arc<dyn AccessChecker>> = match (&config.app_service_url, &config.cloud_auth_jwt_secret) {
            (Some(url), Some(secret)) => match AppServiceClient::new(url.clone(), secret.clone(), config.cloud_service_name.clone()) {
                Ok(client) => {
                    info!("Folder access checks go to {}", url);
                    Some(Arc::new(client))
                }
                Err(e) => {
                    warn!("Failed to build app service client: {}", e);
                    None
                }
            },
            _ => None,
        };

        match backend {
            Some(backend) => {
                let cached = Arc::new(CachedAccessChecker::new(backend, Duration::from_secs(config.access_cache_ttl_secs)));
                let mut state = Self::new(config, cached.clone());
                state.access_cache = Some(cached);
                state
            }
            None if config.is_development() => {
                warn!("No app service configured - folder access checks are disabled");
                Self::new(config, Arc::new(OpenAccess))
            }
            None => {
                warn!("No app service configured - every folder join will be denied");
                Self::new(config, Arc::new(DenyAll))
            }
        }
    }

    pub fn registry(&self) -> &Arc<dyn ConnectionRegistry> {
        self.router.registry()
    }
}
