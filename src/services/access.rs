use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::ws::error::CollabError;

/// Folder roles, ordered by what they allow.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Editor,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Editor => "editor",
            Role::Owner => "owner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    #[serde(default)]
    pub role: Option<Role>,
}

impl AccessDecision {
    pub fn allow(role: Role) -> Self {
        Self { allowed: true, role: Some(role) }
    }

    pub fn deny() -> Self {
        Self { allowed: false, role: None }
    }
}

/// Permission check owned by the application service.
#[async_trait]
pub trait AccessChecker: Send + Sync {
    async fn check_access(&self, folder_id: &str, user_id: &str, required_role: Role) -> Result<AccessDecision, CollabError>;
}

/// Grants everything. Only for local development without an app service.
pub struct OpenAccess;

#[async_trait]
impl AccessChecker for OpenAccess {
    async fn check_access(&self, folder_id: &str, user_id: &str, _required_role: Role) -> Result<AccessDecision, CollabError> {
        warn!("Access checks disabled - allowing {} on folder {}", user_id, folder_id);
        Ok(AccessDecision::allow(Role::Owner))
    }
}

pub struct DenyAll;

#[async_trait]
impl AccessChecker for DenyAll {
    async fn check_access(&self, _folder_id: &str, _user_id: &str, _required_role: Role) -> Result<AccessDecision, CollabError> {
        Ok(AccessDecision::deny())
    }
}

/// Caches positive decisions for a short while so that reorder bursts do not
/// hit the app service for every message. Denials are never cached.
pub struct CachedAccessChecker {
    inner: Arc<dyn AccessChecker>,
    cache: Cache<(String, String, Role), AccessDecision>,
}

impl CachedAccessChecker {
    pub fn new(inner: Arc<dyn AccessChecker>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(ttl)
            .build();
        Self { inner, cache }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl AccessChecker for CachedAccessChecker {
    async fn check_access(&self, folder_id: &str, user_id: &str, required_role: Role) -> Result<AccessDecision, CollabError> {
        let key = (folder_id.to_string(), user_id.to_string(), required_role);
        if let Some(decision) = self.cache.get(&key).await {
            return Ok(decision);
        }

        debug!("Access cache miss for {} on folder {} ({})", user_id, folder_id, required_role);
        let decision = self.inner.check_access(folder_id, user_id, required_role).await?;
        if decision.allowed {
            self.cache.insert(key, decision.clone()).await;
        }
        Ok(decision)
    }
}
