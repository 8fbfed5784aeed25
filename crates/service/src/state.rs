use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use common::crypto::SecretKey;
use common::notify::NotificationDispatcher;
use common::profile::{ManagerConfig, ProfileManager};
use common::store::{StoreClient, StoreOps};

use super::config::{Config, ConfigError};
use super::notifier::Subscribers;

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Main service state - wires the store client into everything above it
pub struct State {
    ops: StoreOps,
    secret: SecretKey,
    notifications: NotificationDispatcher,
    subscribers: Subscribers,
    manager_config: ManagerConfig,
    /// One manager per user: the managers' local serialization only holds
    /// if every process touching a profile goes through the same instance.
    managers: Mutex<HashMap<String, Arc<ProfileManager>>>,
}

impl State {
    pub async fn from_config(
        config: &Config,
        store: Arc<dyn StoreClient>,
        notifications: NotificationDispatcher,
    ) -> Result<Self, StateSetupError> {
        config.validate()?;

        let secret = config.client_secret.clone().unwrap_or_else(SecretKey::generate);
        tracing::info!("client identity: {}", secret.public());

        let ops = StoreOps::new(store, config.store_timeout);
        tracing::info!(
            "store operations bounded at {:?}, {} put attempts",
            config.store_timeout,
            config.put_retry_limit
        );

        Ok(Self {
            ops,
            secret,
            notifications,
            subscribers: Subscribers::default(),
            manager_config: ManagerConfig {
                max_put_attempts: config.put_retry_limit,
                cache_ttl: config.profile_cache_ttl,
            },
            managers: Mutex::new(HashMap::new()),
        })
    }

    pub fn ops(&self) -> &StoreOps {
        &self.ops
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn notifications(&self) -> &NotificationDispatcher {
        &self.notifications
    }

    pub fn subscribers(&self) -> &Subscribers {
        &self.subscribers
    }

    /// The profile manager for a user, created on first use.
    ///
    /// Always returns the same instance for the same user id within this
    /// client, which is what makes concurrent local update cycles queue
    /// instead of race.
    pub fn profile_manager(
        &self,
        user_id: &str,
        profile_keys: SecretKey,
        protection: SecretKey,
    ) -> Arc<ProfileManager> {
        self.managers
            .lock()
            .entry(user_id.to_string())
            .or_insert_with(|| {
                Arc::new(ProfileManager::new(
                    self.ops.clone(),
                    user_id,
                    profile_keys,
                    protection,
                    self.manager_config.clone(),
                ))
            })
            .clone()
    }
}
