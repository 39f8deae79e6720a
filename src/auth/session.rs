use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::KeyValueStore;

/// Durable key holding the id of the most recently logged-in user.
const KEY_LAST_USER: &str = "lastUserId";
/// Durable key holding the bearer token from the last successful login.
const KEY_AUTH_TOKEN: &str = "authToken";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    pub logged_in_at: DateTime<Utc>,
}

/// Current-user state backed by the durable store.
///
/// Persistence here is fail-soft: a login that cannot be written to disk is
/// still a login for the rest of this run, it just will not survive a
/// relaunch.
pub struct Session<S> {
    store: Arc<S>,
    data: Option<SessionData>,
}

impl<S: KeyValueStore> Session<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, data: None }
    }

    /// Rehydrate session state from the durable keys, if a previous run
    /// left any behind. Returns the restored user id.
    pub async fn restore(&mut self) -> Option<String> {
        let user_id = match self.store.get(KEY_LAST_USER).await {
            Ok(Some(id)) if !id.is_empty() => id,
            Ok(_) => return None,
            Err(err) => {
                warn!(error = %err, "could not read persisted session");
                return None;
            }
        };
        let token = match self.store.get(KEY_AUTH_TOKEN).await {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, "could not read persisted auth token");
                None
            }
        };
        debug!(user_id = %user_id, has_token = token.is_some(), "session restored");
        self.data = Some(SessionData {
            user_id: user_id.clone(),
            name: None,
            token,
            logged_in_at: Utc::now(),
        });
        Some(user_id)
    }

    /// Record a fresh login and persist it for the next launch.
    pub async fn establish(&mut self, data: SessionData) {
        if let Err(err) = self.store.set(KEY_LAST_USER, &data.user_id).await {
            warn!(error = %err, "could not persist session user id");
        }
        match &data.token {
            Some(token) => {
                if let Err(err) = self.store.set(KEY_AUTH_TOKEN, token).await {
                    warn!(error = %err, "could not persist auth token");
                }
            }
            None => {
                if let Err(err) = self.store.remove(KEY_AUTH_TOKEN).await {
                    warn!(error = %err, "could not drop stale auth token");
                }
            }
        }
        self.data = Some(data);
    }

    /// Forget the current user in memory and on disk. Cached entities and
    /// pending queues are left alone; they are scoped by user id.
    pub async fn clear(&mut self) {
        self.data = None;
        if let Err(err) = self.store.remove_many(&[KEY_LAST_USER, KEY_AUTH_TOKEN]).await {
            warn!(error = %err, "could not clear session keys");
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.user_id.as_str())
    }

    pub fn token(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.token.as_deref())
    }

    pub fn data(&self) -> Option<&SessionData> {
        self.data.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.data.is_some()
    }
}
