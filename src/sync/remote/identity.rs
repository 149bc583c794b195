//! Resolving who the current user is.
//!
//! The cached session is consulted first; the network check against the
//! auth service only runs when the cache is empty.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{RemoteError, Result};

/// File the session token is cached in, inside the data directory
pub const SESSION_FILE: &str = "session.json";

/// An authenticated identity plus the token that proves it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub access_token: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Session from the local cache, no network
    fn cached_session(&self) -> Option<Session>;

    /// Ask the auth service. `Ok(None)` means no valid session.
    async fn fetch_session(&self) -> Result<Option<Session>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSession {
    access_token: Option<String>,
    user_id: Option<String>,
}

impl StoredSession {
    fn session(&self) -> Option<Session> {
        match (&self.user_id, &self.access_token) {
            (Some(user_id), Some(token)) => Some(Session {
                user_id: user_id.clone(),
                access_token: token.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

/// Token-based identity cached in memory and in `session.json`
pub struct SessionIdentity {
    client: Client,
    auth_url: Option<String>,
    cache_path: PathBuf,
    stored: RwLock<StoredSession>,
}

impl SessionIdentity {
    pub fn new(auth_url: Option<String>, data_dir: &Path) -> Self {
        let cache_path = data_dir.join(SESSION_FILE);
        let stored = match fs::read_to_string(&cache_path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                log::warn!("Remote: ignoring unreadable session cache {:?}: {}", cache_path, e);
                StoredSession::default()
            }),
            Err(_) => StoredSession::default(),
        };

        Self {
            client: Client::new(),
            auth_url: auth_url.map(|url| url.trim_end_matches('/').to_string()),
            cache_path,
            stored: RwLock::new(stored),
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.stored
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .access_token
            .clone()
    }

    /// Remember a new token and resolve its user over the network.
    pub async fn login(&self, access_token: &str) -> Result<Option<Session>> {
        self.update(StoredSession {
            access_token: Some(access_token.to_string()),
            user_id: None,
        });
        self.fetch_session().await
    }

    /// Forget the cached session, in memory and on disk
    pub fn logout(&self) {
        self.update(StoredSession::default());
        if self.cache_path.exists() {
            if let Err(e) = fs::remove_file(&self.cache_path) {
                log::warn!("Remote: failed to remove session cache: {}", e);
            }
        }
    }

    fn update(&self, stored: StoredSession) {
        if stored.access_token.is_some() {
            match serde_json::to_string_pretty(&stored) {
                Ok(data) => {
                    if let Err(e) = fs::write(&self.cache_path, data) {
                        log::warn!("Remote: failed to write session cache: {}", e);
                    }
                }
                Err(e) => log::warn!("Remote: failed to serialize session: {}", e),
            }
        }
        *self.stored.write().unwrap_or_else(PoisonError::into_inner) = stored;
    }
}

#[async_trait]
impl IdentityProvider for SessionIdentity {
    fn cached_session(&self) -> Option<Session> {
        self.stored
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .session()
    }

    async fn fetch_session(&self) -> Result<Option<Session>> {
        let Some(token) = self.access_token() else {
            return Ok(None);
        };
        let Some(auth_url) = &self.auth_url else {
            return Ok(None);
        };

        let response = self
            .client
            .get(format!("{}/user", auth_url))
            .bearer_auth(&token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                log::debug!("Remote: auth service rejected the cached token");
                Ok(None)
            }
            status if !status.is_success() => Err(RemoteError::Status {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
            _ => {
                let user: AuthUser = response.json().await?;
                let session = Session {
                    user_id: user.id,
                    access_token: token,
                };
                self.update(StoredSession {
                    access_token: Some(session.access_token.clone()),
                    user_id: Some(session.user_id.clone()),
                });
                Ok(Some(session))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_session_cache_round_trips_through_disk() {
        let temp = TempDir::new().unwrap();
        let identity = SessionIdentity::new(None, temp.path());
        assert!(identity.cached_session().is_none());

        identity.update(StoredSession {
            access_token: Some("tok".to_string()),
            user_id: Some("user-1".to_string()),
        });

        let reopened = SessionIdentity::new(None, temp.path());
        assert_eq!(
            reopened.cached_session(),
            Some(Session {
                user_id: "user-1".to_string(),
                access_token: "tok".to_string(),
            })
        );

        reopened.logout();
        assert!(reopened.cached_session().is_none());
        assert!(!temp.path().join(SESSION_FILE).exists());
    }

    #[test]
    fn test_token_without_user_is_not_a_session() {
        let temp = TempDir::new().unwrap();
        let identity = SessionIdentity::new(None, temp.path());
        identity.update(StoredSession {
            access_token: Some("tok".to_string()),
            user_id: None,
        });
        assert!(identity.cached_session().is_none());
        assert_eq!(identity.access_token().as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_fetch_without_auth_url_finds_nothing() {
        let temp = TempDir::new().unwrap();
        let identity = SessionIdentity::new(None, temp.path());
        identity.update(StoredSession {
            access_token: Some("tok".to_string()),
            user_id: None,
        });
        assert_eq!(identity.fetch_session().await.unwrap(), None);
    }
}
