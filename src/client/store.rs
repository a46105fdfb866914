/// Client-side session persistence
///
/// Each entry carries its own expiry; expired entries read back as absent.
use crate::{
    account::{Tokens, User},
    client::{
        config::SessionTtl,
        error::{ClientError, ClientResult},
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};
use tokio::sync::Mutex;

/// Value with an absolute expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Expiring<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

impl<T: Clone> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { value, expires_at }
    }

    fn live(&self, now: DateTime<Utc>) -> Option<T> {
        (now < self.expires_at).then(|| self.value.clone())
    }
}

/// Persisted session layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionData {
    access_token: Option<Expiring<String>>,
    refresh_token: Option<Expiring<String>>,
    user: Option<Expiring<User>>,
}

impl SessionData {
    fn snapshot(&self) -> SessionSnapshot {
        let now = Utc::now();
        SessionSnapshot {
            access_token: self.access_token.as_ref().and_then(|e| e.live(now)),
            refresh_token: self.refresh_token.as_ref().and_then(|e| e.live(now)),
            user: self.user.as_ref().and_then(|e| e.live(now)),
        }
    }

    fn set_tokens(&mut self, tokens: &Tokens, ttl: &SessionTtl) {
        self.access_token = Some(Expiring::new(tokens.access_token.clone(), ttl.access_token));
        self.refresh_token = Some(Expiring::new(
            tokens.refresh_token.clone(),
            ttl.refresh_token,
        ));
    }

    fn set_user(&mut self, user: &User, ttl: &SessionTtl) {
        self.user = Some(Expiring::new(user.clone(), ttl.user));
    }
}

/// Unexpired session entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<User>,
}

/// Storage backend for the session client
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read the current, unexpired entries
    async fn load(&self) -> ClientResult<SessionSnapshot>;

    /// Replace both tokens in a single write
    async fn save_tokens(&self, tokens: &Tokens, ttl: &SessionTtl) -> ClientResult<()>;

    async fn save_user(&self, user: &User, ttl: &SessionTtl) -> ClientResult<()>;

    /// Remove every entry
    async fn clear(&self) -> ClientResult<()>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    data: Mutex<SessionData>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> ClientResult<SessionSnapshot> {
        Ok(self.data.lock().await.snapshot())
    }

    async fn save_tokens(&self, tokens: &Tokens, ttl: &SessionTtl) -> ClientResult<()> {
        self.data.lock().await.set_tokens(tokens, ttl);
        Ok(())
    }

    async fn save_user(&self, user: &User, ttl: &SessionTtl) -> ClientResult<()> {
        self.data.lock().await.set_user(user, ttl);
        Ok(())
    }

    async fn clear(&self) -> ClientResult<()> {
        *self.data.lock().await = SessionData::default();
        Ok(())
    }
}

/// JSON file store surviving process restarts.
///
/// Writes go to a sibling temp file which is then renamed over the target.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read(&self) -> ClientResult<SessionData> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SessionData::default())
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(data) => Ok(data),
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "discarding unreadable session file");
                Ok(SessionData::default())
            }
        }
    }

    async fn write(&self, data: &SessionData) -> ClientResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(data)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            ClientError::Store(format!("Failed to replace {:?}: {}", self.path, e))
        })?;

        Ok(())
    }

    async fn update<F>(&self, apply: F) -> ClientResult<()>
    where
        F: FnOnce(&mut SessionData) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut data = self.read().await?;
        apply(&mut data);
        self.write(&data).await
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> ClientResult<SessionSnapshot> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.snapshot())
    }

    async fn save_tokens(&self, tokens: &Tokens, ttl: &SessionTtl) -> ClientResult<()> {
        self.update(|data| data.set_tokens(tokens, ttl)).await
    }

    async fn save_user(&self, user: &User, ttl: &SessionTtl) -> ClientResult<()> {
        self.update(|data| data.set_user(user, ttl)).await
    }

    async fn clear(&self) -> ClientResult<()> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CertificationStatus, Role};

    fn tokens(tag: &str) -> Tokens {
        Tokens {
            access_token: format!("access-{}", tag),
            refresh_token: format!("refresh-{}", tag),
        }
    }

    fn user() -> User {
        let now = Utc::now();
        User {
            id: "u1".to_string(),
            email: "f@x.com".to_string(),
            name: "F".to_string(),
            farm_size: Some(2.0),
            crop_type: Some("maize".to_string()),
            role: Role::Farmer,
            status: CertificationStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip_and_clear() {
        let store = MemorySessionStore::new();
        let ttl = SessionTtl::default();

        store.save_tokens(&tokens("a"), &ttl).await.unwrap();
        store.save_user(&user(), &ttl).await.unwrap();
        let snapshot = store.load().await.unwrap();
        assert_eq!(snapshot.access_token.as_deref(), Some("access-a"));
        assert_eq!(snapshot.refresh_token.as_deref(), Some("refresh-a"));
        assert_eq!(snapshot.user.unwrap().id, "u1");

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), SessionSnapshot::default());
    }

    #[tokio::test]
    async fn test_expired_entries_read_as_absent() {
        let store = MemorySessionStore::new();
        let ttl = SessionTtl {
            access_token: Duration::ZERO,
            ..SessionTtl::default()
        };

        store.save_tokens(&tokens("a"), &ttl).await.unwrap();
        let snapshot = store.load().await.unwrap();
        assert!(snapshot.access_token.is_none());
        assert_eq!(snapshot.refresh_token.as_deref(), Some("refresh-a"));
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let ttl = SessionTtl::default();

        let store = FileSessionStore::new(&path);
        store.save_tokens(&tokens("a"), &ttl).await.unwrap();
        store.save_user(&user(), &ttl).await.unwrap();
        store.save_tokens(&tokens("b"), &ttl).await.unwrap();
        drop(store);

        let reopened = FileSessionStore::new(&path);
        let snapshot = reopened.load().await.unwrap();
        assert_eq!(snapshot.access_token.as_deref(), Some("access-b"));
        assert_eq!(snapshot.refresh_token.as_deref(), Some("refresh-b"));
        assert_eq!(snapshot.user.unwrap().email, "f@x.com");
        assert!(!path.with_extension("tmp").exists());

        reopened.clear().await.unwrap();
        assert!(!path.exists());
        assert_eq!(reopened.load().await.unwrap(), SessionSnapshot::default());
        // Clearing twice is fine
        reopened.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_ignores_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = FileSessionStore::new(&path);
        assert_eq!(store.load().await.unwrap(), SessionSnapshot::default());
    }
}
