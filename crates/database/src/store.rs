use crate::connection::{connect, run_migrations};
use crate::error::DbError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// The persistence collaborator: opaque blobs under string keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Inserts or overwrites the blob stored under `key`.
    async fn save(&self, key: &str, blob: &[u8]) -> Result<(), DbError>;

    /// Fails with `DbError::NotFound` when nothing is stored under `key`.
    async fn load(&self, key: &str) -> Result<Vec<u8>, DbError>;

    /// Releases any resources held by the store. Further calls may fail.
    async fn close(&self) {}
}

/// Serializes `value` as JSON and saves it.
pub async fn save_json<T: Serialize + Sync>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), DbError> {
    let blob = serde_json::to_vec(value)?;
    store.save(key, &blob).await
}

pub async fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<T, DbError> {
    let blob = store.load(key).await?;
    Ok(serde_json::from_slice(&blob)?)
}

/// A process-local store, used for tests and when PostgreSQL is unavailable.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn save(&self, key: &str, blob: &[u8]) -> Result<(), DbError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Vec<u8>, DbError> {
        self.entries
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| DbError::NotFound(key.to_string()))
    }
}

/// PostgreSQL-backed store over the `kv_store` table.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and brings the schema up to date.
    pub async fn open(database_url: &str) -> Result<Self, DbError> {
        let pool = connect(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl KeyValueStore for PgStore {
    async fn save(&self, key: &str, blob: &[u8]) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, blob, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET blob = EXCLUDED.blob, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(blob)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Vec<u8>, DbError> {
        let row = sqlx::query("SELECT blob FROM kv_store WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(key.to_string()))?;
        let blob: Vec<u8> = row.try_get("blob")?;
        Ok(blob)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Writes through to a primary store and falls back to memory once the primary fails.
///
/// Every save is mirrored into memory, so values written before the primary went away
/// remain readable. After the first failure the primary is no longer consulted.
pub struct ResilientStore {
    primary: Option<Arc<dyn KeyValueStore>>,
    fallback: MemoryStore,
    degraded: AtomicBool,
}

impl ResilientStore {
    pub fn new(primary: Arc<dyn KeyValueStore>) -> Self {
        Self {
            primary: Some(primary),
            fallback: MemoryStore::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// A store that only ever uses memory.
    pub fn in_memory() -> Self {
        Self {
            primary: None,
            fallback: MemoryStore::new(),
            degraded: AtomicBool::new(false),
        }
    }

    /// Opens PostgreSQL when a URL is configured, degrading to memory if that fails.
    pub async fn open(database_url: Option<&str>) -> Self {
        let Some(url) = database_url else {
            tracing::info!("No database_url configured, using in-memory persistence");
            return Self::in_memory();
        };
        match PgStore::open(url).await {
            Ok(store) => {
                tracing::info!("Connected to PostgreSQL persistence");
                Self::new(Arc::new(store))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Persistence unavailable, degrading to in-memory store");
                let store = Self::in_memory();
                store.degraded.store(true, Ordering::Relaxed);
                store
            }
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn healthy_primary(&self) -> Option<&Arc<dyn KeyValueStore>> {
        self.primary.as_ref().filter(|_| !self.is_degraded())
    }

    fn degrade(&self, error: &DbError) {
        if !self.degraded.swap(true, Ordering::Relaxed) {
            tracing::warn!(error = %error, "Persistence unavailable, degrading to in-memory store");
        }
    }
}

#[async_trait]
impl KeyValueStore for ResilientStore {
    async fn save(&self, key: &str, blob: &[u8]) -> Result<(), DbError> {
        self.fallback.save(key, blob).await?;
        if let Some(primary) = self.healthy_primary() {
            if let Err(e) = primary.save(key, blob).await {
                self.degrade(&e);
            }
        }
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Vec<u8>, DbError> {
        if let Some(primary) = self.healthy_primary() {
            match primary.load(key).await {
                Ok(blob) => return Ok(blob),
                Err(e) if e.is_not_found() => {}
                Err(e) => self.degrade(&e),
            }
        }
        self.fallback.load(key).await
    }

    async fn close(&self) {
        if let Some(primary) = &self.primary {
            primary.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    /// A primary that works until it is switched off.
    struct FlakyStore {
        inner: MemoryStore,
        up: AtomicBool,
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        async fn save(&self, key: &str, blob: &[u8]) -> Result<(), DbError> {
            if !self.up.load(Ordering::Relaxed) {
                return Err(DbError::ConnectionConfigError("down".to_string()));
            }
            self.inner.save(key, blob).await
        }

        async fn load(&self, key: &str) -> Result<Vec<u8>, DbError> {
            if !self.up.load(Ordering::Relaxed) {
                return Err(DbError::ConnectionConfigError("down".to_string()));
            }
            self.inner.load(key).await
        }
    }

    #[tokio::test]
    async fn memory_store_reports_missing_keys() {
        let store = MemoryStore::new();
        assert!(store.load("policy/tabular/latest").await.unwrap_err().is_not_found());
        store.save("policy/tabular/latest", b"v1").await.unwrap();
        store.save("policy/tabular/latest", b"v2").await.unwrap();
        assert_eq!(store.load("policy/tabular/latest").await.unwrap(), b"v2");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn resilient_store_degrades_when_primary_fails() {
        let primary = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            up: AtomicBool::new(true),
        });
        let store = ResilientStore::new(primary.clone());

        store.save("a", b"1").await.unwrap();
        assert_eq!(primary.inner.load("a").await.unwrap(), b"1");

        primary.up.store(false, Ordering::Relaxed);
        store.save("b", b"2").await.unwrap();
        assert!(store.is_degraded());

        // Both keys stay readable from memory.
        assert_eq!(store.load("a").await.unwrap(), b"1");
        assert_eq!(store.load("b").await.unwrap(), b"2");
        assert!(store.load("c").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn unconfigured_store_is_memory_only() {
        let store = ResilientStore::open(None).await;
        assert!(!store.is_degraded());
        store.save("k", b"v").await.unwrap();
        assert_eq!(store.load("k").await.unwrap(), b"v");
    }

    #[tokio::test]
    async fn json_helpers_round_trip_documents() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Report {
            steps: u64,
            reason: String,
        }
        let store = MemoryStore::new();
        let report = Report { steps: 12, reason: "max_steps".to_string() };
        save_json(&store, "episodes/1/report", &report).await.unwrap();
        let loaded: Report = load_json(&store, "episodes/1/report").await.unwrap();
        assert_eq!(loaded, report);
    }
}
