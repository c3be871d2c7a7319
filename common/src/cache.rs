use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// The cached result of one successfully answered query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedAnswer {
    pub answer: String,
    pub sources: Vec<String>,
}

/// Faults at the cache boundary. Callers treat every variant as a miss;
/// these never fail a request.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Response cache keyed by the literal query string. Keys are not
/// normalized: whitespace or case differences are distinct entries.
pub struct QueryCache {
    inner: RwLock<CacheInner>,
    ttl_secs: u64,
}

enum CacheInner {
    Redis { connection: MultiplexedConnection },
    Memory { entries: HashMap<String, (CachedAnswer, Instant)> },
    Degraded,
}

impl QueryCache {
    /// Connects to Redis. If the backend is unreachable the cache degrades
    /// to an always-miss, no-op store for the process lifetime; there is no
    /// reconnection loop.
    pub async fn connect(url: &str, ttl_secs: u64) -> Self {
        match Self::open_connection(url).await {
            Ok(connection) => {
                info!(ttl_secs, "response cache connected");
                Self {
                    inner: RwLock::new(CacheInner::Redis { connection }),
                    ttl_secs,
                }
            }
            Err(e) => {
                warn!(error = %e, "response cache unreachable, continuing without caching");
                Self {
                    inner: RwLock::new(CacheInner::Degraded),
                    ttl_secs,
                }
            }
        }
    }

    async fn open_connection(url: &str) -> Result<MultiplexedConnection, redis::RedisError> {
        let client = Client::open(url)?;
        client.get_multiplexed_async_connection().await
    }

    /// In-process cache for local development and tests.
    pub fn in_memory(ttl_secs: u64) -> Self {
        Self {
            inner: RwLock::new(CacheInner::Memory {
                entries: HashMap::new(),
            }),
            ttl_secs,
        }
    }

    pub async fn backend_label(&self) -> &'static str {
        match &*self.inner.read().await {
            CacheInner::Redis { .. } => "redis",
            CacheInner::Memory { .. } => "memory",
            CacheInner::Degraded => "degraded",
        }
    }

    /// Looks up a stored entry. Expired and absent entries are
    /// indistinguishable; degraded mode always misses.
    ///
    /// The lock only guards the backend snapshot; the Redis round trip runs
    /// on a cloned connection after the guard is released, so a stalled
    /// backend call never blocks other cache users.
    pub async fn get(&self, query: &str) -> Result<Option<CachedAnswer>, CacheError> {
        let mut connection = match &*self.inner.read().await {
            CacheInner::Redis { connection } => connection.clone(),
            CacheInner::Memory { entries } => {
                let ttl = Duration::from_secs(self.ttl_secs);
                return Ok(entries.get(query).and_then(|(answer, stored_at)| {
                    (stored_at.elapsed() < ttl).then(|| answer.clone())
                }));
            }
            CacheInner::Degraded => return Ok(None),
        };

        let raw: Option<String> = connection.get(query).await?;
        match raw {
            Some(json) => {
                debug!("cache hit");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => {
                debug!("cache miss");
                Ok(None)
            }
        }
    }

    /// Stores an entry with the fixed TTL. Best-effort: callers log and
    /// continue on failure; degraded mode is a silent no-op. As with `get`,
    /// the Redis write happens outside the lock.
    pub async fn set(&self, query: &str, answer: &CachedAnswer) -> Result<(), CacheError> {
        let mut connection = match &mut *self.inner.write().await {
            CacheInner::Redis { connection } => connection.clone(),
            CacheInner::Memory { entries } => {
                entries.insert(query.to_owned(), (answer.clone(), Instant::now()));
                return Ok(());
            }
            CacheInner::Degraded => return Ok(()),
        };

        let json = serde_json::to_string(answer)?;
        connection.set_ex::<_, _, ()>(query, json, self.ttl_secs).await?;
        debug!(ttl_secs = self.ttl_secs, "cached response");
        Ok(())
    }

    /// Drops the backend handle; subsequent calls behave as the degraded
    /// always-miss store.
    pub async fn cleanup(&self) {
        *self.inner.write().await = CacheInner::Degraded;
        info!("response cache connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_answer() -> CachedAnswer {
        CachedAnswer {
            answer: "Paris is the capital. [Source: geo_doc]".to_string(),
            sources: vec!["geo_doc".to_string()],
        }
    }

    #[tokio::test]
    async fn test_memory_set_then_get_roundtrips() {
        let cache = QueryCache::in_memory(3600);
        let answer = sample_answer();

        cache
            .set("What is the capital of France?", &answer)
            .await
            .expect("set should succeed");

        let hit = cache
            .get("What is the capital of France?")
            .await
            .expect("get should succeed");
        assert_eq!(hit, Some(answer));
    }

    #[tokio::test]
    async fn test_keys_are_literal_strings() {
        let cache = QueryCache::in_memory(3600);
        cache
            .set("capital of france", &sample_answer())
            .await
            .expect("set should succeed");

        // Case and whitespace differences are distinct keys.
        assert_eq!(cache.get("Capital of France").await.unwrap(), None);
        assert_eq!(cache.get(" capital of france").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_ttl_entries_are_expired() {
        let cache = QueryCache::in_memory(0);
        cache
            .set("q", &sample_answer())
            .await
            .expect("set should succeed");

        assert_eq!(cache.get("q").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreachable_backend_degrades_silently() {
        // Nothing listens on port 1; connect must not error out.
        let cache = QueryCache::connect("redis://127.0.0.1:1", 3600).await;
        assert_eq!(cache.backend_label().await, "degraded");

        assert_eq!(cache.get("q").await.unwrap(), None);
        cache
            .set("q", &sample_answer())
            .await
            .expect("degraded set must be a no-op, not an error");
        assert_eq!(cache.get("q").await.unwrap(), None);
    }

    /// Minimal RESP peer: acknowledges connection-setup commands with `+OK`,
    /// then leaves GET/SETEX unanswered so in-flight calls hang the way a
    /// stalled backend would.
    async fn stalled_redis_server() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind stub listener");
        let address = listener.local_addr().expect("listener address");
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut buf = vec![0u8; 4096];
            loop {
                let read = match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => &buf[..n],
                };
                let is_data_command = read.windows(5).any(|w| w == b"SETEX")
                    || read.windows(5).any(|w| w == b"\r\nGET");
                if is_data_command {
                    continue;
                }
                // One reply per RESP array in the chunk.
                let commands = read.iter().filter(|&&b| b == b'*').count().max(1);
                for _ in 0..commands {
                    if socket.write_all(b"+OK\r\n").await.is_err() {
                        return;
                    }
                }
            }
        });
        format!("redis://{address}")
    }

    #[tokio::test]
    async fn test_stalled_backend_call_does_not_hold_the_lock() {
        use std::sync::Arc;

        let url = stalled_redis_server().await;
        let cache = Arc::new(QueryCache::connect(&url, 3600).await);
        assert_eq!(cache.backend_label().await, "redis");

        // Neither call resolves: the peer stops acknowledging data commands.
        let pending_set = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.set("q", &sample_answer()).await })
        };
        let pending_get = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get("other").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // cleanup needs the write lock, so it only completes if the stalled
        // calls released their guards before awaiting the backend.
        tokio::time::timeout(Duration::from_secs(1), cache.cleanup())
            .await
            .expect("cleanup must not wait on a stalled backend call");

        assert_eq!(cache.backend_label().await, "degraded");
        assert_eq!(cache.get("q").await.unwrap(), None);

        pending_set.abort();
        pending_get.abort();
    }

    #[tokio::test]
    async fn test_cleanup_switches_to_degraded() {
        let cache = QueryCache::in_memory(3600);
        cache.set("q", &sample_answer()).await.unwrap();
        cache.cleanup().await;

        assert_eq!(cache.backend_label().await, "degraded");
        assert_eq!(cache.get("q").await.unwrap(), None);
    }
}
