use std::collections::HashMap;
use std::future::Future;
#[cfg(test)]
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicI64>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub data: V,
    pub fetched_at_ms: i64,
}

pub struct ReadThroughCache<V> {
    name: &'static str,
    ttl_ms: i64,
    max_entries: Option<usize>,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<V: Clone> ReadThroughCache<V> {
    pub fn new(name: &'static str, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            name,
            ttl_ms: ttl.as_millis() as i64,
            max_entries: None,
            clock,
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries.max(1));
        self
    }

    pub async fn peek(&self, key: &str) -> Option<CacheEntry<V>> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn fresh(&self, key: &str) -> Option<V> {
        let now = self.clock.now_ms();
        self.entries
            .read()
            .await
            .get(key)
            .filter(|entry| now - entry.fetched_at_ms < self.ttl_ms)
            .map(|entry| entry.data.clone())
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.in_flight
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    async fn store(&self, key: &str, data: V) {
        let now = self.clock.now_ms();
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                data,
                fetched_at_ms: now,
            },
        );
        if let Some(max_entries) = self.max_entries {
            if entries.len() > max_entries {
                let ttl_ms = self.ttl_ms;
                entries.retain(|_, entry| now - entry.fetched_at_ms < ttl_ms);
                debug!(cache = self.name, remaining = entries.len(), "swept expired entries");
            }
        }
    }

    // Drops the key's lock once nobody else is waiting on it so the map
    // stays as small as the set of keys currently being fetched.
    async fn release_key_lock(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().await;
        if Arc::strong_count(&lock) == 2 {
            in_flight.remove(key);
        }
    }

    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(data) = self.fresh(key).await {
            debug!(cache = self.name, key, "cache hit");
            return data;
        }

        let lock = self.key_lock(key).await;
        let data = {
            let _guard = lock.lock().await;
            match self.fresh(key).await {
                Some(data) => {
                    debug!(cache = self.name, key, "cache filled by concurrent fetch");
                    data
                }
                None => {
                    debug!(cache = self.name, key, "cache miss");
                    let data = fetch().await;
                    self.store(key, data.clone()).await;
                    data
                }
            }
        };
        self.release_key_lock(key, lock).await;
        data
    }

    pub async fn try_get_or_fetch<F, Fut, E>(&self, key: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(data) = self.fresh(key).await {
            debug!(cache = self.name, key, "cache hit");
            return Ok(data);
        }

        let lock = self.key_lock(key).await;
        let result = {
            let _guard = lock.lock().await;
            match self.fresh(key).await {
                Some(data) => Ok(data),
                None => {
                    debug!(cache = self.name, key, "cache miss");
                    match fetch().await {
                        Ok(data) => {
                            self.store(key, data.clone()).await;
                            Ok(data)
                        }
                        Err(error) => Err(error),
                    }
                }
            }
        };
        self.release_key_lock(key, lock).await;
        result
    }

    pub async fn refresh<F, Fut>(&self, key: &str, fetch: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let lock = self.key_lock(key).await;
        let data = {
            let _guard = lock.lock().await;
            let data = fetch().await;
            self.store(key, data.clone()).await;
            data
        };
        self.release_key_lock(key, lock).await;
        data
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    const TTL: Duration = Duration::from_secs(240);

    fn cache(clock: &ManualClock) -> ReadThroughCache<String> {
        ReadThroughCache::new("test", TTL, Arc::new(clock.clone()))
    }

    async fn counted_fetch(counter: &AtomicUsize) -> String {
        let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("payload-{call}")
    }

    #[tokio::test]
    async fn second_read_within_ttl_is_served_from_cache() {
        let clock = ManualClock::new(1_000);
        let cache = cache(&clock);
        let calls = AtomicUsize::new(0);

        let first = cache.get_or_fetch("solar-wind", || counted_fetch(&calls)).await;
        clock.advance(Duration::from_secs(239));
        let second = cache.get_or_fetch("solar-wind", || counted_fetch(&calls)).await;

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_triggers_exactly_one_refetch() {
        let clock = ManualClock::new(1_000);
        let cache = cache(&clock);
        let calls = AtomicUsize::new(0);

        cache.get_or_fetch("kp", || counted_fetch(&calls)).await;
        clock.advance(TTL);
        let refreshed = cache.get_or_fetch("kp", || counted_fetch(&calls)).await;
        let again = cache.get_or_fetch("kp", || counted_fetch(&calls)).await;

        assert_eq!(refreshed, "payload-2");
        assert_eq!(again, "payload-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let entry = cache.peek("kp").await.unwrap();
        assert_eq!(entry.fetched_at_ms, 1_000 + TTL.as_millis() as i64);
    }

    #[tokio::test]
    async fn keys_are_cached_independently() {
        let clock = ManualClock::new(0);
        let cache = cache(&clock);
        let calls = AtomicUsize::new(0);

        let nur = cache.get_or_fetch("mag:NUR", || counted_fetch(&calls)).await;
        let sod = cache.get_or_fetch("mag:SOD", || counted_fetch(&calls)).await;

        assert_ne!(nur, sod);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_fetch() {
        let clock = ManualClock::new(0);
        let cache = Arc::new(cache(&clock));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_fetch("solar-wind", || async {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            counted_fetch(&calls).await
                        })
                        .await
                })
            })
            .collect::<Vec<_>>();

        for task in tasks {
            assert_eq!(task.await.unwrap(), "payload-1");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fallible_fetch_is_not_stored() {
        let clock = ManualClock::new(0);
        let cache = cache(&clock);

        let failed: Result<String, &str> = cache
            .try_get_or_fetch("tile", || async { Err("upstream down") })
            .await;
        assert!(failed.is_err());
        assert!(cache.peek("tile").await.is_none());

        let ok: Result<String, &str> = cache
            .try_get_or_fetch("tile", || async { Ok("png".to_string()) })
            .await;
        assert_eq!(ok.unwrap(), "png");
        assert!(cache.peek("tile").await.is_some());
    }

    #[tokio::test]
    async fn refresh_overwrites_fresh_entries() {
        let clock = ManualClock::new(0);
        let cache = cache(&clock);
        let calls = AtomicUsize::new(0);

        cache.get_or_fetch("kp", || counted_fetch(&calls)).await;
        clock.advance(Duration::from_secs(10));
        let refreshed = cache.refresh("kp", || counted_fetch(&calls)).await;

        assert_eq!(refreshed, "payload-2");
        assert_eq!(cache.peek("kp").await.unwrap().fetched_at_ms, 10_000);
    }

    #[tokio::test]
    async fn bounded_cache_sweeps_expired_entries_on_overflow() {
        let clock = ManualClock::new(0);
        let cache = cache(&clock).with_max_entries(2);

        cache.get_or_fetch("a", || async { "a".to_string() }).await;
        cache.get_or_fetch("b", || async { "b".to_string() }).await;
        clock.advance(TTL);
        cache.get_or_fetch("c", || async { "c".to_string() }).await;

        assert_eq!(cache.len().await, 1);
        assert!(cache.peek("c").await.is_some());
    }

    #[tokio::test]
    async fn fetch_locks_are_dropped_once_released() {
        let clock = ManualClock::new(0);
        let cache = cache(&clock).with_max_entries(2);

        for index in 0..200 {
            let key = format!("tile-{index}");
            cache.get_or_fetch(&key, || async { "png".to_string() }).await;
            let _: Result<String, &str> = cache
                .try_get_or_fetch(&format!("{key}-err"), || async { Err("down") })
                .await;
            clock.advance(TTL);
        }
        cache.refresh("kp", || async { "kp".to_string() }).await;

        assert!(cache.len().await <= 2);
        assert_eq!(cache.in_flight.lock().await.len(), 0);
    }
}
