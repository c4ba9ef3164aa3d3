#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate serde_derive;

use std::fmt::{Debug, Display};

use deadpool_redis::cmd;
use deadpool_redis::Connection;
use deadpool_redis::Pool as RedisPool;
use redis::{ErrorKind, RedisError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error};

mod stats;

pub use stats::{LoadedStats, Stats};

/// default time to live of a cached object, in seconds
const DEFAULT_TTL: i32 = 3600;

lazy_static! {
    static ref CACHE_POOL: RwLock<Cache> = RwLock::new(Cache::default());
    static ref REDIS_URL: RwLock<Option<String>> = RwLock::new(None);
}

/// Process wide redis cache.
///
/// Every operation swallows its errors: a broken or disabled cache
/// only means the caller has to go to the database.
pub struct Cache {
    pool: Option<RedisPool>,
    ttl: i32,
}

#[derive(Serialize, Debug)]
pub struct CacheStatus {
    /// is true when the redis url is set and is a valid url
    enabled: bool,
    /// is true when the cache is enabled and a connection can be retrieved
    healthy: bool,
    /// seconds before a cached object is evicted
    ttl: i32,
    stats: LoadedStats,
    /// fraction of lookups answered by the cache
    hit_ratio: f64,
}

/// Types that can be stored in the cache know how to build their own key
pub trait CacheIdentifier {
    fn cache_key<T: Display>(id: T) -> String;
}

impl Cache {
    fn default() -> Self {
        Cache {
            pool: None,
            ttl: DEFAULT_TTL,
        }
    }

    async fn set_url(url: String) {
        let mut cfg_url = REDIS_URL.write().await;
        *cfg_url = Some(url);
    }

    /// Connect to redis and make the cache available for the whole process.
    pub async fn init(url: String) -> Result<(), RedisError> {
        Cache::init_with_ttl(url, DEFAULT_TTL).await
    }

    pub async fn init_with_ttl(url: String, ttl: i32) -> Result<(), RedisError> {
        let cfg = deadpool_redis::Config {
            url: Some(url.clone()),
            ..Default::default()
        };

        let pool = cfg.create_pool()?;

        let mut cache = CACHE_POOL.write().await;
        *cache = Cache {
            pool: Some(pool),
            ttl,
        };

        // remember the url so the cache can be re-enabled after disabling it
        Cache::set_url(url).await;
        Ok(())
    }

    /// returns true if the cache is initialized and ready for usage
    pub async fn is_enabled() -> bool {
        let cache = CACHE_POOL.read().await;
        cache.pool.is_some()
    }

    #[tracing::instrument]
    async fn connection() -> Option<Connection> {
        let cache = CACHE_POOL.read().await;

        match cache.pool.as_ref()?.get().await {
            Ok(connection) => Some(connection),
            Err(err) => {
                error!("unable to get cache connection: {}", err);
                None
            }
        }
    }

    #[tracing::instrument(name = "cache::get")]
    pub async fn get<T: DeserializeOwned + CacheIdentifier, I: Display + Debug>(
        id: I,
    ) -> Option<T> {
        let mut conn = Cache::connection().await?;
        let cache_key: String = T::cache_key(id);

        let res: Result<Vec<u8>, RedisError> =
            cmd("GET").arg(&cache_key).query_async(&mut conn).await;

        match res {
            Ok(res) => {
                let cache_hit = serde_json::from_slice::<T>(&res).ok();

                if cache_hit.is_some() {
                    Stats::cache_hit();
                    debug!("found {} in cache", &cache_key);
                } else {
                    Stats::cache_miss();
                }

                cache_hit
            }
            Err(err) => {
                error!("unable to fetch {} from cache: {}", &cache_key, err);
                None
            }
        }
    }

    #[tracing::instrument(name = "cache::set", skip(object))]
    pub async fn set<T: Serialize + CacheIdentifier, I: Display + Debug>(object: &T, id: I) {
        let mut conn = match Cache::connection().await {
            Some(conn) => conn,
            None => return,
        };

        let cache_key: String = T::cache_key(id);

        let object_string = match serde_json::to_vec(object) {
            Ok(res) => res,
            Err(err) => {
                error!("unable to serialize {} for the cache: {}", cache_key, err);
                return;
            }
        };

        let ttl = CACHE_POOL.read().await.ttl;

        let res = cmd("SETEX")
            .arg(&cache_key)
            .arg(ttl)
            .arg(object_string)
            .execute_async(&mut conn)
            .await;

        if let Err(err) = res {
            error!("unable to store {} in cache: {}", cache_key, err);
        }
    }

    /// Evict the object of type `T` with the given id
    #[tracing::instrument(name = "cache::evict")]
    pub async fn evict<T: CacheIdentifier, I: Display + Debug>(id: I) {
        Cache::delete(T::cache_key(id)).await
    }

    #[tracing::instrument(name = "cache::delete")]
    pub async fn delete(cache_key: String) {
        let mut conn = match Cache::connection().await {
            Some(conn) => conn,
            None => return,
        };

        let res = cmd("DEL").arg(&cache_key).execute_async(&mut conn).await;

        if let Err(err) = res {
            error!("unable to delete {} from cache: {}", cache_key, err);
        }
    }

    pub async fn disable_cache() {
        let mut cache = CACHE_POOL.write().await;

        cache.pool = None;
    }

    /// Reconnect using the url of the last successful `init`
    pub async fn enable_cache() -> Result<(), RedisError> {
        let url = REDIS_URL.read().await.clone();
        let ttl = CACHE_POOL.read().await.ttl;

        match url {
            Some(url) => Cache::init_with_ttl(url, ttl).await,
            None => Err(RedisError::from((
                ErrorKind::InvalidClientConfig,
                "the cache was never initialized",
            ))),
        }
    }

    pub async fn status() -> CacheStatus {
        let enabled = Cache::is_enabled().await;
        let mut healthy = true;
        if enabled {
            healthy = Cache::connection().await.is_some();
        }
        let stats = Stats::load();
        CacheStatus {
            enabled,
            healthy,
            ttl: CACHE_POOL.read().await.ttl,
            stats,
            hit_ratio: stats.hit_ratio(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Court;

    impl CacheIdentifier for Court {
        fn cache_key<T: Display>(id: T) -> String {
            format!("court.{}", id)
        }
    }

    #[test]
    fn cache_keys_are_namespaced() {
        assert_eq!(Court::cache_key(42), "court.42");
        assert_eq!(Court::cache_key("abc"), "court.abc");
    }

    #[test]
    fn uninitialized_cache_is_disabled() {
        let cache = Cache::default();
        assert!(cache.pool.is_none());
        assert_eq!(cache.ttl, DEFAULT_TTL);
    }
}
