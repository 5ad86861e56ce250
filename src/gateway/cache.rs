//! Bounded, short-TTL cache in front of `getUser` (§4.2, property 9).
//! Capacity eviction is handled by `lru`; staleness is checked on read by
//! comparing against a per-entry fetch timestamp.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::Mutex;

use super::User;

struct Entry {
    user: User,
    fetched_at: Instant,
}

#[derive(Clone)]
pub struct UserCache {
    inner: std::sync::Arc<Mutex<LruCache<i32, Entry>>>,
    ttl: Duration,
}

impl UserCache {
    pub fn new(capacity: usize, ttl: Duration) -> UserCache {
        let capacity = NonZeroUsize::new(capacity).expect("cache capacity must be nonzero");
        UserCache {
            inner: std::sync::Arc::new(Mutex::new(LruCache::new(capacity))),
            ttl,
        }
    }

    pub async fn get(&self, user_id: i32) -> Option<User> {
        let mut cache = self.inner.lock().await;
        match cache.get(&user_id) {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => Some(entry.user.clone()),
            Some(_) => {
                cache.pop(&user_id);
                None
            }
            None => None,
        }
    }

    pub async fn put(&self, user_id: i32, user: User) {
        let mut cache = self.inner.lock().await;
        cache.put(
            user_id,
            Entry {
                user,
                fetched_at: Instant::now(),
            },
        );
    }

    pub async fn invalidate(&self, user_id: i32) {
        let mut cache = self.inner.lock().await;
        cache.pop(&user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(user_id: i32) -> User {
        User {
            user_id,
            user_name: "alice".into(),
            player_name: "playerAlice".into(),
            level: 1,
            avatar: 0,
            cur_exp: 0,
            max_exp: 100,
            rank: 0,
            vip_level: 0,
            wins: 0,
            kills: 0,
            deaths: 0,
            assists: 0,
        }
    }

    #[tokio::test]
    async fn hit_within_ttl_returns_cached_value() {
        let cache = UserCache::new(10, Duration::from_secs(15));
        cache.put(42, sample_user(42)).await;
        let hit = cache.get(42).await;
        assert_eq!(hit.map(|u| u.user_id), Some(42));
    }

    #[tokio::test]
    async fn entry_past_ttl_is_treated_as_a_miss() {
        let cache = UserCache::new(10, Duration::from_millis(10));
        cache.put(42, sample_user(42)).await;
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(cache.get(42).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_forces_a_miss_immediately() {
        let cache = UserCache::new(10, Duration::from_secs(15));
        cache.put(42, sample_user(42)).await;
        cache.invalidate(42).await;
        assert!(cache.get(42).await.is_none());
    }
}
