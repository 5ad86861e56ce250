//! The Service Gateway (C2): everything that talks to the two external
//! HTTP services over the wire. Grounded on the teacher's `db_task` — a
//! cloneable handle wrapping an external data source behind async methods
//! that callers `.await` without caring how the data actually got fetched.
//! Unlike `db_task`, there is no actor here: `reqwest::Client` is cheap to
//! clone and safe to share, so each method just makes the HTTP call
//! directly in the caller's own task (§5).

mod cache;
mod inventory_service;
mod pinger;
mod user_service;

use std::time::Duration;

pub use inventory_service::InventoryServiceClient;
pub use pinger::Liveness;
pub use user_service::{User, UserServiceClient};

use crate::config::Config;
use cache::UserCache;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const USER_CACHE_CAPACITY: usize = 100;
const USER_CACHE_TTL: Duration = Duration::from_secs(15);

/// The composed gateway: one HTTP client per service, each paired with a
/// [`Liveness`] flag kept current by a background pinger, plus the
/// short-TTL user cache sitting in front of the user service.
#[derive(Clone)]
pub struct ServiceGateway {
    pub users: UserServiceClient,
    pub inventory: InventoryServiceClient,
    user_cache: UserCache,
}

impl ServiceGateway {
    pub fn new(config: &Config) -> ServiceGateway {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client with no system deps should always build");

        let user_liveness = Liveness::new();
        let inventory_liveness = Liveness::new();

        ServiceGateway {
            users: UserServiceClient::new(http.clone(), config.user_service_base_url(), user_liveness),
            inventory: InventoryServiceClient::new(
                http,
                config.inventory_service_base_url(),
                inventory_liveness,
            ),
            user_cache: UserCache::new(USER_CACHE_CAPACITY, USER_CACHE_TTL),
        }
    }

    /// Spawn the liveness pingers for both services. Call once at startup.
    pub fn spawn_pingers(&self) {
        pinger::spawn(self.users.http.clone(), self.users.ping_url(), self.users.liveness.clone());
        pinger::spawn(
            self.inventory.http.clone(),
            self.inventory.ping_url(),
            self.inventory.liveness.clone(),
        );
    }

    /// `getUser` through the cache: a hit within the TTL never touches the
    /// network; a miss (or an expired entry) falls through to the user
    /// service and, on success, refills the cache.
    pub async fn get_user(&self, user_id: i32) -> Result<Option<User>, crate::error::GatewayError> {
        if let Some(cached) = self.user_cache.get(user_id).await {
            return Ok(Some(cached));
        }

        let user = self.users.get_user(user_id).await?;
        if let Some(ref user) = user {
            self.user_cache.put(user_id, user.clone()).await;
        }
        Ok(user)
    }

    /// Invalidate a cached user — called after any write that could make
    /// the cached snapshot stale.
    pub async fn invalidate_user(&self, user_id: i32) {
        self.user_cache.invalidate(user_id).await;
    }
}
