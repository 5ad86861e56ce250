//! User service client (§4.2, §6 HTTP gateway contract).

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

use super::pinger::Liveness;

const SERVICE: &str = "user service";

/// A cached snapshot of a user's account, as returned by the user
/// service. Immutable once fetched; a stale copy simply expires out of
/// the cache (§4.2) rather than being mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i32,
    pub user_name: String,
    pub player_name: String,
    pub level: u32,
    pub avatar: u32,
    pub cur_exp: u32,
    pub max_exp: u32,
    pub rank: u16,
    pub vip_level: u8,
    pub wins: u32,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
}

impl User {
    /// Free function per §9's "HACK to get methods working" note: behavior
    /// lives on the plain data record, no prototype grafting required.
    pub fn is_vip(&self) -> bool {
        self.vip_level > 0
    }
}

#[derive(Serialize)]
struct ValidateCredentialsRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct ValidateCredentialsResponse {
    user_id: i32,
}

#[derive(Clone)]
pub struct UserServiceClient {
    pub(super) http: reqwest::Client,
    base_url: String,
    pub(super) liveness: Liveness,
}

impl UserServiceClient {
    pub fn new(http: reqwest::Client, base_url: String, liveness: Liveness) -> UserServiceClient {
        UserServiceClient {
            http,
            base_url,
            liveness,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.liveness.is_alive()
    }

    pub(super) fn ping_url(&self) -> String {
        format!("{}/ping", self.base_url)
    }

    /// `userId|0` per §4.2 — `Ok(None)` stands for 0 (bad credentials),
    /// `Err` for the service being unreachable. Callers must not confuse
    /// the two (property 11).
    pub async fn validate_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<i32>, GatewayError> {
        if !self.liveness.is_alive() {
            return Err(GatewayError::Unavailable { service: SERVICE });
        }

        let url = format!("{}/users/check", self.base_url);
        let result = self
            .http
            .post(&url)
            .json(&ValidateCredentialsRequest { username, password })
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.liveness.check_now();
                return Err(map_transport_error(e));
            }
        };

        if response.status() == reqwest::StatusCode::NOT_FOUND
            || response.status() == reqwest::StatusCode::UNAUTHORIZED
        {
            return Ok(None);
        }
        if !response.status().is_success() {
            self.liveness.check_now();
            return Err(GatewayError::Status {
                service: SERVICE,
                status: response.status().as_u16(),
            });
        }

        let body: ValidateCredentialsResponse = response.json().await.map_err(|e| {
            self.liveness.check_now();
            GatewayError::Decode {
                service: SERVICE,
                source: json_error(e),
            }
        })?;

        if body.user_id == 0 {
            Ok(None)
        } else {
            Ok(Some(body.user_id))
        }
    }

    pub async fn get_user(&self, user_id: i32) -> Result<Option<User>, GatewayError> {
        if !self.liveness.is_alive() {
            return Err(GatewayError::Unavailable { service: SERVICE });
        }

        let url = format!("{}/users/{}", self.base_url, user_id);
        self.fetch_user(&url).await
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>, GatewayError> {
        if !self.liveness.is_alive() {
            return Err(GatewayError::Unavailable { service: SERVICE });
        }

        let url = format!("{}/users/byname/{}", self.base_url, name);
        self.fetch_user(&url).await
    }

    async fn fetch_user(&self, url: &str) -> Result<Option<User>, GatewayError> {
        let result = self.http.get(url).send().await;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.liveness.check_now();
                return Err(map_transport_error(e));
            }
        };

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            self.liveness.check_now();
            return Err(GatewayError::Status {
                service: SERVICE,
                status: response.status().as_u16(),
            });
        }

        let user: User = response.json().await.map_err(|e| {
            self.liveness.check_now();
            GatewayError::Decode {
                service: SERVICE,
                source: json_error(e),
            }
        })?;
        Ok(Some(user))
    }
}

fn map_transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout { service: SERVICE }
    } else {
        GatewayError::Transport(e)
    }
}

/// `reqwest::Response::json` reports decode failure as a `reqwest::Error`,
/// not `serde_json::Error`; re-box it so `GatewayError::Decode` can carry a
/// single, stable source type regardless of which layer caught the
/// malformed body.
fn json_error(e: reqwest::Error) -> serde_json::Error {
    <serde_json::Error as serde::de::Error>::custom(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vip_level_zero_is_not_vip() {
        let user = User {
            user_id: 1,
            user_name: "bob".into(),
            player_name: "playerBob".into(),
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
        };
        assert!(!user.is_vip());
    }
}
