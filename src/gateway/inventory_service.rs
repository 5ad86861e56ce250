//! Inventory service client (§4.2, §6). Every read returns an opaque
//! payload — the four inventory projections (items, cosmetics, loadouts,
//! buy menu) are forwarded to the client byte-for-byte, same as the
//! wire-level `InventoryReply`/`HostInventoryRelayReply` bodies expect.

use serde::Serialize;

use crate::error::GatewayError;

use super::pinger::Liveness;

const SERVICE: &str = "inventory service";

#[derive(Clone)]
pub struct InventoryServiceClient {
    pub(super) http: reqwest::Client,
    base_url: String,
    pub(super) liveness: Liveness,
}

impl InventoryServiceClient {
    pub fn new(http: reqwest::Client, base_url: String, liveness: Liveness) -> InventoryServiceClient {
        InventoryServiceClient {
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

    pub async fn read_items(&self, user_id: i32) -> Result<Vec<u8>, GatewayError> {
        self.read(&format!("{}/inventory/{}/items", self.base_url, user_id))
            .await
    }

    pub async fn read_cosmetics(&self, user_id: i32) -> Result<Vec<u8>, GatewayError> {
        self.read(&format!("{}/inventory/{}/cosmetics", self.base_url, user_id))
            .await
    }

    pub async fn read_loadouts(&self, user_id: i32) -> Result<Vec<u8>, GatewayError> {
        self.read(&format!("{}/inventory/{}/loadouts", self.base_url, user_id))
            .await
    }

    pub async fn read_buy_menu(&self, user_id: i32) -> Result<Vec<u8>, GatewayError> {
        self.read(&format!("{}/inventory/{}/buymenu", self.base_url, user_id))
            .await
    }

    pub async fn write_loadout_weapon(
        &self,
        user_id: i32,
        loadout_index: u8,
        slot: u8,
        weapon_id: u32,
    ) -> Result<(), GatewayError> {
        #[derive(Serialize)]
        struct Body {
            loadout_index: u8,
            slot: u8,
            weapon_id: u32,
        }
        self.write(
            &format!("{}/inventory/{}/loadouts", self.base_url, user_id),
            &Body {
                loadout_index,
                slot,
                weapon_id,
            },
        )
        .await
    }

    pub async fn write_cosmetic_slot(
        &self,
        user_id: i32,
        slot: u8,
        item_id: u32,
    ) -> Result<(), GatewayError> {
        #[derive(Serialize)]
        struct Body {
            slot: u8,
            item_id: u32,
        }
        self.write(
            &format!("{}/inventory/{}/cosmetics", self.base_url, user_id),
            &Body { slot, item_id },
        )
        .await
    }

    pub async fn write_buy_menu_slot(
        &self,
        user_id: i32,
        slot: u8,
        weapon_id: u32,
    ) -> Result<(), GatewayError> {
        #[derive(Serialize)]
        struct Body {
            slot: u8,
            weapon_id: u32,
        }
        self.write(
            &format!("{}/inventory/{}/buymenu", self.base_url, user_id),
            &Body { slot, weapon_id },
        )
        .await
    }

    async fn read(&self, url: &str) -> Result<Vec<u8>, GatewayError> {
        if !self.liveness.is_alive() {
            return Err(GatewayError::Unavailable { service: SERVICE });
        }

        let result = self.http.get(url).send().await;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.liveness.check_now();
                return Err(map_transport_error(e));
            }
        };

        if !response.status().is_success() {
            self.liveness.check_now();
            return Err(GatewayError::Status {
                service: SERVICE,
                status: response.status().as_u16(),
            });
        }

        response.bytes().await.map(|b| b.to_vec()).map_err(|e| {
            self.liveness.check_now();
            map_transport_error(e)
        })
    }

    async fn write<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<(), GatewayError> {
        if !self.liveness.is_alive() {
            return Err(GatewayError::Unavailable { service: SERVICE });
        }

        let result = self.http.put(url).json(body).send().await;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.liveness.check_now();
                return Err(map_transport_error(e));
            }
        };

        if !response.status().is_success() {
            self.liveness.check_now();
            return Err(GatewayError::Status {
                service: SERVICE,
                status: response.status().as_u16(),
            });
        }

        Ok(())
    }
}

fn map_transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout { service: SERVICE }
    } else {
        GatewayError::Transport(e)
    }
}
