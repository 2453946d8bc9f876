use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::config::AppConfig;
use crate::state::LampCommand;

/// Command client for the Orion Context Broker.
#[derive(Clone)]
pub struct OrionClient {
    client: Client,
    base_url: String,
    entity_id: String,
    service: String,
    service_path: String,
}

impl OrionClient {
    pub fn new(client: Client, config: &AppConfig) -> Self {
        Self {
            client,
            base_url: config.fiware.orion_url.trim_end_matches('/').to_string(),
            entity_id: config.fiware.entity_id(),
            service: config.fiware.service.clone(),
            service_path: config.fiware.service_path.clone(),
        }
    }

    /// Assert the lamp state on the entity.
    ///
    /// Level-triggered: the caller re-issues the same command every tick, so
    /// a command missed by a flaky actuator is healed by the next one.
    pub async fn send_lamp_command(&self, target: LampCommand) -> Result<()> {
        let url = format!("{}/v2/entities/{}/attrs", self.base_url, self.entity_id);
        let attribute = target.attribute();
        let body = json!({
            attribute: {
                "type": "command",
                "value": ""
            }
        });

        self.client
            .patch(&url)
            .header("fiware-service", &self.service)
            .header("fiware-servicepath", &self.service_path)
            .json(&body)
            .send()
            .await
            .context("Orion request failed")?
            .error_for_status()
            .context("Orion rejected the lamp command")?;

        debug!(state = %target, "lamp command asserted");
        Ok(())
    }
}
