use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Deserializer, de};
use tracing::warn;

use crate::config::AppConfig;
use crate::state::ChannelKind;

/// One raw observation as stored by STH-Comet.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSample {
    #[serde(rename = "attrValue", deserialize_with = "attr_value")]
    pub value: f64,
    #[serde(rename = "recvTime")]
    pub recv_time: String,
}

#[derive(Debug, Deserialize)]
struct SthPayload {
    #[serde(rename = "contextResponses")]
    context_responses: Vec<ContextResponse>,
}

#[derive(Debug, Deserialize)]
struct ContextResponse {
    #[serde(rename = "contextElement")]
    context_element: ContextElement,
}

#[derive(Debug, Deserialize)]
struct ContextElement {
    attributes: Vec<AttributeValues>,
}

#[derive(Debug, Deserialize)]
struct AttributeValues {
    values: Vec<RawSample>,
}

/// STH stores `attrValue` as a string; raw notifications can carry numbers.
fn attr_value<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(raw) => raw.trim().parse::<f64>().map_err(de::Error::custom),
        serde_json::Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| de::Error::custom("attrValue out of f64 range")),
        other => Err(de::Error::custom(format!(
            "attrValue is neither string nor number: {other}"
        ))),
    }
}

/// Query client for the STH-Comet context history API.
#[derive(Clone)]
pub struct SthClient {
    client: Client,
    base_url: String,
    entity_id: String,
    service: String,
    service_path: String,
}

impl SthClient {
    pub fn new(client: Client, config: &AppConfig) -> Self {
        Self {
            client,
            base_url: config.fiware.sth_url.trim_end_matches('/').to_string(),
            entity_id: config.fiware.entity_id(),
            service: config.fiware.service.clone(),
            service_path: config.fiware.service_path.clone(),
        }
    }

    /// The most recent `last_n` samples for one channel.
    ///
    /// Any transport error, non-2xx status, or unexpected payload shape
    /// collapses to an empty batch; the tick treats that as "no update" and
    /// leaves the channel's state untouched.
    pub async fn fetch_samples(&self, channel: ChannelKind, last_n: u32) -> Vec<RawSample> {
        match self.try_fetch(channel, last_n).await {
            Ok(samples) => samples,
            Err(err) => {
                warn!(channel = %channel, error = ?err, "sample fetch failed; skipping interval");
                Vec::new()
            }
        }
    }

    async fn try_fetch(&self, channel: ChannelKind, last_n: u32) -> Result<Vec<RawSample>> {
        let url = format!(
            "{}/STH/v1/contextEntities/type/Lamp/id/{}/attributes/{}",
            self.base_url,
            self.entity_id,
            channel.attribute()
        );

        let response = self
            .client
            .get(&url)
            .query(&[("lastN", last_n)])
            .header("fiware-service", &self.service)
            .header("fiware-servicepath", &self.service_path)
            .send()
            .await
            .context("STH request failed")?
            .error_for_status()
            .context("STH returned an error status")?;

        let payload: SthPayload = response.json().await.context("malformed STH payload")?;
        extract_values(payload)
    }
}

fn extract_values(payload: SthPayload) -> Result<Vec<RawSample>> {
    let response = payload
        .context_responses
        .into_iter()
        .next()
        .context("STH payload carried no contextResponses")?;
    let attribute = response
        .context_element
        .attributes
        .into_iter()
        .next()
        .context("STH payload carried no attributes")?;
    Ok(attribute.values)
}
