//! Minimal Discord-shaped driver stub.
//!
//! A full Discord gateway client (websocket receive loop, bot-send mode,
//! emoji resolution) is out of scope here — this exists to exercise the
//! registry/supervisor contract with a second, differently-shaped driver
//! alongside `webhook`, and to show the `max_file_size` attachment-cap
//! pattern feeding into the shared media fetcher. Send-only, webhook mode
//! only. Grounded on the config surface and defaults of
//! `examples/original_source/drivers/discord.py`; the receive loop is a
//! stub that idles until cancelled rather than connecting to Discord's
//! gateway.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::schema::{deserialize_optional_http_url, validator_for};
use crate::driver::{Driver, DriverConstructor};
use crate::media;
use crate::registry::DriverRegistry;
use crate::router::Router;
use crate::secret::SecretString;

const DEFAULT_MAX_FILE_SIZE: usize = 8 * 1024 * 1024;

fn default_send_method() -> String {
    "webhook".to_string()
}

fn default_max_file_size() -> usize {
    DEFAULT_MAX_FILE_SIZE
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DiscordConfig {
    #[serde(default)]
    pub bot_token: Option<SecretString>,
    #[serde(default = "default_send_method")]
    pub send_method: String,
    #[serde(default, deserialize_with = "deserialize_optional_http_url")]
    pub webhook_url: Option<String>,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
}

pub struct DiscordDriver {
    instance_id: String,
    config: DiscordConfig,
    client: reqwest::Client,
}

impl DiscordDriver {
    pub fn new(instance_id: String, config: DiscordConfig) -> Self {
        Self {
            instance_id,
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Driver for DiscordDriver {
    fn platform(&self) -> &str {
        "discord"
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    async fn start(&mut self, router: Arc<Router>, cancel: CancellationToken) -> anyhow::Result<()> {
        if self.config.send_method == "webhook" {
            let Some(webhook_url) = self.config.webhook_url.clone() else {
                anyhow::bail!("discord instance '{}' uses send_method=webhook but no webhook_url configured", self.instance_id);
            };
            let max_file_size = self.config.max_file_size;
            let client = self.client.clone();
            let instance_id = self.instance_id.clone();

            let send_fn: crate::driver::SendFn = Arc::new(move |_channel, text, attachments, _extra| {
                let webhook_url = webhook_url.clone();
                let client = client.clone();
                let instance_id = instance_id.clone();
                Box::pin(async move {
                    // Attachments are downloaded (capped at max_file_size) and
                    // re-uploaded as files on real Discord webhooks; here we
                    // only exercise the size-cap pipeline and log the result,
                    // since multipart file upload is outside this stub's scope.
                    for att in &attachments {
                        if let Some(fetched) = media::fetch_attachment(&client, att, max_file_size).await {
                            tracing::debug!(instance = %instance_id, bytes = fetched.bytes.len(), mime = %fetched.mime, "discord stub fetched attachment");
                        }
                    }

                    let payload = serde_json::json!({ "content": text });
                    match client.post(&webhook_url).json(&payload).send().await {
                        Ok(resp) if resp.status().is_success() => Ok(None),
                        Ok(resp) => {
                            tracing::error!(instance = %instance_id, status = %resp.status(), "discord webhook send failed");
                            Ok(None)
                        }
                        Err(e) => {
                            tracing::error!(instance = %instance_id, error = %e, "discord webhook send failed");
                            Ok(None)
                        }
                    }
                })
            });

            router.register_sender(&self.instance_id, send_fn).await;
        } else {
            tracing::warn!(instance = %self.instance_id, "discord bot-send mode is not implemented by this stub");
        }

        tracing::info!(instance = %self.instance_id, "discord driver ready (stub, no gateway connection)");
        cancel.cancelled().await;
        router.unregister_sender(&self.instance_id).await;
        Ok(())
    }
}

pub fn register(registry: &DriverRegistry) -> anyhow::Result<()> {
    let ctor: DriverConstructor = Arc::new(|instance_id, config| {
        let config: DiscordConfig = serde_json::from_value(config)?;
        Ok(Box::new(DiscordDriver::new(instance_id, config)) as Box<dyn Driver>)
    });
    registry.register("discord", validator_for::<DiscordConfig>(), ctor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_to_webhook_send_method_and_8mb_cap() {
        let v = serde_json::json!({});
        let cfg: DiscordConfig = serde_json::from_value(v).unwrap();
        assert_eq!(cfg.send_method, "webhook");
        assert_eq!(cfg.max_file_size, DEFAULT_MAX_FILE_SIZE);
    }

    #[test]
    fn config_rejects_unknown_fields() {
        let v = serde_json::json!({ "not_a_real_field": 1 });
        assert!(serde_json::from_value::<DiscordConfig>(v).is_err());
    }
}
