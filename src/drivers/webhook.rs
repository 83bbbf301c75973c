//! Generic outgoing webhook driver (send-only).
//!
//! POSTs (or PUTs/PATCHes) a JSON payload to a configured URL for every
//! message routed to this instance. There is no receive side — `start`
//! registers the sender, then blocks until cancelled.
//!
//! Grounded on `examples/original_source/drivers/webhook.py`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::schema::{deserialize_http_url, validator_for};
use crate::driver::{Driver, DriverConstructor};
use crate::message::{Attachment, ChannelValue};
use crate::registry::DriverRegistry;
use crate::retry::{classify_reqwest_result, retry_with_backoff, RetryAttempt, RetryPolicy};
use crate::router::Router;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    #[serde(deserialize_with = "deserialize_http_url")]
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_method() -> String {
    "POST".to_string()
}

pub struct WebhookDriver {
    instance_id: String,
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookDriver {
    pub fn new(instance_id: String, config: WebhookConfig) -> Self {
        Self {
            instance_id,
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct AttachmentPayload {
    #[serde(rename = "type")]
    kind: String,
    url: String,
    name: String,
    size: i64,
}

impl From<&Attachment> for AttachmentPayload {
    fn from(att: &Attachment) -> Self {
        Self {
            kind: att.kind.to_string(),
            url: att.url.clone(),
            name: att.name.clone(),
            size: att.size,
        }
    }
}

#[async_trait]
impl Driver for WebhookDriver {
    fn platform(&self) -> &str {
        "webhook"
    }

    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    async fn start(&mut self, router: Arc<Router>, cancel: CancellationToken) -> anyhow::Result<()> {
        let instance_id = self.instance_id.clone();
        let config = self.config.clone();
        let client = self.client.clone();

        let send_instance_id = instance_id.clone();
        let send_fn: crate::driver::SendFn = Arc::new(move |channel, text, attachments, mut extra| {
            let config = config.clone();
            let client = client.clone();
            let instance_id = send_instance_id.clone();
            Box::pin(async move {
                let mut text = text;
                if let Some(rich_header) = extra.remove("rich_header") {
                    let title = rich_header.get("title").and_then(|v| v.as_str()).unwrap_or("");
                    let content = rich_header.get("content").and_then(|v| v.as_str());
                    let prefix = match content {
                        Some(c) if !c.is_empty() => format!("[{title} · {c}]"),
                        _ => format!("[{title}]"),
                    };
                    text = if text.is_empty() { prefix } else { format!("{prefix}\n{text}") };
                }

                let mut payload = serde_json::Map::new();
                payload.insert("text".to_string(), serde_json::Value::String(text));
                payload.insert("channel".to_string(), channel_to_json(&channel));
                payload.insert(
                    "attachments".to_string(),
                    serde_json::to_value(attachments.iter().map(AttachmentPayload::from).collect::<Vec<_>>())?,
                );
                for (k, v) in extra {
                    payload.insert(k, v);
                }

                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(reqwest::header::CONTENT_TYPE, "application/json".parse().unwrap());
                for (k, v) in &config.headers {
                    if let (Ok(name), Ok(value)) = (
                        reqwest::header::HeaderName::try_from(k.as_str()),
                        reqwest::header::HeaderValue::try_from(v.as_str()),
                    ) {
                        headers.insert(name, value);
                    }
                }

                let method = reqwest::Method::from_bytes(config.method.as_bytes()).unwrap_or(reqwest::Method::POST);
                let builder = client.request(method, &config.url).headers(headers).json(&payload);
                let resp = send_with_retry(builder, &instance_id).await;

                match resp {
                    Ok(resp) if resp.status().is_success() => Ok(None),
                    Ok(resp) => {
                        let status = resp.status();
                        let body = resp.text().await.unwrap_or_default();
                        tracing::error!(
                            instance = %instance_id,
                            status = %status,
                            body = %body.chars().take(200).collect::<String>(),
                            "webhook send failed"
                        );
                        Ok(None)
                    }
                    Err(e) => {
                        tracing::error!(instance = %instance_id, error = %e, "webhook send failed");
                        Ok(None)
                    }
                }
            })
        });

        router.register_sender(&instance_id, send_fn).await;
        tracing::info!(instance = %instance_id, url = %self.config.url, "webhook driver ready (send-only)");

        cancel.cancelled().await;
        router.unregister_sender(&instance_id).await;
        Ok(())
    }
}

/// Sends one request with automatic retry on transient network/5xx/429
/// failures (spec.md §5 "sender invocations should not block indefinitely";
/// §7 `TransientIOError` is recovered locally rather than surfaced to the
/// router). Grounded on the teacher's `gateway::providers::send_with_retry`.
async fn send_with_retry(builder: reqwest::RequestBuilder, instance_id: &str) -> Result<reqwest::Response, reqwest::Error> {
    let Some(template) = builder.try_clone() else {
        return builder.send().await;
    };
    let policy = RetryPolicy::http_default();
    retry_with_backoff(
        &policy,
        |_attempt| {
            let req = template.try_clone().expect("webhook request body is always cloneable JSON");
            async move { req.send().await }
        },
        classify_reqwest_result,
        |RetryAttempt { attempt, delay, reason }| {
            tracing::debug!(
                instance = instance_id,
                attempt,
                reason = reason.as_str(),
                delay_ms = delay.as_millis() as u64,
                "webhook send: transient failure, retrying"
            );
        },
    )
    .await
}

fn channel_to_json(channel: &BTreeMap<String, ChannelValue>) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = channel
        .iter()
        .map(|(k, v)| {
            let value = match v {
                ChannelValue::Str(s) => serde_json::Value::String(s.clone()),
                ChannelValue::Num(n) => serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null),
            };
            (k.clone(), value)
        })
        .collect();
    serde_json::Value::Object(map)
}

pub fn register(registry: &DriverRegistry) -> anyhow::Result<()> {
    let ctor: DriverConstructor = Arc::new(|instance_id, config| {
        let config: WebhookConfig = serde_json::from_value(config)?;
        Ok(Box::new(WebhookDriver::new(instance_id, config)) as Box<dyn Driver>)
    });
    registry.register("webhook", validator_for::<WebhookConfig>(), ctor)
}
