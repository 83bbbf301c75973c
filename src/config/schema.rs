//! Per-driver config schema validation (spec.md §6, §7).
//!
//! Python's per-driver config models are pydantic classes with
//! `extra="forbid"`: unknown fields raise a validation error, declared
//! fields are type-checked. The Rust analogue used here is
//! `#[serde(deny_unknown_fields)]` on each driver's config struct, wrapped
//! in a `SchemaValidator` closure that attempts
//! `serde_json::from_value::<T>` and reports the first unexpected field by
//! name — `serde`'s `deny_unknown_fields` error message already names the
//! field, so the closure only needs to attach the `platform.instance_id`
//! path spec.md §7 requires.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::ConfigError;
use crate::registry::{DriverRegistry, SchemaValidator};

/// `#[serde(deserialize_with = "deserialize_http_url")]` for a required
/// `String` field that must be a well-formed `http`/`https` URL (e.g. a
/// webhook endpoint). Keeps the field typed as `String` — callers pass it
/// straight to `reqwest` — but rejects garbage at config-load time instead
/// of at first send, matching pydantic's `AnyHttpUrl` field validators in
/// `examples/original_source`'s driver config models.
pub fn deserialize_http_url<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    validate_http_url(&raw).map_err(serde::de::Error::custom)?;
    Ok(raw)
}

/// Same as [`deserialize_http_url`] but for an optional field.
pub fn deserialize_optional_http_url<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    if let Some(raw) = &raw {
        validate_http_url(raw).map_err(serde::de::Error::custom)?;
    }
    Ok(raw)
}

fn validate_http_url(raw: &str) -> Result<(), String> {
    let url = url::Url::parse(raw).map_err(|e| format!("invalid URL '{raw}': {e}"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(format!("URL '{raw}' must use http or https, got '{}'", url.scheme()));
    }
    Ok(())
}

/// Builds a `SchemaValidator` for a driver config type `T` that derives
/// `Deserialize` with `#[serde(deny_unknown_fields)]`.
pub fn validator_for<T>() -> SchemaValidator
where
    T: serde::de::DeserializeOwned + 'static,
{
    std::sync::Arc::new(|config: &Value| {
        serde_json::from_value::<T>(config.clone())
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!(e))
    })
}

/// Walks the top-level config object. For each platform key: if it isn't
/// registered, logs a warning and skips it (unknown top-level platforms
/// are tolerated — spec.md §6). If it is registered, validates every
/// instance block against that platform's schema; a failure there is fatal
/// and reported with the full `platform.instance_id` path.
pub fn validate_top_level(config: &Value, registry: &DriverRegistry) -> Result<(), ConfigError> {
    let Some(platforms) = config.as_object() else {
        return Err(ConfigError::Invalid {
            path: "<root>".to_string(),
            message: "config file must be a JSON/YAML/TOML object at the top level".to_string(),
        });
    };

    for (platform, instances) in platforms {
        if !registry.contains(platform) {
            tracing::warn!(platform, "unknown platform in config, ignoring");
            continue;
        }
        let Some(instances) = instances.as_object() else {
            return Err(ConfigError::Invalid {
                path: platform.clone(),
                message: "expected a map of instance_id -> driver config".to_string(),
            });
        };
        for (instance_id, instance_cfg) in instances {
            registry
                .validate(platform, instance_cfg)
                .map_err(|e| ConfigError::UnknownField {
                    path: format!("{platform}.{instance_id}"),
                    field: e.to_string(),
                })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DriverRegistry;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Deserialize)]
    #[serde(deny_unknown_fields)]
    struct WebhookConfig {
        url: String,
        #[serde(default)]
        method: Option<String>,
    }

    fn registry_with_webhook() -> DriverRegistry {
        let reg = DriverRegistry::new();
        let ctor: crate::driver::DriverConstructor = Arc::new(|_id, _cfg| anyhow::bail!("unused in this test"));
        reg.register("webhook", validator_for::<WebhookConfig>(), ctor).unwrap();
        reg
    }

    #[test]
    fn unknown_top_level_platform_is_tolerated() {
        let reg = registry_with_webhook();
        let config = json!({ "not_a_real_platform": { "a": {} } });
        assert!(validate_top_level(&config, &reg).is_ok());
    }

    #[test]
    fn unknown_per_driver_field_is_a_hard_error() {
        let reg = registry_with_webhook();
        let config = json!({ "webhook": { "main": { "url": "https://x", "typo_field": true } } });
        let err = validate_top_level(&config, &reg).unwrap_err();
        match err {
            ConfigError::UnknownField { path, .. } => assert_eq!(path, "webhook.main"),
            other => panic!("expected UnknownField, got {other:?}"),
        }
    }

    #[test]
    fn declared_fields_validate_successfully() {
        let reg = registry_with_webhook();
        let config = json!({ "webhook": { "main": { "url": "https://x", "method": "POST" } } });
        assert!(validate_top_level(&config, &reg).is_ok());
    }

    #[test]
    fn deserialize_http_url_rejects_malformed_and_non_http_schemes() {
        #[derive(Deserialize)]
        struct T {
            #[serde(deserialize_with = "deserialize_http_url")]
            url: String,
        }
        assert!(serde_json::from_value::<T>(json!({ "url": "not a url" })).is_err());
        assert!(serde_json::from_value::<T>(json!({ "url": "ftp://x/y" })).is_err());
        assert!(serde_json::from_value::<T>(json!({ "url": "https://x/y" })).is_ok());
    }

    #[test]
    fn deserialize_optional_http_url_allows_absent_value() {
        #[derive(Deserialize)]
        struct T {
            #[serde(default, deserialize_with = "deserialize_optional_http_url")]
            webhook_url: Option<String>,
        }
        assert_eq!(serde_json::from_value::<T>(json!({})).unwrap().webhook_url, None);
        assert!(serde_json::from_value::<T>(json!({ "webhook_url": "bad" })).is_err());
    }
}
