//! Rule schema and loader (spec.md §3, §6).
//!
//! A rule maps source channels to target channels. Forward rules are
//! directional; connect rules fan out symmetrically among every listed
//! channel. Grounded on `examples/original_source/services/bridge.py`'s
//! rule dicts and `rules.json` loader.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::ChannelAddress;

/// Free-form `msg` block: `msg_format` plus arbitrary extra fields, some of
/// which are themselves templated strings, others opaque passthrough
/// values (spec.md §4.4).
pub type MsgConfig = serde_json::Map<String, Value>;

fn default_msg_format() -> String {
    "{msg}".to_string()
}

/// Reads `msg_format` out of a `MsgConfig`, defaulting to `"{msg}"`.
pub fn msg_format(msg: &MsgConfig) -> String {
    msg.get("msg_format")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(default_msg_format)
}

/// One target channel inside a connect rule, with an optional per-channel
/// override of the rule's global `msg` block.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectChannel {
    #[serde(flatten)]
    pub address: ChannelAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<MsgConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Rule {
    #[serde(rename = "forward")]
    Forward {
        from: BTreeMap<String, ChannelAddress>,
        to: BTreeMap<String, ChannelAddress>,
        #[serde(default)]
        msg: MsgConfig,
    },
    #[serde(rename = "connect")]
    Connect {
        channels: BTreeMap<String, ConnectChannel>,
        #[serde(default)]
        msg: MsgConfig,
    },
}

impl Rule {
    /// Every `instance_id` this rule references, for load-time validation
    /// against the set of configured driver instances.
    pub fn referenced_instances(&self) -> Vec<&str> {
        match self {
            Rule::Forward { from, to, .. } => from
                .keys()
                .chain(to.keys())
                .map(String::as_str)
                .collect(),
            Rule::Connect { channels, .. } => channels.keys().map(String::as_str).collect(),
        }
    }
}

/// `{ "rules": [ <rule>, ... ] }` from `data/rules.json`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl RuleSet {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read rules file {}: {e}", path.display()))?;
        let set: RuleSet = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("failed to parse rules file {}: {e}", path.display()))?;
        Ok(set)
    }

    /// Validates every referenced `instance_id` appears in `known_instances`
    /// (spec.md §3 invariant). Returns the first unknown reference found.
    pub fn validate_instances(&self, known_instances: &std::collections::HashSet<String>) -> anyhow::Result<()> {
        for rule in &self.rules {
            for id in rule.referenced_instances() {
                if !known_instances.contains(id) {
                    return Err(anyhow::anyhow!(
                        crate::error::ConfigError::UnknownInstance(id.to_string())
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn forward_rule_deserializes_from_spec_shape() {
        let v = json!({
            "type": "forward",
            "from": {"a": {"chat": "1"}},
            "to": {"b": {"chat": "2"}},
            "msg": {"msg_format": "[{username}] {msg}"}
        });
        let rule: Rule = serde_json::from_value(v).unwrap();
        match rule {
            Rule::Forward { from, to, msg } => {
                assert!(from.contains_key("a"));
                assert!(to.contains_key("b"));
                assert_eq!(msg_format(&msg), "[{username}] {msg}");
            }
            _ => panic!("expected forward rule"),
        }
    }

    #[test]
    fn connect_rule_deserializes_with_per_channel_msg_override() {
        let v = json!({
            "type": "connect",
            "channels": {
                "a": {"chat": "1"},
                "b": {"chat": "2", "msg": {"msg_format": "b-only"}}
            },
            "msg": {"msg_format": "{msg}"}
        });
        let rule: Rule = serde_json::from_value(v).unwrap();
        match rule {
            Rule::Connect { channels, msg } => {
                assert_eq!(msg_format(&msg), "{msg}");
                let b = &channels["b"];
                assert!(b.msg.is_some());
                assert_eq!(msg_format(b.msg.as_ref().unwrap()), "b-only");
            }
            _ => panic!("expected connect rule"),
        }
    }

    #[test]
    fn msg_format_defaults_to_msg_placeholder() {
        let msg = MsgConfig::new();
        assert_eq!(msg_format(&msg), "{msg}");
    }

    #[test]
    fn rule_set_parses_top_level_rules_array() {
        let text = r#"{ "rules": [ { "type": "forward", "from": {"a": {"chat": "1"}}, "to": {"b": {"chat": "2"}}, "msg": {} } ] }"#;
        let set: RuleSet = serde_json::from_str(text).unwrap();
        assert_eq!(set.rules.len(), 1);
    }

    #[test]
    fn validate_instances_rejects_unknown_reference() {
        let set = RuleSet {
            rules: vec![Rule::Forward {
                from: BTreeMap::from([("a".to_string(), ChannelAddress::new())]),
                to: BTreeMap::from([("ghost".to_string(), ChannelAddress::new())]),
                msg: MsgConfig::new(),
            }],
        };
        let known: std::collections::HashSet<String> = ["a".to_string()].into_iter().collect();
        assert!(set.validate_instances(&known).is_err());
    }
}
