//! The bridge's lingua franca: `NormalizedMessage` and `Attachment`.
//!
//! Grounded on `examples/original_source/services/message.py`'s
//! `Attachment` / `NormalizedMessage` dataclasses, typed for Rust per
//! SPEC_FULL.md §3. A driver constructs one of these per inbound platform
//! event, hands it to `Router::on_message` once, and never touches it
//! again — the router does not retain it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Kind of media carried by an `Attachment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttachmentType {
    Image,
    Video,
    Voice,
    File,
}

/// A media blob associated with a message.
///
/// Invariant: at least one of `url` or `data` must be non-empty, else the
/// attachment is ignored on send (`Attachment::is_usable`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentType,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub name: String,
    /// Byte count, `-1` if unknown.
    #[serde(default = "default_size")]
    pub size: i64,
    /// Pre-fetched bytes. When present the media fetcher skips network I/O.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
}

fn default_size() -> i64 {
    -1
}

impl Attachment {
    pub fn new(kind: AttachmentType, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            name: String::new(),
            size: -1,
            data: None,
        }
    }

    /// At least one of `url` or `data` must be non-empty.
    pub fn is_usable(&self) -> bool {
        !self.url.is_empty() || self.data.as_ref().is_some_and(|d| !d.is_empty())
    }
}

/// A single value in a `ChannelAddress`. Platforms mix string and numeric
/// channel identifiers (`chat_id` is often numeric on Telegram, a string
/// elsewhere); rule matching compares both stringwise (spec.md §4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelValue {
    Str(String),
    Num(f64),
}

impl ChannelValue {
    /// Stringwise comparison value, used uniformly by rule matching and
    /// echo suppression regardless of the original JSON type.
    pub fn as_compare_str(&self) -> String {
        match self {
            ChannelValue::Str(s) => s.clone(),
            ChannelValue::Num(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
        }
    }
}

impl std::fmt::Display for ChannelValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_compare_str())
    }
}

impl From<&str> for ChannelValue {
    fn from(s: &str) -> Self {
        ChannelValue::Str(s.to_string())
    }
}

impl From<String> for ChannelValue {
    fn from(s: String) -> Self {
        ChannelValue::Str(s)
    }
}

impl From<i64> for ChannelValue {
    fn from(n: i64) -> Self {
        ChannelValue::Num(n as f64)
    }
}

/// Platform-specific channel address. Keys vary by platform (`chat_id`,
/// `room_id`, `group_id`, `channel_id`, `space_name`, ...); the router
/// treats this purely structurally and needs no per-platform knowledge.
///
/// `BTreeMap` (rather than `HashMap`) gives deterministic iteration and a
/// straightforward derived `PartialEq`, which echo suppression's deep
/// equality check relies on directly.
pub type ChannelAddress = BTreeMap<String, ChannelValue>;

/// Platform-agnostic message passed through the bridge exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMessage {
    /// Driver kind tag (e.g. `"discord"`). Informational only.
    pub platform: String,
    /// Unique identifier of the source driver instance; matches a key in
    /// config.
    pub instance_id: String,
    pub channel: ChannelAddress,
    pub user: String,
    pub user_id: String,
    #[serde(default)]
    pub user_avatar: String,
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub reply_parent: Option<String>,
}

impl NormalizedMessage {
    pub fn new(
        platform: impl Into<String>,
        instance_id: impl Into<String>,
        channel: ChannelAddress,
        user: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            instance_id: instance_id.into(),
            channel,
            user: user.into(),
            user_id: user_id.into(),
            user_avatar: String::new(),
            text: text.into(),
            attachments: Vec::new(),
            message_id: None,
            reply_parent: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_requires_url_or_data() {
        let mut att = Attachment::new(AttachmentType::Image, "");
        assert!(!att.is_usable());
        att.url = "https://example.com/a.png".into();
        assert!(att.is_usable());

        let mut att2 = Attachment::new(AttachmentType::Image, "");
        att2.data = Some(vec![1, 2, 3]);
        assert!(att2.is_usable());
    }

    #[test]
    fn channel_value_compares_stringwise_across_types() {
        let a = ChannelValue::Str("123".to_string());
        let b = ChannelValue::Num(123.0);
        assert_eq!(a.as_compare_str(), b.as_compare_str());
    }

    #[test]
    fn channel_address_btreemap_is_deterministic_and_comparable() {
        let mut c1: ChannelAddress = BTreeMap::new();
        c1.insert("chat_id".to_string(), "1".into());
        let mut c2: ChannelAddress = BTreeMap::new();
        c2.insert("chat_id".to_string(), "1".into());
        assert_eq!(c1, c2);
    }
}
