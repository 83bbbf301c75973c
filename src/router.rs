//! The Bridge Router (spec.md §4.4) — rule matching, templating, the
//! sensitive-value guard, and fan-out dispatch. This is the core the rest
//! of the crate exists to serve.
//!
//! Grounded on `examples/original_source/services/bridge.py`'s `Bridge`
//! class, generalized per SPEC_FULL.md §9: `rules`, `senders`, and
//! `sensitive` are fields on an explicit `Router` object constructed once
//! at startup and passed around via `Arc`, rather than a module-level
//! `bridge = Bridge()` singleton.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::driver::SendFn;
use crate::error::BridgeError;
use crate::message::{ChannelAddress, NormalizedMessage};
use crate::rules::{msg_format, MsgConfig, Rule};
use crate::sensitive::SensitiveIndex;

/// The router's three pieces of shared state (spec.md §4.4 "State").
/// `rules` and `sensitive` are frozen for the router's lifetime; `senders`
/// is written at driver startup and read on every dispatch.
pub struct Router {
    rules: Arc<Vec<Rule>>,
    senders: Mutex<HashMap<String, SendFn>>,
    sensitive: Arc<SensitiveIndex>,
}

impl Router {
    pub fn new(rules: Vec<Rule>, sensitive: Arc<SensitiveIndex>) -> Self {
        Self {
            rules: Arc::new(rules),
            senders: Mutex::new(HashMap::new()),
            sensitive,
        }
    }

    /// Installs or replaces the send callback for `instance_id`. Safe to
    /// call concurrently with `on_message`.
    pub async fn register_sender(&self, instance_id: &str, send_fn: SendFn) {
        let mut senders = self.senders.lock().await;
        senders.insert(instance_id.to_string(), send_fn);
    }

    pub async fn unregister_sender(&self, instance_id: &str) {
        let mut senders = self.senders.lock().await;
        senders.remove(instance_id);
    }

    /// Dispatch entry point. Iterates rules in declaration order; every
    /// matching rule dispatches independently (duplicates across rules are
    /// intentional, spec.md §4.4).
    ///
    /// Targets within one rule, and rules within one call, are awaited
    /// sequentially — the caller (a single driver's receive loop) must
    /// itself call `on_message` once per inbound event, in order, to get
    /// the per-channel ordering guarantee of spec.md §5.
    pub async fn on_message(&self, msg: &NormalizedMessage) {
        for rule in self.rules.iter() {
            match rule {
                Rule::Forward { from, to, msg: msg_cfg } => {
                    let Some(src) = from.get(&msg.instance_id) else { continue };
                    if !address_matches(src, &msg.channel) {
                        continue;
                    }
                    for (target_id, target_addr) in to {
                        self.dispatch_target(msg, "forward", target_id, target_addr, msg_cfg)
                            .await;
                    }
                }
                Rule::Connect { channels, msg: global_msg } => {
                    let Some(src) = channels.get(&msg.instance_id) else { continue };
                    if !address_matches(&src.address, &msg.channel) {
                        continue;
                    }
                    for (target_id, target_entry) in channels {
                        if target_id == &msg.instance_id {
                            continue;
                        }
                        let effective_msg = merge_msg(global_msg, target_entry.msg.as_ref());
                        self.dispatch_target(msg, "connect", target_id, &target_entry.address, &effective_msg)
                            .await;
                    }
                }
            }
        }
    }

    async fn dispatch_target(
        &self,
        msg: &NormalizedMessage,
        rule_kind: &str,
        target_id: &str,
        target_addr: &ChannelAddress,
        msg_cfg: &MsgConfig,
    ) {
        // Echo suppression: never invoke a sender for the message's own
        // (instance, channel), under deep equality of the channel map.
        if target_id == msg.instance_id && *target_addr == msg.channel {
            return;
        }

        let ctx = template_context(msg);
        let format = msg_format(msg_cfg);
        let text = match expand_template(&format, &ctx) {
            Ok(t) => t,
            Err(key) => {
                let err = BridgeError::TemplateKey(key);
                tracing::warn!(rule = rule_kind, target = target_id, error = %err, "falling back to raw text");
                msg.text.clone()
            }
        };

        if self.sensitive.contains_leak(&text) {
            let err = BridgeError::SensitiveLeakBlocked(target_id.to_string());
            tracing::warn!(rule = rule_kind, target = target_id, error = %err);
            return;
        }

        let extra = expand_extra_fields(msg_cfg, &ctx);

        let sender = {
            let senders = self.senders.lock().await;
            senders.get(target_id).cloned()
        };
        let Some(sender) = sender else {
            let err = BridgeError::SenderNotRegistered(target_id.to_string());
            tracing::warn!(rule = rule_kind, target = target_id, error = %err);
            return;
        };

        // §3 invariant: an attachment with neither `url` nor `data` is
        // ignored on send rather than forwarded to the driver.
        let attachments: Vec<_> = msg.attachments.iter().filter(|a| a.is_usable()).cloned().collect();

        if let Err(e) = sender(target_addr.clone(), text, attachments, extra).await {
            tracing::error!(rule = rule_kind, target = target_id, error = %e, "sender invocation failed");
        }
    }
}

/// Every `(key, value)` in `rule_addr` must equal `msg_channel[key]`
/// stringwise. `msg_channel` may carry additional keys the rule doesn't
/// mention — this is a subset match, distinct from echo suppression's
/// deep equality (spec.md §4.4).
fn address_matches(rule_addr: &ChannelAddress, msg_channel: &ChannelAddress) -> bool {
    rule_addr.iter().all(|(k, v)| {
        msg_channel
            .get(k)
            .is_some_and(|mv| mv.as_compare_str() == v.as_compare_str())
    })
}

/// Connect-rule merge: channel-local `msg` overrides the rule's global
/// `msg`, key by key (spec.md §4.4 "Connect merge rule").
fn merge_msg(global: &MsgConfig, local: Option<&MsgConfig>) -> MsgConfig {
    let mut merged = global.clone();
    if let Some(local) = local {
        for (k, v) in local {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}

fn template_context(msg: &NormalizedMessage) -> HashMap<String, String> {
    let mut ctx = HashMap::with_capacity(6);
    ctx.insert("platform".to_string(), msg.platform.clone());
    ctx.insert("from".to_string(), msg.instance_id.clone());
    ctx.insert("username".to_string(), msg.user.clone());
    ctx.insert("user_id".to_string(), msg.user_id.clone());
    ctx.insert("user_avatar".to_string(), msg.user_avatar.clone());
    ctx.insert("msg".to_string(), msg.text.clone());
    ctx
}

/// Expands `{placeholder}` tokens against `ctx`. On an unrecognized
/// placeholder returns `Err(placeholder_name)` so the caller decides the
/// fallback (raw text for `msg_format`, pass-through-unexpanded for extra
/// fields — spec.md §4.4 only specifies the former; the latter follows the
/// same "never abort dispatch" spirit).
fn expand_template(template: &str, ctx: &HashMap<String, String>) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    loop {
        match rest.find('{') {
            None => {
                out.push_str(rest);
                return Ok(out);
            }
            Some(idx) => {
                out.push_str(&rest[..idx]);
                let after_open = &rest[idx + 1..];
                match after_open.find('}') {
                    None => {
                        out.push_str(&rest[idx..]);
                        return Ok(out);
                    }
                    Some(end) => {
                        let key = &after_open[..end];
                        match ctx.get(key) {
                            Some(val) => out.push_str(val),
                            None => return Err(key.to_string()),
                        }
                        rest = &after_open[end + 1..];
                    }
                }
            }
        }
    }
}

/// Expands every string-valued key in `msg_cfg` other than `msg_format`
/// against `ctx`. Non-string values pass through unchanged. An unknown
/// placeholder in one of these extra fields logs at debug level (quieter
/// than `msg_format`'s warning, since these are operator-authored optional
/// fields, not the primary message body) and keeps the field's original,
/// unexpanded value rather than substituting `msg.text` (which only makes
/// sense as a fallback for the message body itself).
fn expand_extra_fields(msg_cfg: &MsgConfig, ctx: &HashMap<String, String>) -> serde_json::Map<String, Value> {
    let mut extra = serde_json::Map::with_capacity(msg_cfg.len());
    for (key, value) in msg_cfg {
        if key == "msg_format" {
            continue;
        }
        match value {
            Value::String(s) => match expand_template(s, ctx) {
                Ok(expanded) => {
                    extra.insert(key.clone(), Value::String(expanded));
                }
                Err(placeholder) => {
                    tracing::debug!(field = key, placeholder, "unknown template placeholder in extra field, leaving unexpanded");
                    extra.insert(key.clone(), value.clone());
                }
            },
            other => {
                extra.insert(key.clone(), other.clone());
            }
        }
    }
    extra
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ChannelValue;
    use crate::rules::ConnectChannel;
    use std::sync::Mutex as StdMutex;

    fn addr(pairs: &[(&str, &str)]) -> ChannelAddress {
        pairs.iter().map(|(k, v)| (k.to_string(), ChannelValue::from(*v))).collect()
    }

    fn recording_sender(calls: Arc<StdMutex<Vec<(BTreeMap<String, ChannelValue>, String)>>>) -> SendFn {
        Arc::new(move |channel, text, _attachments, _extra| {
            let calls = calls.clone();
            Box::pin(async move {
                calls.lock().unwrap().push((channel, text));
                Ok(None)
            })
        })
    }

    fn attachment_recording_sender(counts: Arc<StdMutex<Vec<usize>>>) -> SendFn {
        Arc::new(move |_channel, _text, attachments, _extra| {
            let counts = counts.clone();
            Box::pin(async move {
                counts.lock().unwrap().push(attachments.len());
                Ok(None)
            })
        })
    }

    fn msg_cfg(pairs: &[(&str, &str)]) -> MsgConfig {
        let mut m = MsgConfig::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), Value::String(v.to_string()));
        }
        m
    }

    #[tokio::test]
    async fn s1_forward_plain_text() {
        let rule = Rule::Forward {
            from: BTreeMap::from([("a".to_string(), addr(&[("chat", "1")]))]),
            to: BTreeMap::from([("b".to_string(), addr(&[("chat", "2")]))]),
            msg: msg_cfg(&[("msg_format", "[{username}] {msg}")]),
        };
        let router = Router::new(vec![rule], Arc::new(SensitiveIndex::empty()));
        let calls = Arc::new(StdMutex::new(Vec::new()));
        router.register_sender("b", recording_sender(calls.clone())).await;

        let msg = NormalizedMessage::new("x", "a", addr(&[("chat", "1")]), "Alice", "u1", "hi");
        router.on_message(&msg).await;

        let recorded = calls.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].1, "[Alice] hi");
        assert_eq!(recorded[0].0.get("chat"), Some(&ChannelValue::from("2")));
    }

    #[tokio::test]
    async fn unusable_attachments_are_dropped_before_send() {
        use crate::message::{Attachment, AttachmentType};

        let rule = Rule::Forward {
            from: BTreeMap::from([("a".to_string(), addr(&[("chat", "1")]))]),
            to: BTreeMap::from([("b".to_string(), addr(&[("chat", "2")]))]),
            msg: msg_cfg(&[]),
        };
        let router = Router::new(vec![rule], Arc::new(SensitiveIndex::empty()));
        let counts = Arc::new(StdMutex::new(Vec::new()));
        router.register_sender("b", attachment_recording_sender(counts.clone())).await;

        let mut msg = NormalizedMessage::new("x", "a", addr(&[("chat", "1")]), "Alice", "u1", "hi");
        msg.attachments.push(Attachment::new(AttachmentType::Image, "https://example.com/a.png"));
        msg.attachments.push(Attachment::new(AttachmentType::Image, ""));
        let mut with_data = Attachment::new(AttachmentType::File, "");
        with_data.data = Some(vec![1, 2, 3]);
        msg.attachments.push(with_data);

        router.on_message(&msg).await;

        assert_eq!(*counts.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn s2_connect_fan_out_excludes_source() {
        let rule = Rule::Connect {
            channels: BTreeMap::from([
                ("a".to_string(), ConnectChannel { address: addr(&[("chat", "1")]), msg: None }),
                ("b".to_string(), ConnectChannel { address: addr(&[("chat", "2")]), msg: None }),
                ("c".to_string(), ConnectChannel { address: addr(&[("chat", "3")]), msg: None }),
            ]),
            msg: msg_cfg(&[("msg_format", "{msg}")]),
        };
        let router = Router::new(vec![rule], Arc::new(SensitiveIndex::empty()));
        let calls_a = Arc::new(StdMutex::new(Vec::new()));
        let calls_b = Arc::new(StdMutex::new(Vec::new()));
        let calls_c = Arc::new(StdMutex::new(Vec::new()));
        router.register_sender("a", recording_sender(calls_a.clone())).await;
        router.register_sender("b", recording_sender(calls_b.clone())).await;
        router.register_sender("c", recording_sender(calls_c.clone())).await;

        let msg = NormalizedMessage::new("x", "a", addr(&[("chat", "1")]), "Alice", "u1", "x");
        router.on_message(&msg).await;

        assert_eq!(calls_a.lock().unwrap().len(), 0);
        assert_eq!(calls_b.lock().unwrap().len(), 1);
        assert_eq!(calls_c.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn s3_sensitive_value_blocks_send() {
        let secret = "https://hooks.example/ABCDEF1234567890";
        let rule = Rule::Forward {
            from: BTreeMap::from([("a".to_string(), addr(&[("chat", "1")]))]),
            to: BTreeMap::from([("b".to_string(), addr(&[("chat", "2")]))]),
            msg: msg_cfg(&[("msg_format", "{msg}")]),
        };
        let mut values = std::collections::HashSet::new();
        values.insert(secret.to_string());
        let router = Router::new(vec![rule], Arc::new(SensitiveIndex::from_values(values)));
        let calls = Arc::new(StdMutex::new(Vec::new()));
        router.register_sender("b", recording_sender(calls.clone())).await;

        let msg = NormalizedMessage::new("x", "a", addr(&[("chat", "1")]), "Alice", "u1", format!("leak {secret}"));
        router.on_message(&msg).await;

        assert_eq!(calls.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn s4_degenerate_connect_rule_yields_zero_calls() {
        // Duplicate "a" keys in source JSON collapse to one entry during
        // parsing; a single-entry connect rule has no "other" channels to
        // fan out to.
        let rule = Rule::Connect {
            channels: BTreeMap::from([("a".to_string(), ConnectChannel { address: addr(&[("chat", "1")]), msg: None })]),
            msg: MsgConfig::new(),
        };
        let router = Router::new(vec![rule], Arc::new(SensitiveIndex::empty()));
        let calls = Arc::new(StdMutex::new(Vec::new()));
        router.register_sender("a", recording_sender(calls.clone())).await;

        let msg = NormalizedMessage::new("x", "a", addr(&[("chat", "1")]), "Alice", "u1", "x");
        router.on_message(&msg).await;

        assert_eq!(calls.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn s5_unknown_template_key_falls_back_to_raw_text() {
        let rule = Rule::Forward {
            from: BTreeMap::from([("a".to_string(), addr(&[("chat", "1")]))]),
            to: BTreeMap::from([("b".to_string(), addr(&[("chat", "2")]))]),
            msg: msg_cfg(&[("msg_format", "{doesnotexist}")]),
        };
        let router = Router::new(vec![rule], Arc::new(SensitiveIndex::empty()));
        let calls = Arc::new(StdMutex::new(Vec::new()));
        router.register_sender("b", recording_sender(calls.clone())).await;

        let msg = NormalizedMessage::new("x", "a", addr(&[("chat", "1")]), "Alice", "u1", "hello");
        router.on_message(&msg).await;

        let recorded = calls.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].1, "hello");
    }

    #[tokio::test]
    async fn unknown_extra_keys_pass_through_after_templating() {
        let rule = Rule::Forward {
            from: BTreeMap::from([("a".to_string(), addr(&[("chat", "1")]))]),
            to: BTreeMap::from([("b".to_string(), addr(&[("chat", "2")]))]),
            msg: msg_cfg(&[("msg_format", "{msg}"), ("custom_foo", "v")]),
        };
        let extras: Arc<StdMutex<Vec<serde_json::Map<String, Value>>>> = Arc::new(StdMutex::new(Vec::new()));
        let extras_cloned = extras.clone();
        let sender: SendFn = Arc::new(move |_channel, _text, _attachments, extra| {
            let extras_cloned = extras_cloned.clone();
            Box::pin(async move {
                extras_cloned.lock().unwrap().push(extra);
                Ok(None)
            })
        });
        let router = Router::new(vec![rule], Arc::new(SensitiveIndex::empty()));
        router.register_sender("b", sender).await;

        let msg = NormalizedMessage::new("x", "a", addr(&[("chat", "1")]), "Alice", "u1", "hi");
        router.on_message(&msg).await;

        let recorded = extras.lock().unwrap();
        assert_eq!(recorded[0].get("custom_foo"), Some(&Value::String("v".to_string())));
    }

    #[tokio::test]
    async fn missing_sender_logs_and_continues_without_panicking() {
        let rule = Rule::Forward {
            from: BTreeMap::from([("a".to_string(), addr(&[("chat", "1")]))]),
            to: BTreeMap::from([("ghost".to_string(), addr(&[("chat", "9")]))]),
            msg: MsgConfig::new(),
        };
        let router = Router::new(vec![rule], Arc::new(SensitiveIndex::empty()));
        let msg = NormalizedMessage::new("x", "a", addr(&[("chat", "1")]), "Alice", "u1", "hi");
        router.on_message(&msg).await;
    }

    #[tokio::test]
    async fn rule_order_independence_for_disjoint_rules() {
        let rule1 = Rule::Forward {
            from: BTreeMap::from([("a".to_string(), addr(&[("chat", "1")]))]),
            to: BTreeMap::from([("b".to_string(), addr(&[("chat", "2")]))]),
            msg: MsgConfig::new(),
        };
        let rule2 = Rule::Forward {
            from: BTreeMap::from([("c".to_string(), addr(&[("chat", "3")]))]),
            to: BTreeMap::from([("d".to_string(), addr(&[("chat", "4")]))]),
            msg: MsgConfig::new(),
        };

        let run = |rules: Vec<Rule>| async move {
            let router = Router::new(rules, Arc::new(SensitiveIndex::empty()));
            let calls = Arc::new(StdMutex::new(Vec::new()));
            router.register_sender("b", recording_sender(calls.clone())).await;
            let msg = NormalizedMessage::new("x", "a", addr(&[("chat", "1")]), "Alice", "u1", "hi");
            router.on_message(&msg).await;
            calls.lock().unwrap().len()
        };

        let n1 = run(vec![rule1.clone(), rule2.clone()]).await;
        let n2 = run(vec![rule2, rule1]).await;
        assert_eq!(n1, n2);
        assert_eq!(n1, 1);
    }
}
