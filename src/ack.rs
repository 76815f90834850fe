//! Display helpers for acknowledgements published by the device.
//!
//! ACKs are normally `{"ok": bool, "msg": ...}`. Older firmware sends list
//! results with `msg` holding a JSON document encoded as a string, so `msg`
//! is decoded a second time when that works.

use serde::Deserialize;
use serde_json::{Map, Value};

/// Pretty-print an ACK payload. Non-JSON payloads come back verbatim.
pub fn render(payload: &[u8]) -> String {
    let text = String::from_utf8_lossy(payload);
    match serde_json::from_str::<Value>(&text) {
        Ok(mut value) => {
            if let Value::Object(obj) = &mut value {
                expand_nested_msg(obj);
            }
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| text.into_owned())
        }
        Err(_) => text.into_owned(),
    }
}

fn expand_nested_msg(obj: &mut Map<String, Value>) {
    let Some(Value::String(inner)) = obj.get("msg") else {
        return;
    };
    if let Ok(parsed) = serde_json::from_str::<Value>(inner) {
        obj.insert("msg".to_string(), parsed);
    }
}

/// One-line outcome of an ACK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckSummary {
    pub ok: bool,
    pub detail: String,
}

impl std::fmt::Display for AckSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let outcome = if self.ok { "ok" } else { "failed" };
        if self.detail.is_empty() {
            write!(f, "{outcome}")
        } else {
            write!(f, "{outcome}: {}", self.detail)
        }
    }
}

pub fn summarize(payload: &[u8]) -> Option<AckSummary> {
    let value: Value = serde_json::from_slice(payload).ok()?;
    let obj = value.as_object()?;
    let ok = obj.get("ok").and_then(Value::as_bool).unwrap_or(false);
    let detail = match obj.get("msg") {
        None | Some(Value::Null) => String::new(),
        Some(Value::Object(_)) => "(data)".to_string(),
        Some(Value::Array(_)) => "(list)".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    Some(AckSummary { ok, detail })
}

#[derive(Deserialize)]
struct WifiList {
    networks: Option<Vec<WifiItem>>,
}

#[derive(Deserialize)]
struct WifiItem {
    ssid: String,
}

/// SSIDs carried by a Wi-Fi `list` reply, if this ACK is one.
pub fn wifi_networks(payload: &[u8]) -> Option<Vec<String>> {
    let value: Value = serde_json::from_slice(payload).ok()?;
    let msg = value.as_object()?.get("msg")?;
    let list: WifiList = match msg {
        Value::String(inner) => serde_json::from_str(inner).ok()?,
        Value::Object(_) => serde_json::from_value(msg.clone()).ok()?,
        _ => return None,
    };
    Some(list.networks?.into_iter().map(|n| n.ssid).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reparse(rendered: &str) -> Value {
        serde_json::from_str(rendered).unwrap()
    }

    #[test]
    fn plain_json_is_pretty_printed() {
        let out = render(br#"{"ok":true,"msg":"color set"}"#);
        assert_eq!(out, "{\n  \"ok\": true,\n  \"msg\": \"color set\"\n}");
    }

    #[test]
    fn nested_json_string_in_msg_is_expanded() {
        let payload = br#"{"ok":true,"msg":"{\"networks\":[{\"ssid\":\"home\"}]}"}"#;
        let out = reparse(&render(payload));
        assert_eq!(
            out,
            serde_json::json!({"ok": true, "msg": {"networks": [{"ssid": "home"}]}})
        );
    }

    #[test]
    fn non_json_msg_string_is_left_alone() {
        let out = reparse(&render(br#"{"ok":false,"msg":"no such ssid"}"#));
        assert_eq!(out["msg"], "no such ssid");
    }

    #[test]
    fn non_string_msg_is_untouched() {
        let out = reparse(&render(br#"{"ok":true,"msg":{"networks":[]}}"#));
        assert_eq!(out["msg"], serde_json::json!({"networks": []}));

        let out = reparse(&render(br#"{"ok":true,"msg":42}"#));
        assert_eq!(out["msg"], 42);
    }

    #[test]
    fn non_object_json_is_rendered_without_expansion() {
        assert_eq!(render(b"[1,2]"), "[\n  1,\n  2\n]");
    }

    #[test]
    fn non_json_payload_is_returned_verbatim() {
        assert_eq!(render(b"rebooting..."), "rebooting...");
        assert_eq!(render(b""), "");
    }

    #[test]
    fn non_ascii_is_kept() {
        let out = render("{\"msg\":\"已連線\"}".as_bytes());
        assert!(out.contains("已連線"), "{out}");
    }

    #[test]
    fn summaries() {
        let s = summarize(br#"{"ok":true,"msg":"saved"}"#).unwrap();
        assert_eq!(s.to_string(), "ok: saved");
        let s = summarize(br#"{"ok":true,"msg":{"networks":[]}}"#).unwrap();
        assert_eq!(s.detail, "(data)");
        let s = summarize(br#"{"ok":false,"msg":[1]}"#).unwrap();
        assert_eq!(s.to_string(), "failed: (list)");
        let s = summarize(br#"{"msg":null}"#).unwrap();
        assert_eq!(s.to_string(), "failed");
        assert!(summarize(b"garbage").is_none());
    }

    #[test]
    fn replies_without_networks_are_not_wifi_lists() {
        assert_eq!(wifi_networks(br#"{"ok":true,"msg":{"mode":"rainbow"}}"#), None);
        assert_eq!(wifi_networks(br#"{"ok":true,"msg":"{}"}"#), None);
        assert_eq!(wifi_networks(br#"{"ok":true,"msg":{"networks":null}}"#), None);
    }

    #[test]
    fn wifi_list_in_either_shape() {
        let nested = br#"{"ok":true,"msg":"{\"networks\":[{\"ssid\":\"a\"},{\"ssid\":\"b\"}]}"}"#;
        assert_eq!(wifi_networks(nested), Some(vec!["a".into(), "b".into()]));

        let direct = br#"{"ok":true,"msg":{"networks":[{"ssid":"test_wifi"}]}}"#;
        assert_eq!(wifi_networks(direct), Some(vec!["test_wifi".into()]));

        let empty = br#"{"ok":true,"msg":{"networks":[]}}"#;
        assert_eq!(wifi_networks(empty), Some(vec![]));

        assert_eq!(wifi_networks(br#"{"ok":true,"msg":"added"}"#), None);
        assert_eq!(wifi_networks(b"not json"), None);
    }
}
