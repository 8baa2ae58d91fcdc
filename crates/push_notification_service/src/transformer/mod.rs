/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

pub mod android;
pub mod ios;
pub mod legacy;

use crate::common::types::NotificationRequest;
use chrono::{DateTime, Local};
use serde_json::{json, Map, Value};

/// The three payload shapes the shipping mobile applications consume, one per
/// send endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Legacy,
    AndroidV1,
    IosV1,
}

impl Variant {
    pub fn analytics_label(self) -> &'static str {
        match self {
            Variant::Legacy => "legacyNotification",
            Variant::AndroidV1 => "androidV1Notification",
            Variant::IosV1 => "iosV1Notification",
        }
    }
}

pub const RATE_LIMIT_ANALYTICS_LABEL: &str = "rateLimitNotification";
pub const ENCRYPTED_ANALYTICS_LABEL: &str = "encryptedV1Notification";

/// Result of transforming a request: the outgoing FCM message tree (without
/// the target token, which the orchestrator injects) and whether the request
/// counts against the daily quota. Command overloads and critical alerts
/// bypass accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPayload {
    pub update_rate_limits: bool,
    pub message: Map<String, Value>,
}

/// Pure per-variant payload construction; the request is never mutated.
pub fn build(variant: Variant, req: &NotificationRequest) -> BuiltPayload {
    match variant {
        Variant::Legacy => legacy::build(req),
        Variant::AndroidV1 => android::build(req),
        Variant::IosV1 => ios::build(req),
    }
}

/// The one-shot push delivered the moment a token's daily quota is exactly
/// reached.
pub fn rate_limit_notification(maximum: u32, resets_at: DateTime<Local>) -> Map<String, Value> {
    let body = format!(
        "You have now sent more than {maximum} notifications today. \
         You will not receive new notifications until midnight UTC."
    );
    let message = json!({
        "notification": {
            "title": "Notifications Rate Limited",
            "body": body,
        },
        "data": {
            "rateLimited": "true",
            "maxNotificationsPerDay": maximum.to_string(),
            "resetsAt": resets_at.to_rfc3339(),
        },
        "android": {
            "notification": {
                "body_loc_key": "rate_limit_notification.body",
                "title_loc_key": "rate_limit_notification.title",
            },
        },
        "apns": {
            "payload": {
                "aps": {
                    "alert": {
                        "loc-key": "rate_limit_notification.body",
                        "title-loc-key": "rate_limit_notification.title",
                    },
                },
            },
        },
        "fcm_options": { "analytics_label": RATE_LIMIT_ANALYTICS_LABEL },
    });
    match message {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Shared seed for every variant: the plain notification block, the title
/// mirrored into the APNS alert, the variant's recognized passthrough
/// subtrees, and the `apns_headers` rename onto `apns.headers`.
pub(crate) fn seed_payload(
    req: &NotificationRequest,
    passthrough_keys: &[&str],
) -> Map<String, Value> {
    let mut payload = Map::new();

    {
        let notification = ensure_object(&mut payload, "notification");
        if let Some(message) = &req.message {
            let _ = notification.insert("body".to_string(), json!(message));
        }
        if let Some(title) = &req.title {
            let _ = notification.insert("title".to_string(), json!(title));
        }
    }
    if let Some(title) = &req.title {
        let _ = ensure_path(&mut payload, &["apns", "payload", "aps", "alert"])
            .insert("title".to_string(), json!(title));
    }

    if let Some(data) = req.data.as_ref().and_then(Value::as_object) {
        for key in passthrough_keys {
            if let Some(subtree) = data.get(*key) {
                let _ = payload.insert((*key).to_string(), subtree.clone());
            }
        }
        // Top-level rename: the request carries `apns_headers`, the wire
        // format wants them under `apns.headers`.
        if let Some(headers) = data.get("apns_headers") {
            let _ = ensure_object(&mut payload, "apns")
                .insert("headers".to_string(), headers.clone());
        }
    }

    payload
}

pub(crate) fn set_analytics_label(payload: &mut Map<String, Value>, label: &str) {
    let _ = ensure_object(payload, "fcm_options").insert("analytics_label".to_string(), json!(label));
}

pub(crate) fn data_object(req: &NotificationRequest) -> Option<&Map<String, Value>> {
    req.data.as_ref().and_then(Value::as_object)
}

/// Navigate to (creating, or replacing a non-object leaf on the way) the
/// object at `key`.
pub(crate) fn ensure_object<'a>(
    map: &'a mut Map<String, Value>,
    key: &str,
) -> &'a mut Map<String, Value> {
    if !map.get(key).map(Value::is_object).unwrap_or(false) {
        let _ = map.insert(key.to_string(), Value::Object(Map::new()));
    }
    match map.get_mut(key) {
        Some(Value::Object(obj)) => obj,
        _ => unreachable!("key was just set to an object"),
    }
}

pub(crate) fn ensure_path<'a>(
    map: &'a mut Map<String, Value>,
    path: &[&str],
) -> &'a mut Map<String, Value> {
    let mut current = map;
    for key in path {
        current = ensure_object(current, key);
    }
    current
}

pub(crate) fn get_path<'a>(map: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = map.get(*first)?;
    for key in rest {
        current = current.as_object()?.get(*key)?;
    }
    Some(current)
}

/// JavaScript-flavored truthiness, matching how the shipping apps treat flag
/// fields arriving as bools, numbers, or strings.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(num) => num.as_f64().map(|n| n != 0.0).unwrap_or(false),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Stringify a scalar the way the Android app expects its `data` values:
/// strings verbatim, everything else JSON-encoded.
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn coerce_to_number(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::String(text) => {
            if let Ok(int) = text.trim().parse::<i64>() {
                Some(json!(int))
            } else {
                text.trim().parse::<f64>().ok().map(|float| json!(float))
            }
        }
        _ => None,
    }
}

pub(crate) fn coerce_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(num) => num.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub(crate) fn coerce_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(num) => num.as_i64().or_else(|| num.as_f64().map(|f| f as i64)),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        Value::Bool(flag) => Some(i64::from(*flag)),
        _ => None,
    }
}
