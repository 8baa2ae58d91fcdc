/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use super::{
    coerce_to_f64, coerce_to_i64, coerce_to_number, data_object, ensure_object, ensure_path,
    is_truthy, seed_payload, set_analytics_label, BuiltPayload, Variant,
    ENCRYPTED_ANALYTICS_LABEL,
};
use crate::common::types::NotificationRequest;
use serde_json::{json, Map, Value};

const ATTACHMENT_SHORTHANDS: [(&str, &str); 3] = [
    ("video", "mpeg4"),
    ("image", "jpeg"),
    ("audio", "waveformaudio"),
];

#[derive(Debug, Default)]
struct ApsFlags {
    needs_category: bool,
    needs_mutable_content: bool,
}

pub fn build(req: &NotificationRequest) -> BuiltPayload {
    let mut payload = seed_payload(req, &["apns", "data"]);
    set_analytics_label(&mut payload, Variant::IosV1.analytics_label());

    if let Some(webhook_id) = &req.registration_info.webhook_id {
        let _ = ensure_path(&mut payload, &["apns", "payload"])
            .insert("webhook_id".to_string(), json!(webhook_id));
    }

    let mut update_rate_limits = true;
    if req.registration_info.is_home_assistant_ios() {
        update_rate_limits = apply_home_assistant(req, &mut payload);
    }
    if finalize_aps(&mut payload) {
        update_rate_limits = false;
    }
    apply_encryption(req, &mut payload);

    BuiltPayload {
        update_rate_limits,
        message: payload,
    }
}

/// Home Assistant command overloads and `data` key handling, shared with the
/// legacy variant. Returns whether the request still counts against the
/// quota.
pub(crate) fn apply_home_assistant(
    req: &NotificationRequest,
    payload: &mut Map<String, Value>,
) -> bool {
    if let Some(message) = req.message.as_deref() {
        if apply_command_message(message, req, payload) {
            return false;
        }
    }

    let mut flags = ApsFlags::default();
    process_data_keys(req, payload, &mut flags);

    let delete_alert = req.message.as_deref() == Some("delete_alert");
    if delete_alert {
        apply_delete_alert(payload);
    }

    {
        let aps = ensure_path(payload, &["apns", "payload", "aps"]);
        if flags.needs_category && !aps.contains_key("category") {
            let _ = aps.insert("category".to_string(), json!("DYNAMIC"));
        }
        if let Some(Value::String(category)) = aps.get("category") {
            let upper = category.to_uppercase();
            let _ = aps.insert("category".to_string(), json!(upper));
        }
        if flags.needs_mutable_content {
            let _ = aps.insert("mutableContent".to_string(), json!(true));
        }
    }

    !delete_alert
}

/// Silent control messages. Each clears the visible notification, replaces
/// the `aps` dictionary with a content-available one, and names the command
/// for the app. Returns true when `message` was consumed as a command.
fn apply_command_message(
    message: &str,
    req: &NotificationRequest,
    payload: &mut Map<String, Value>,
) -> bool {
    let command = match message {
        "request_location_update" | "request_location_updates" => "request_location_update",
        "clear_badge" => "clear_badge",
        "clear_notification" => "clear_notification",
        "update_complications" => "update_complications",
        "update_widgets" => "update_widgets",
        _ => return false,
    };

    let _ = payload.remove("notification");

    let mut aps = Map::new();
    let _ = aps.insert("contentAvailable".to_string(), json!(true));
    if command == "clear_badge" {
        let _ = aps.insert("badge".to_string(), json!(0));
    }
    let _ = ensure_path(payload, &["apns", "payload"])
        .insert("aps".to_string(), Value::Object(aps));

    {
        let homeassistant = ensure_path(payload, &["apns", "payload", "homeassistant"]);
        let _ = homeassistant.insert("command".to_string(), json!(command));
        if command == "clear_notification" {
            if let Some(tag) = data_object(req).and_then(|data| data.get("tag")) {
                let _ = homeassistant.insert("tag".to_string(), tag.clone());
            }
        }
    }

    if command == "clear_notification" {
        let collapse_id = ensure_path(payload, &["apns", "headers"]).remove("apns-collapse-id");
        if let Some(collapse_id) = collapse_id {
            let _ = ensure_path(payload, &["apns", "payload", "homeassistant"])
                .insert("collapseId".to_string(), collapse_id);
        }
    }

    true
}

fn process_data_keys(
    req: &NotificationRequest,
    payload: &mut Map<String, Value>,
    flags: &mut ApsFlags,
) {
    let Some(data) = data_object(req).cloned() else {
        return;
    };

    if let Some(subtitle) = data.get("subtitle") {
        let _ = ensure_path(payload, &["apns", "payload", "aps", "alert"])
            .insert("subtitle".to_string(), subtitle.clone());
    }

    // `push` overwrites individual `aps` keys; a shallow copy, never a deep
    // merge.
    if let Some(push) = data.get("push").and_then(Value::as_object) {
        let aps = ensure_path(payload, &["apns", "payload", "aps"]);
        for (key, value) in push {
            let _ = aps.insert(key.clone(), value.clone());
        }
    }

    if let Some(actions) = data.get("actions") {
        let _ = ensure_path(payload, &["apns", "payload"])
            .insert("actions".to_string(), actions.clone());
        flags.needs_category = true;
    }

    // Explicit `sound` wins over one merged in via `push`.
    let sound = data.get("sound").cloned().or_else(|| {
        ensure_path(payload, &["apns", "payload", "aps"])
            .get("sound")
            .cloned()
    });
    if let Some(sound) = sound {
        let sound = if req
            .registration_info
            .os_version
            .as_deref()
            .map(|os| os.starts_with("10.15"))
            .unwrap_or(false)
        {
            strip_sound_extension(sound)
        } else {
            sound
        };
        let _ = ensure_path(payload, &["apns", "payload", "aps"])
            .insert("sound".to_string(), sound);
    }

    if let Some(entity_id) = data.get("entity_id") {
        let _ = ensure_path(payload, &["apns", "payload"])
            .insert("entity_id".to_string(), entity_id.clone());
        flags.needs_category = true;
        flags.needs_mutable_content = true;
    }

    if let Some(action_data) = data.get("action_data") {
        let _ = ensure_path(payload, &["apns", "payload"])
            .insert("homeassistant".to_string(), action_data.clone());
        flags.needs_category = true;
    }

    apply_attachment(&data, payload, flags);

    for key in ["url", "shortcut", "presentation_options"] {
        if let Some(value) = data.get(key) {
            let _ = ensure_path(payload, &["apns", "payload"])
                .insert(key.to_string(), value.clone());
        }
    }

    if let Some(Value::String(tag)) = data.get("tag") {
        let _ = ensure_path(payload, &["apns", "headers"])
            .insert("apns-collapse-id".to_string(), json!(tag));
    }

    if let Some(Value::String(group)) = data.get("group") {
        let _ = ensure_path(payload, &["apns", "payload", "aps"])
            .insert("thread-id".to_string(), json!(group));
    }
}

/// `attachment` plus the `video`/`image`/`audio` shorthands. Shorthands fill
/// in `url` and `content-type` only when the explicit attachment left them
/// unset.
fn apply_attachment(
    data: &Map<String, Value>,
    payload: &mut Map<String, Value>,
    flags: &mut ApsFlags,
) {
    let mut attachment = match data.get("attachment") {
        Some(Value::Object(existing)) => Some(existing.clone()),
        Some(other) => {
            // Non-object attachments pass through untouched.
            let _ = ensure_path(payload, &["apns", "payload"])
                .insert("attachment".to_string(), other.clone());
            flags.needs_category = true;
            flags.needs_mutable_content = true;
            return;
        }
        None => None,
    };

    for (key, content_type) in ATTACHMENT_SHORTHANDS {
        if let Some(Value::String(url)) = data.get(key) {
            let attachment = attachment.get_or_insert_with(Map::new);
            if !attachment.contains_key("url") {
                let _ = attachment.insert("url".to_string(), json!(url));
            }
            if !attachment.contains_key("content-type") {
                let _ = attachment.insert("content-type".to_string(), json!(content_type));
            }
        }
    }

    if let Some(attachment) = attachment {
        let _ = ensure_path(payload, &["apns", "payload"])
            .insert("attachment".to_string(), Value::Object(attachment));
        flags.needs_category = true;
        flags.needs_mutable_content = true;
    }
}

/// `delete_alert` keeps the payload shape but strips everything that would
/// render: the alert text and the sound.
fn apply_delete_alert(payload: &mut Map<String, Value>) {
    if let Some(Value::Object(notification)) = payload.get_mut("notification") {
        let _ = notification.remove("body");
    }
    let aps = ensure_path(payload, &["apns", "payload", "aps"]);
    if let Some(Value::Object(alert)) = aps.get_mut("alert") {
        let _ = alert.remove("title");
        let _ = alert.remove("subtitle");
        let _ = alert.remove("body");
    }
    let _ = aps.remove("sound");
}

/// Cross-field invariants that hold for every payload carrying an `aps`
/// dictionary: sound normalization, badge coercion, and the push-type
/// header. Returns true when the sound is a critical alert with audible
/// volume, which exempts the request from rate-limit accounting.
pub(crate) fn finalize_aps(payload: &mut Map<String, Value>) -> bool {
    let mut critical_alert = false;
    let background;

    {
        let aps = ensure_path(payload, &["apns", "payload", "aps"]);

        let remove_sound = matches!(
            aps.get("sound"),
            Some(Value::String(name)) if name.eq_ignore_ascii_case("none")
        );
        if remove_sound {
            let _ = aps.remove("sound");
        } else if let Some(Value::Object(sound)) = aps.get_mut("sound") {
            if let Some(volume) = sound.get("volume").and_then(coerce_to_f64) {
                let _ = sound.insert("volume".to_string(), json!(volume));
            }
            if let Some(critical) = sound.get("critical").and_then(coerce_to_i64) {
                let _ = sound.insert("critical".to_string(), json!(critical));
            }
            let critical = sound.get("critical").and_then(Value::as_i64).unwrap_or(0);
            let volume = sound.get("volume").and_then(Value::as_f64).unwrap_or(0.0);
            if critical != 0 && volume > 0.0 {
                critical_alert = true;
            }
        }

        if let Some(badge) = aps.get("badge").and_then(coerce_to_number) {
            let _ = aps.insert("badge".to_string(), badge);
        }

        background = aps.get("contentAvailable").map(is_truthy).unwrap_or(false);
    }

    let push_type = if background { "background" } else { "alert" };
    let _ = ensure_path(payload, &["apns", "headers"])
        .insert("apns-push-type".to_string(), json!(push_type));

    critical_alert
}

pub(crate) fn apply_encryption(req: &NotificationRequest, payload: &mut Map<String, Value>) {
    let Some(data) = data_object(req) else { return };
    if !data.get("encrypted").map(is_truthy).unwrap_or(false) {
        return;
    }

    {
        let out = ensure_object(payload, "data");
        let _ = out.insert("encrypted".to_string(), json!("true"));
        if let Some(encrypted_data) = data.get("encrypted_data") {
            let _ = out.insert("encrypted_data".to_string(), encrypted_data.clone());
        }
    }
    set_analytics_label(payload, ENCRYPTED_ANALYTICS_LABEL);
}

fn strip_sound_extension(sound: Value) -> Value {
    fn strip(name: &str) -> String {
        name.rsplit_once('.')
            .map(|(stem, _)| stem.to_string())
            .unwrap_or_else(|| name.to_string())
    }

    match sound {
        Value::String(name) => json!(strip(&name)),
        Value::Object(mut sound) => {
            let stripped = match sound.get("name") {
                Some(Value::String(name)) => Some(strip(name)),
                _ => None,
            };
            if let Some(name) = stripped {
                let _ = sound.insert("name".to_string(), json!(name));
            }
            Value::Object(sound)
        }
        other => other,
    }
}
