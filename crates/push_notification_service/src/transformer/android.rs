/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use super::{
    data_object, ensure_object, seed_payload, set_analytics_label, stringify, BuiltPayload,
    Variant,
};
use crate::common::types::NotificationRequest;
use serde_json::{json, Map, Value};

/// Notification keys the Android companion app reads out of `data`. Present
/// keys are stringified verbatim; everything else in `data` is left to the
/// explicit handling around this list.
const NOTIFICATION_KEYS: [&str; 64] = [
    "icon",
    "color",
    "sound",
    "tag",
    "channel",
    "ticker",
    "sticky",
    "eventTime",
    "localOnly",
    "notificationPriority",
    "defaultSound",
    "defaultVibrateTimings",
    "defaultLightSettings",
    "vibrateTimings",
    "visibility",
    "notificationCount",
    "lightSettings",
    "image",
    "timeout",
    "importance",
    "subject",
    "group",
    "icon_url",
    "ledColor",
    "vibrationPattern",
    "persistent",
    "chronometer",
    "when",
    "alert_once",
    "intent_class_name",
    "notification_icon",
    "ble_advertise",
    "ble_transmit",
    "video",
    "high_accuracy_update_interval",
    "package_name",
    "tts_text",
    "media_stream",
    "command",
    "intent_package_name",
    "intent_action",
    "intent_extras",
    "media_command",
    "media_package_name",
    "intent_uri",
    "intent_type",
    "ble_uuid",
    "ble_major",
    "ble_minor",
    "confirmation",
    "app_lock_enabled",
    "app_lock_timeout",
    "home_bypass_enabled",
    "car_ui",
    "ble_measured_power",
    "progress",
    "progress_max",
    "progress_indeterminate",
    "bodyLocKey",
    "bodyLocArgs",
    "titleLocKey",
    "titleLocArgs",
    "clickAction",
    "when_relative",
];

/// Message values the Android app interprets as device commands rather than
/// something to render; commands bypass rate-limit accounting.
const COMMAND_MESSAGES: [&str; 22] = [
    "request_location_update",
    "clear_notification",
    "remove_channel",
    "command_dnd",
    "command_ringer_mode",
    "command_broadcast_intent",
    "command_volume_level",
    "command_screen_on",
    "command_bluetooth",
    "command_high_accuracy_mode",
    "command_activity",
    "command_app_lock",
    "command_webview",
    "command_media",
    "command_update_sensors",
    "command_ble_transmitter",
    "command_persistent_connection",
    "command_stop_tts",
    "command_auto_screen_brightness",
    "command_screen_brightness_level",
    "command_screen_off_timeout",
    "command_flashlight",
];

pub fn build(req: &NotificationRequest) -> BuiltPayload {
    let mut payload = seed_payload(req, &[]);
    set_analytics_label(&mut payload, Variant::AndroidV1.analytics_label());

    if let Some(data) = data_object(req).cloned() {
        flatten_actions(&data, &mut payload);

        {
            let out = ensure_object(&mut payload, "data");
            for key in NOTIFICATION_KEYS {
                if let Some(value) = data.get(key) {
                    let _ = out.insert(key.to_string(), json!(stringify(value)));
                }
            }
        }

        // Delivery tuning lives on the `android` block, not in `data`.
        {
            let android = ensure_object(&mut payload, "android");
            if let Some(ttl) = data.get("ttl") {
                let _ = android.insert("ttl".to_string(), ttl.clone());
            }
            if let Some(priority) = data.get("priority") {
                let _ = android.insert("priority".to_string(), priority.clone());
            }
        }
    }

    {
        let out = ensure_object(&mut payload, "data");
        if let Some(message) = &req.message {
            let _ = out.insert("message".to_string(), json!(message));
        }
        if let Some(title) = &req.title {
            let _ = out.insert("title".to_string(), json!(title));
        }
        if let Some(webhook_id) = &req.registration_info.webhook_id {
            let _ = out.insert("webhook_id".to_string(), json!(webhook_id));
        }
    }

    let update_rate_limits = !req
        .message
        .as_deref()
        .map(|message| COMMAND_MESSAGES.contains(&message))
        .unwrap_or(false);

    BuiltPayload {
        update_rate_limits,
        message: payload,
    }
}

/// `data.actions[]` is flattened into indexed scalar keys: the app reads
/// `action_1_key`, `action_1_title`, and so on, 1-based.
fn flatten_actions(data: &Map<String, Value>, payload: &mut Map<String, Value>) {
    let Some(actions) = data.get("actions").and_then(Value::as_array) else {
        return;
    };

    let out = ensure_object(payload, "data");
    for (index, action) in actions.iter().enumerate() {
        let Some(action) = action.as_object() else {
            continue;
        };
        let position = index + 1;
        for field in ["key", "title", "uri", "behavior"] {
            if let Some(value) = action.get(field) {
                let _ = out.insert(
                    format!("action_{position}_{field}"),
                    json!(stringify(value)),
                );
            }
        }
    }
}
