/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use super::{ensure_path, ios, seed_payload, set_analytics_label, BuiltPayload, Variant};
use crate::common::types::NotificationRequest;
use serde_json::json;

/// The original catch-all endpoint: every platform subtree passes through,
/// and requests from the old Home Assistant iOS app get the same quirk
/// handling as the iOS v1 variant.
pub fn build(req: &NotificationRequest) -> BuiltPayload {
    let mut payload = seed_payload(req, &["android", "apns", "data", "webpush"]);
    set_analytics_label(&mut payload, Variant::Legacy.analytics_label());

    if let Some(webhook_id) = &req.registration_info.webhook_id {
        let _ = ensure_path(&mut payload, &["apns", "payload"])
            .insert("webhook_id".to_string(), json!(webhook_id));
    }

    let mut update_rate_limits = true;
    if req.registration_info.is_home_assistant_ios() {
        update_rate_limits = ios::apply_home_assistant(req, &mut payload);
    }
    if ios::finalize_aps(&mut payload) {
        update_rate_limits = false;
    }

    BuiltPayload {
        update_rate_limits,
        message: payload,
    }
}
