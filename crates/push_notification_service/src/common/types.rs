/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Registration descriptor posted by a client application alongside every
/// notification request. `app_id` gates the Home Assistant specific branches
/// of the payload transformer.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct RegistrationInfo {
    #[serde(default)]
    pub app_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_id: Option<String>,
}

impl RegistrationInfo {
    pub fn is_home_assistant_ios(&self) -> bool {
        self.app_id.contains("io.robbie.HomeAssistant")
    }

    pub fn is_home_assistant_android(&self) -> bool {
        self.app_id == "io.homeassistant.companion.android"
    }
}

/// Generic notification request. Every field except the token is optional;
/// `data` is a free-form tree whose recognized keys are interpreted per
/// transformer variant and whose unknown keys pass through untouched.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct NotificationRequest {
    #[serde(default)]
    pub push_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub registration_info: RegistrationInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct CheckRateLimitsRequest {
    #[serde(default)]
    pub push_token: Option<String>,
}

/// Per-token quota summary surfaced in every response that touches the rate
/// limiter.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimits {
    pub attempts: u32,
    pub successful: u32,
    pub errors: u32,
    pub total: u32,
    pub maximum: u32,
    pub remaining: u32,
    pub resets_at: DateTime<Local>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RateLimitStatus {
    pub is_rate_limited: bool,
    pub should_send_rate_limit_notification: bool,
    pub rate_limits: RateLimits,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SendSuccessResponse {
    pub message_id: String,
    pub sent_payload: Map<String, Value>,
    pub target: String,
    pub rate_limits: RateLimits,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CheckRateLimitsResponse {
    pub target: String,
    pub rate_limits: RateLimits,
}
