/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use crate::call_external_api;
use crate::tools::prometheus::CALL_EXTERNAL_API;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Upstream send failure. `code` carries the gateway's error code when one
/// could be extracted; the classifier decides what it means.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct GatewayError {
    pub code: Option<String>,
    pub message: String,
}

/// The upstream push gateway: `send(message) -> message id`. The orchestrator
/// only ever talks to this trait.
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send(&self, message: &Map<String, Value>) -> std::result::Result<String, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct FcmSendResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct FcmErrorBody {
    error: Option<FcmErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct FcmErrorDetail {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Vec<Value>,
}

/// FCM HTTP v1 client. One process-wide reqwest client; every call is bounded
/// by the request deadline.
pub struct FcmClient {
    client: Client,
    endpoint: Url,
    auth_token: Option<String>,
}

impl FcmClient {
    pub fn new(api_url: &str, project_id: &str, auth_token: Option<String>) -> Result<Self> {
        let endpoint = Url::parse(api_url)
            .and_then(|url| {
                url.join(&format!("v1/projects/{project_id}/messages:send"))
            })
            .with_context(|| format!("Invalid FCM endpoint {api_url}"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build FCM HTTP client")?;

        Ok(FcmClient {
            client,
            endpoint,
            auth_token,
        })
    }

    /// FCM v1 surfaces a machine error code in `error.details[].errorCode`;
    /// fall back to the gRPC status. Codes are normalized to the lowercase
    /// dashed form the classifier matches on.
    fn extract_error_code(body: &FcmErrorBody) -> Option<String> {
        let detail = body.error.as_ref()?;
        let from_details = detail.details.iter().find_map(|entry| {
            entry
                .get("errorCode")
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        let raw = from_details.or_else(|| detail.status.clone())?;
        Some(match raw.as_str() {
            "UNREGISTERED" | "NOT_FOUND" => "registration-token-not-registered".to_string(),
            other => other.to_lowercase().replace('_', "-"),
        })
    }
}

#[async_trait]
impl PushGateway for FcmClient {
    async fn send(&self, message: &Map<String, Value>) -> std::result::Result<String, GatewayError> {
        let start_time = std::time::Instant::now();

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({ "message": message }));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await;

        let host = self.endpoint.host_str().unwrap_or("").to_string();
        let status = match resp.as_ref() {
            Ok(resp) => resp.status().as_str().to_string(),
            Err(err) => err
                .status()
                .map(|status| status.to_string())
                .unwrap_or("UNKNOWN".to_string()),
        };
        call_external_api!("POST", host.as_str(), "messages:send", status.as_str(), start_time);

        let resp = resp.map_err(|err| GatewayError {
            code: None,
            message: err.to_string(),
        })?;

        if resp.status().is_success() {
            let body: FcmSendResponse = resp.json().await.map_err(|err| GatewayError {
                code: None,
                message: format!("Failed to decode FCM response: {err}"),
            })?;
            info!(tag = "[OUTGOING API]", message_id = %body.name, latency = format!("{:?}ms", start_time.elapsed().as_millis()));
            Ok(body.name)
        } else {
            let http_status = resp.status();
            let body: FcmErrorBody = resp.json().await.unwrap_or(FcmErrorBody { error: None });
            let code = Self::extract_error_code(&body);
            let message = body
                .error
                .as_ref()
                .and_then(|detail| detail.message.clone())
                .unwrap_or_else(|| format!("FCM send failed with HTTP {http_status}"));
            error!(tag = "[OUTGOING API - ERROR]", code = code.as_deref().unwrap_or(""), error = %message, latency = format!("{:?}ms", start_time.elapsed().as_millis()));
            Err(GatewayError { code, message })
        }
    }
}
