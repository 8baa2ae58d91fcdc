/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use crate::outbound::fcm::{FcmClient, PushGateway};
use crate::ratelimit::document::DocumentStore;
use crate::ratelimit::store::RateLimitStore;
use crate::ratelimit::valkey::ValkeyStore;
use crate::redis::types::{RedisConnectionPool, RedisSettings};
use anyhow::Result;
use std::{env::var, str::FromStr, sync::Arc};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub max_notifications_per_day: u32,
    pub region: String,
    pub debug: bool,
    pub valkey: Option<RedisSettings>,
    pub document_store_path: String,
    pub fcm_api_url: String,
    pub fcm_project_id: String,
    pub fcm_auth_token: Option<String>,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// The whole configuration surface is environment variables; absent or
    /// unparsable values fall back to the defaults the fleet runs with. The
    /// cluster KV backend is selected by the presence of both VALKEY_HOST and
    /// VALKEY_PORT.
    pub fn from_env() -> AppConfig {
        let valkey = match (var("VALKEY_HOST"), var("VALKEY_PORT")) {
            (Ok(host), Ok(port)) => port.parse().ok().map(|port| RedisSettings::new(host, port)),
            _ => None,
        };

        AppConfig {
            port: env_or("PORT", 8080),
            max_notifications_per_day: env_or("MAX_NOTIFICATIONS_PER_DAY", 500),
            region: var("REGION")
                .map(|region| region.to_lowercase())
                .unwrap_or_else(|_| "us-central1".to_string()),
            debug: var("DEBUG").map(|value| value == "true").unwrap_or(false),
            valkey,
            document_store_path: var("DOCUMENT_STORE_PATH")
                .unwrap_or_else(|_| "./rate_limits.db".to_string()),
            fcm_api_url: var("FCM_API_URL")
                .unwrap_or_else(|_| "https://fcm.googleapis.com".to_string()),
            fcm_project_id: var("FCM_PROJECT_ID")
                .unwrap_or_else(|_| "home-assistant-mobile".to_string()),
            fcm_auth_token: var("FCM_AUTH_TOKEN").ok(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RateLimitStore>,
    pub gateway: Arc<dyn PushGateway>,
    pub max_notifications_per_day: u32,
    pub region: String,
}

impl AppState {
    pub async fn new(config: &AppConfig) -> Result<AppState> {
        let store: Arc<dyn RateLimitStore> = match &config.valkey {
            Some(settings) => {
                let redis = Arc::new(RedisConnectionPool::new(settings.clone()).await?);
                Arc::new(ValkeyStore::new(redis))
            }
            None => Arc::new(DocumentStore::open(&config.document_store_path)?),
        };

        let gateway: Arc<dyn PushGateway> = Arc::new(FcmClient::new(
            &config.fcm_api_url,
            &config.fcm_project_id,
            config.fcm_auth_token.clone(),
        )?);

        Ok(AppState {
            store,
            gateway,
            max_notifications_per_day: config.max_notifications_per_day,
            region: config.region.clone(),
        })
    }

    /// Assemble a state from preconstructed collaborators; the integration
    /// suite mounts the app this way with scripted stand-ins.
    pub fn with_parts(
        store: Arc<dyn RateLimitStore>,
        gateway: Arc<dyn PushGateway>,
        max_notifications_per_day: u32,
        region: String,
    ) -> AppState {
        AppState {
            store,
            gateway,
            max_notifications_per_day,
            region,
        }
    }
}
