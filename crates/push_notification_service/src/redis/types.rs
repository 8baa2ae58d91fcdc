/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use anyhow::Result;
use fred::{
    clients::RedisPool,
    interfaces::ClientLike,
    types::{Builder, ReconnectPolicy, RedisConfig, ServerConfig},
};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    #[serde(default = "RedisSettings::default_pool_size")]
    pub pool_size: usize,
}

impl RedisSettings {
    pub fn new(host: String, port: u16) -> Self {
        RedisSettings {
            host,
            port,
            pool_size: Self::default_pool_size(),
        }
    }

    fn default_pool_size() -> usize {
        5
    }
}

pub struct RedisConnectionPool {
    pub pool: RedisPool,
}

impl RedisConnectionPool {
    /// Connects eagerly; reconnects forever with exponential backoff capped
    /// at 2 seconds per attempt.
    pub async fn new(settings: RedisSettings) -> Result<Self> {
        let config = RedisConfig {
            server: ServerConfig::new_centralized(settings.host.as_str(), settings.port),
            ..RedisConfig::default()
        };

        let pool = Builder::from_config(config)
            .set_policy(ReconnectPolicy::new_exponential(0, 100, 2_000, 2))
            .build_pool(settings.pool_size)?;
        pool.init().await?;

        Ok(RedisConnectionPool { pool })
    }
}
