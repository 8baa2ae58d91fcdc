/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use crate::common::utils::{next_utc_midnight, seconds_until_utc_midnight, utc_day_bucket};
use crate::ratelimit::store::{
    RateLimitRecord, RateLimitStore, ATTEMPTS_FIELD, DELIVERED_FIELD, ERROR_FIELD, TOTAL_FIELD,
};
use crate::redis::types::RedisConnectionPool;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

/// Cluster KV backend: the record is a hash at `rate_limit:<token>:<day>`,
/// mutated through one atomic HINCRBY/EXPIRE/HGETALL transaction. The TTL is
/// refreshed to the seconds left until UTC midnight on every mutation, which
/// is idempotent for a fixed day bucket.
pub struct ValkeyStore {
    redis: Arc<RedisConnectionPool>,
}

impl ValkeyStore {
    pub fn new(redis: Arc<RedisConnectionPool>) -> Self {
        ValkeyStore { redis }
    }

    fn key(token: &str) -> String {
        format!("rate_limit:{}:{}", token, utc_day_bucket(Utc::now()))
    }

    fn record_from_hash(values: HashMap<String, u64>) -> RateLimitRecord {
        let field = |name: &str| values.get(name).copied().unwrap_or(0) as u32;
        RateLimitRecord {
            attempts_count: field(ATTEMPTS_FIELD),
            delivered_count: field(DELIVERED_FIELD),
            error_count: field(ERROR_FIELD),
            total_count: field(TOTAL_FIELD),
            expires_at: next_utc_midnight(Utc::now()),
        }
    }

    async fn mutate(&self, token: &str, fields: &[&str]) -> Result<RateLimitRecord> {
        let values = self
            .redis
            .hash_incr_with_expiry(
                &Self::key(token),
                fields,
                seconds_until_utc_midnight(Utc::now()),
            )
            .await?;
        Ok(Self::record_from_hash(values))
    }
}

#[async_trait]
impl RateLimitStore for ValkeyStore {
    async fn read(&self, token: &str) -> Result<RateLimitRecord> {
        let values = self.redis.hgetall_u64(&Self::key(token)).await?;
        Ok(Self::record_from_hash(values))
    }

    async fn increment_attempt(&self, token: &str) -> Result<RateLimitRecord> {
        self.mutate(token, &[ATTEMPTS_FIELD]).await
    }

    async fn record_success(&self, token: &str) -> Result<RateLimitRecord> {
        self.mutate(token, &[DELIVERED_FIELD, TOTAL_FIELD]).await
    }

    async fn record_error(&self, token: &str) -> Result<RateLimitRecord> {
        self.mutate(token, &[ERROR_FIELD, TOTAL_FIELD]).await
    }
}
