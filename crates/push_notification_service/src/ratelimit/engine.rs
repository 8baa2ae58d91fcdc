/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use crate::common::types::{RateLimitStatus, RateLimits};
use crate::common::utils::next_local_midnight;
use crate::ratelimit::store::{RateLimitRecord, RateLimitStore};
use anyhow::Result;
use chrono::Local;

/// Stateless per-request view over the store, bound to one token and the
/// configured daily maximum. The strict equality in
/// `should_send_rate_limit_notification` is the edge trigger that makes the
/// "you are now rate limited" push fire exactly once per threshold crossing,
/// relying on the store linearizing `deliveredCount` increments.
pub struct RateLimiter<'a> {
    store: &'a dyn RateLimitStore,
    maximum: u32,
    token: &'a str,
}

impl<'a> RateLimiter<'a> {
    pub fn new(store: &'a dyn RateLimitStore, maximum: u32, token: &'a str) -> Self {
        RateLimiter {
            store,
            maximum,
            token,
        }
    }

    /// Read-only status; two consecutive calls observe identical records.
    pub async fn check(&self) -> Result<RateLimitStatus> {
        let record = self.store.read(self.token).await?;
        Ok(self.status(&record))
    }

    pub async fn record_attempt(&self) -> Result<RateLimitStatus> {
        let record = self.store.increment_attempt(self.token).await?;
        Ok(self.status(&record))
    }

    pub async fn record_success(&self) -> Result<RateLimits> {
        let record = self.store.record_success(self.token).await?;
        Ok(self.limits(&record))
    }

    pub async fn record_error(&self) -> Result<RateLimits> {
        let record = self.store.record_error(self.token).await?;
        Ok(self.limits(&record))
    }

    fn status(&self, record: &RateLimitRecord) -> RateLimitStatus {
        RateLimitStatus {
            is_rate_limited: record.delivered_count >= self.maximum,
            should_send_rate_limit_notification: record.delivered_count == self.maximum,
            rate_limits: self.limits(record),
        }
    }

    fn limits(&self, record: &RateLimitRecord) -> RateLimits {
        RateLimits {
            attempts: record.attempts_count,
            successful: record.delivered_count,
            errors: record.error_count,
            total: record.total_count,
            maximum: self.maximum,
            remaining: self.maximum.saturating_sub(record.delivered_count),
            resets_at: next_local_midnight(Local::now()),
        }
    }
}
