/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ATTEMPTS_FIELD: &str = "attemptsCount";
pub const DELIVERED_FIELD: &str = "deliveredCount";
pub const ERROR_FIELD: &str = "errorCount";
pub const TOTAL_FIELD: &str = "totalCount";

/// One record per `(token, UTC calendar day)`. Counters only ever grow within
/// a day; the whole record lapses at the next UTC midnight.
#[derive(Deserialize, Serialize, Clone, Debug, Eq, PartialEq)]
pub struct RateLimitRecord {
    pub attempts_count: u32,
    pub delivered_count: u32,
    pub error_count: u32,
    pub total_count: u32,
    pub expires_at: DateTime<Utc>,
}

impl RateLimitRecord {
    pub fn empty(expires_at: DateTime<Utc>) -> Self {
        RateLimitRecord {
            attempts_count: 0,
            delivered_count: 0,
            error_count: 0,
            total_count: 0,
            expires_at,
        }
    }
}

/// Storage contract for per-token daily counters. Implementations must make
/// each mutating operation linearizable with respect to other mutations on
/// the same `(token, day)`; unrelated tokens never interfere.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Current record for the token today, or a zero-valued record if absent.
    /// Never mutates.
    async fn read(&self, token: &str) -> Result<RateLimitRecord>;

    /// Create-if-absent, bump `attemptsCount` by 1, refresh the expiry, and
    /// return the post-state.
    async fn increment_attempt(&self, token: &str) -> Result<RateLimitRecord>;

    /// Bump `deliveredCount` and `totalCount` by 1 each; return the
    /// post-state.
    async fn record_success(&self, token: &str) -> Result<RateLimitRecord>;

    /// Bump `errorCount` and `totalCount` by 1 each; return the post-state.
    async fn record_error(&self, token: &str) -> Result<RateLimitRecord>;
}
