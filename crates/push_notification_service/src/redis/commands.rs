/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use crate::redis::types::RedisConnectionPool;
use anyhow::{anyhow, Result};
use fred::{
    interfaces::{HashesInterface, KeysInterface, TransactionInterface},
    types::RedisValue,
};
use std::collections::HashMap;

impl RedisConnectionPool {
    pub async fn hgetall_u64(&self, key: &str) -> Result<HashMap<String, u64>> {
        let values: HashMap<String, u64> = self.pool.hgetall(key).await?;
        Ok(values)
    }

    /// Increment each listed hash field by 1, refresh the key TTL, and read
    /// the post-state back, all inside a single MULTI/EXEC transaction. The
    /// atomicity is what keeps threshold triggers derived from the returned
    /// counters exact under concurrent writers.
    pub async fn hash_incr_with_expiry(
        &self,
        key: &str,
        fields: &[&str],
        expiry_seconds: i64,
    ) -> Result<HashMap<String, u64>> {
        let trx = self.pool.next().multi();
        for field in fields {
            let _: () = trx.hincrby(key, *field, 1).await?;
        }
        let _: () = trx.expire(key, expiry_seconds).await?;
        let _: () = trx.hgetall(key).await?;

        let results: Vec<RedisValue> = trx.exec(true).await?;
        let post_state = results
            .into_iter()
            .last()
            .ok_or_else(|| anyhow!("Empty EXEC reply for key {key}"))?;

        Ok(post_state.convert()?)
    }

    pub async fn delete_key(&self, key: &str) -> Result<()> {
        let _: () = self.pool.del(key).await?;
        Ok(())
    }
}
