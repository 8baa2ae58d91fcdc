/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use crate::common::utils::{next_utc_midnight, utc_day_bucket};
use crate::ratelimit::store::{RateLimitRecord, RateLimitStore};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

/// Durable document-style backend: one row per `(day, token)`, mutated under
/// immediate transactions so concurrent requests for the same token serialize
/// on the row. Rows from previous days are simply never addressed again and
/// are left behind as stale.
pub struct DocumentStore {
    pool: Pool<SqliteConnectionManager>,
}

#[derive(Debug, Clone, Copy)]
enum Mutation {
    Attempt,
    Success,
    Error,
}

#[derive(Debug)]
struct PragmaCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = 5000;\
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(())
    }
}

impl DocumentStore {
    pub fn open(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(8)
            .connection_timeout(std::time::Duration::from_secs(5))
            .connection_customizer(Box::new(PragmaCustomizer))
            .build(manager)
            .with_context(|| format!("Failed to open rate limit store at {path}"))?;

        let conn = pool.get()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS rate_limits (
                 day             TEXT    NOT NULL,
                 token           TEXT    NOT NULL,
                 attempts_count  INTEGER NOT NULL DEFAULT 0,
                 delivered_count INTEGER NOT NULL DEFAULT 0,
                 error_count     INTEGER NOT NULL DEFAULT 0,
                 total_count     INTEGER NOT NULL DEFAULT 0,
                 expires_at      TEXT    NOT NULL,
                 PRIMARY KEY (day, token)
             );",
        )?;
        drop(conn);

        Ok(DocumentStore { pool })
    }

    fn select(
        conn: &Connection,
        day: &str,
        token: &str,
    ) -> Result<Option<RateLimitRecord>> {
        let row = conn
            .query_row(
                "SELECT attempts_count, delivered_count, error_count, total_count, expires_at
                 FROM rate_limits WHERE day = ?1 AND token = ?2",
                params![day, token],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((attempts_count, delivered_count, error_count, total_count, expires_at)) => {
                let expires_at = DateTime::parse_from_rfc3339(&expires_at)
                    .map_err(|err| anyhow!("Corrupt expires_at in rate limit row: {err}"))?
                    .with_timezone(&Utc);
                Ok(Some(RateLimitRecord {
                    attempts_count,
                    delivered_count,
                    error_count,
                    total_count,
                    expires_at,
                }))
            }
            None => Ok(None),
        }
    }

    fn read_blocking(pool: &Pool<SqliteConnectionManager>, token: &str) -> Result<RateLimitRecord> {
        let now = Utc::now();
        let day = utc_day_bucket(now);
        let conn = pool.get()?;
        let record = Self::select(&conn, &day, token)?;
        Ok(record.unwrap_or_else(|| RateLimitRecord::empty(next_utc_midnight(now))))
    }

    fn mutate_blocking(
        pool: &Pool<SqliteConnectionManager>,
        token: &str,
        mutation: Mutation,
    ) -> Result<RateLimitRecord> {
        let now = Utc::now();
        let day = utc_day_bucket(now);
        let expires_at = next_utc_midnight(now).to_rfc3339();

        let mut conn = pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let _ = tx.execute(
            "INSERT INTO rate_limits (day, token, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (day, token) DO NOTHING",
            params![day, token, expires_at],
        )?;

        let _ = match mutation {
            Mutation::Attempt => tx.execute(
                "UPDATE rate_limits
                 SET attempts_count = attempts_count + 1, expires_at = ?3
                 WHERE day = ?1 AND token = ?2",
                params![day, token, expires_at],
            )?,
            Mutation::Success => tx.execute(
                "UPDATE rate_limits
                 SET delivered_count = delivered_count + 1, total_count = total_count + 1
                 WHERE day = ?1 AND token = ?2",
                params![day, token],
            )?,
            Mutation::Error => tx.execute(
                "UPDATE rate_limits
                 SET error_count = error_count + 1, total_count = total_count + 1
                 WHERE day = ?1 AND token = ?2",
                params![day, token],
            )?,
        };

        let record = Self::select(&tx, &day, token)?
            .ok_or_else(|| anyhow!("Rate limit row vanished mid-transaction for {token}"))?;
        tx.commit()?;

        Ok(record)
    }

    async fn run_blocking<F>(&self, op: F) -> Result<RateLimitRecord>
    where
        F: FnOnce(Pool<SqliteConnectionManager>) -> Result<RateLimitRecord> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || op(pool)).await?
    }
}

#[async_trait]
impl RateLimitStore for DocumentStore {
    async fn read(&self, token: &str) -> Result<RateLimitRecord> {
        let token = token.to_string();
        self.run_blocking(move |pool| Self::read_blocking(&pool, &token))
            .await
    }

    async fn increment_attempt(&self, token: &str) -> Result<RateLimitRecord> {
        let token = token.to_string();
        self.run_blocking(move |pool| Self::mutate_blocking(&pool, &token, Mutation::Attempt))
            .await
    }

    async fn record_success(&self, token: &str) -> Result<RateLimitRecord> {
        let token = token.to_string();
        self.run_blocking(move |pool| Self::mutate_blocking(&pool, &token, Mutation::Success))
            .await
    }

    async fn record_error(&self, token: &str) -> Result<RateLimitRecord> {
        let token = token.to_string();
        self.run_blocking(move |pool| Self::mutate_blocking(&pool, &token, Mutation::Error))
            .await
    }
}
