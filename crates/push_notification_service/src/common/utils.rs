/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use chrono::{DateTime, Days, Duration, Local, NaiveTime, TimeZone, Utc};

/// UTC calendar-day bucket used as part of every rate-limit key, e.g. `20240131`.
pub fn utc_day_bucket(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d").to_string()
}

pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let next_day = now.date_naive() + Days::new(1);
    Utc.from_utc_datetime(&next_day.and_time(NaiveTime::MIN))
}

/// TTL for the cluster KV backend. Rounded up so a key never outlives its day
/// bucket by more than the rounding second; never less than 1.
pub fn seconds_until_utc_midnight(now: DateTime<Utc>) -> i64 {
    let remaining = next_utc_midnight(now) - now;
    let millis = remaining.num_milliseconds();
    ((millis + 999) / 1000).max(1)
}

/// The quota reset moment surfaced to clients: midnight of (local date + 1)
/// in the process's local zone. The day bucket above is UTC; on a UTC-deployed
/// process the two coincide.
pub fn next_local_midnight(now: DateTime<Local>) -> DateTime<Local> {
    let next_day = now.date_naive() + Days::new(1);
    Local
        .from_local_datetime(&next_day.and_time(NaiveTime::MIN))
        .earliest()
        .unwrap_or_else(|| now + Duration::days(1))
}
