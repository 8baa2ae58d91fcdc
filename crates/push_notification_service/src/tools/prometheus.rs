/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
#![allow(clippy::expect_used)]

use actix_web_prom::{PrometheusMetrics, PrometheusMetricsBuilder};
use prometheus::{
    opts, register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};

pub static TOTAL_NOTIFICATIONS: once_cell::sync::Lazy<IntCounterVec> =
    once_cell::sync::Lazy::new(|| {
        register_int_counter_vec!(
            opts!("total_notifications", "Total Notifications"),
            &["variant"]
        )
        .expect("Failed to register total notifications metrics")
    });

pub static DELIVERED_NOTIFICATIONS: once_cell::sync::Lazy<IntCounterVec> =
    once_cell::sync::Lazy::new(|| {
        register_int_counter_vec!(
            opts!("delivered_notifications", "Delivered Notifications"),
            &["variant"]
        )
        .expect("Failed to register delivered notifications metrics")
    });

pub static FAILED_NOTIFICATIONS: once_cell::sync::Lazy<IntCounterVec> =
    once_cell::sync::Lazy::new(|| {
        register_int_counter_vec!(
            opts!("failed_notifications", "Failed Notifications"),
            &["variant", "error_type"]
        )
        .expect("Failed to register failed notifications metrics")
    });

pub static RATE_LIMITED_REQUESTS: once_cell::sync::Lazy<IntCounter> =
    once_cell::sync::Lazy::new(|| {
        register_int_counter!("rate_limited_requests", "Rate Limited Requests")
            .expect("Failed to register rate limited requests metrics")
    });

pub static RATE_LIMIT_WARNINGS: once_cell::sync::Lazy<IntCounter> =
    once_cell::sync::Lazy::new(|| {
        register_int_counter!("rate_limit_warnings", "Rate Limit Warning Notifications")
            .expect("Failed to register rate limit warnings metrics")
    });

pub static CALL_EXTERNAL_API: once_cell::sync::Lazy<HistogramVec> =
    once_cell::sync::Lazy::new(|| {
        register_histogram_vec!(
            opts!("external_request_duration", "Call external API requests").into(),
            &["method", "host", "service", "status"]
        )
        .expect("Failed to register call external API metrics")
    });

#[macro_export]
macro_rules! call_external_api {
    ($method:expr, $host:expr, $path:expr, $status:expr, $start:expr) => {
        let duration = $start.elapsed().as_secs_f64();
        CALL_EXTERNAL_API
            .with_label_values(&[$method, $host, $path, $status])
            .observe(duration);
    };
}

/// Prometheus middleware plus the custom collectors above, scraped on
/// `/metrics`.
pub fn prometheus_metrics() -> PrometheusMetrics {
    let prometheus = PrometheusMetricsBuilder::new("api")
        .endpoint("/metrics")
        .buckets(&[
            0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0,
        ])
        .build()
        .expect("Failed to create Prometheus Metrics");

    prometheus
        .registry
        .register(Box::new(TOTAL_NOTIFICATIONS.to_owned()))
        .expect("Failed to register total notifications metrics");

    prometheus
        .registry
        .register(Box::new(DELIVERED_NOTIFICATIONS.to_owned()))
        .expect("Failed to register delivered notifications metrics");

    prometheus
        .registry
        .register(Box::new(FAILED_NOTIFICATIONS.to_owned()))
        .expect("Failed to register failed notifications metrics");

    prometheus
        .registry
        .register(Box::new(RATE_LIMITED_REQUESTS.to_owned()))
        .expect("Failed to register rate limited requests metrics");

    prometheus
        .registry
        .register(Box::new(RATE_LIMIT_WARNINGS.to_owned()))
        .expect("Failed to register rate limit warnings metrics");

    prometheus
        .registry
        .register(Box::new(CALL_EXTERNAL_API.to_owned()))
        .expect("Failed to register call external API metrics");

    prometheus
}
