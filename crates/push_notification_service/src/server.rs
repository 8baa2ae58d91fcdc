/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use crate::{
    action::notification::{
        check_rate_limits, health, send_android_v1, send_ios_v1, send_legacy,
    },
    environment::{AppConfig, AppState},
    tools::{logger::setup_tracing, prometheus::prometheus_metrics},
};
use actix_web::{web, App, HttpServer};
use anyhow::{anyhow, Result};
use std::net::Ipv4Addr;
use tokio::signal::unix::{signal, SignalKind};
use tracing::*;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    let _ = cfg
        .route("/sendPushNotification", web::post().to(send_legacy))
        .route("/androidV1", web::post().to(send_android_v1))
        .route("/iOSV1", web::post().to(send_ios_v1))
        .route("/checkRateLimits", web::post().to(check_rate_limits))
        .route("/health", web::get().to(health));
}

pub async fn run_server() -> Result<()> {
    let config = AppConfig::from_env();
    let _guard = setup_tracing(config.debug);

    std::panic::set_hook(Box::new(|panic_info| {
        error!("Panic Occured : {:?}", panic_info);
    }));

    let app_state = AppState::new(&config).await?;
    info!(
        port = config.port,
        region = %config.region,
        max_notifications_per_day = config.max_notifications_per_day,
        backend = if config.valkey.is_some() { "valkey" } else { "document" },
        "Starting push notification service"
    );

    let prometheus = prometheus_metrics();
    let data = web::Data::new(app_state);
    let http_server = HttpServer::new(move || {
        App::new()
            .wrap(prometheus.clone())
            .app_data(data.clone())
            .configure(configure_routes)
    })
    .bind((Ipv4Addr::UNSPECIFIED, config.port))?
    .shutdown_timeout(60)
    .run();

    let server_handle = http_server.handle();
    let server = tokio::spawn(http_server);

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        res = server => {
            Err(anyhow!("[HTTP_SERVER] : {:?}", res))
        }
        _ = sigterm.recv() => {
            error!("[GRACEFUL_TERMINATION] : SIGTERM received, draining");
            server_handle.stop(true).await;
            Ok(())
        }
        _ = sigint.recv() => {
            error!("[GRACEFUL_TERMINATION] : SIGINT received, draining");
            server_handle.stop(true).await;
            Ok(())
        }
    }
}
