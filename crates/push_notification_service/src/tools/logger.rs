/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use crate::common::types::NotificationRequest;
use crate::tools::error::ErrorStep;
use serde_json::{Map, Value};
use tracing::error;

#[derive(Debug)]
pub struct TracingGuard {
    _log_guard: tracing_appender::non_blocking::WorkerGuard,
}

pub fn setup_tracing(debug: bool) -> TracingGuard {
    use tracing::Level;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    // Create logging layer with non-blocking stdout writer
    let (console_writer, guard) = tracing_appender::non_blocking(std::io::stdout());
    let logging_layer = fmt::layer().with_timer(fmt::time()).with_writer(console_writer);

    let default_level = if debug { Level::DEBUG } else { Level::INFO };

    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with(logging_layer)
        .init();

    TracingGuard { _log_guard: guard }
}

/// Emit a structured error entry for the external log sink. One event per
/// failed pipeline stage, named `errors-<step>`, carrying the request and the
/// payload that was (or would have been) sent.
pub fn report_structured_error(
    region: &str,
    step: ErrorStep,
    message: &str,
    request: &NotificationRequest,
    sent_payload: Option<&Map<String, Value>>,
) {
    let request_body = serde_json::to_string(request).unwrap_or_default();
    let notification = sent_payload
        .map(|payload| serde_json::to_string(payload).unwrap_or_default())
        .unwrap_or_default();

    error!(
        log_name = %format!("errors-{step}"),
        severity = "ERROR",
        resource_type = "global",
        region = %region,
        step = %step,
        request_body = %request_body,
        notification = %notification,
        app_id = %request.registration_info.app_id,
        app_version = request.registration_info.app_version.as_deref().unwrap_or(""),
        os_version = request.registration_info.os_version.as_deref().unwrap_or(""),
        "{message}"
    );
}
