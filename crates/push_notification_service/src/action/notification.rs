/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use crate::common::types::{
    CheckRateLimitsRequest, CheckRateLimitsResponse, NotificationRequest, SendSuccessResponse,
};
use crate::environment::AppState;
use crate::ratelimit::engine::RateLimiter;
use crate::tools::error::{classify_send_error, store_error, AppError, ErrorStep};
use crate::tools::logger::report_structured_error;
use crate::tools::prometheus::{
    DELIVERED_NOTIFICATIONS, FAILED_NOTIFICATIONS, RATE_LIMITED_REQUESTS, RATE_LIMIT_WARNINGS,
    TOTAL_NOTIFICATIONS,
};
use crate::transformer::{self, Variant};
use actix_web::{web, HttpResponse};
use chrono::{DateTime, Local};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

pub async fn send_legacy(
    state: web::Data<AppState>,
    body: web::Json<NotificationRequest>,
) -> Result<HttpResponse, AppError> {
    handle_send(&state, Variant::Legacy, body.into_inner()).await
}

pub async fn send_android_v1(
    state: web::Data<AppState>,
    body: web::Json<NotificationRequest>,
) -> Result<HttpResponse, AppError> {
    handle_send(&state, Variant::AndroidV1, body.into_inner()).await
}

pub async fn send_ios_v1(
    state: web::Data<AppState>,
    body: web::Json<NotificationRequest>,
) -> Result<HttpResponse, AppError> {
    handle_send(&state, Variant::IosV1, body.into_inner()).await
}

pub async fn check_rate_limits(
    state: web::Data<AppState>,
    body: web::Json<CheckRateLimitsRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let token = validate_token(body.push_token.as_deref())?;

    let limiter = RateLimiter::new(
        state.store.as_ref(),
        state.max_notifications_per_day,
        token,
    );
    let status = limiter.check().await.map_err(|err| {
        let request = NotificationRequest {
            push_token: Some(token.to_string()),
            ..NotificationRequest::default()
        };
        fail(&state, &request, None, store_error(ErrorStep::GetRateLimitDoc, err))
    })?;

    Ok(HttpResponse::Ok().json(CheckRateLimitsResponse {
        target: token.to_string(),
        rate_limits: status.rate_limits,
    }))
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// The per-request state machine: validate, transform, admit, send, account,
/// respond. Exactly one response comes out of every path.
async fn handle_send(
    state: &AppState,
    variant: Variant,
    req: NotificationRequest,
) -> Result<HttpResponse, AppError> {
    let token = validate_token(req.push_token.as_deref())?.to_string();

    let built = transformer::build(variant, &req);
    TOTAL_NOTIFICATIONS
        .with_label_values(&[variant.analytics_label()])
        .inc();

    let limiter = RateLimiter::new(
        state.store.as_ref(),
        state.max_notifications_per_day,
        &token,
    );

    // Admission. The pre-attempt status also serves as the reported quota for
    // requests that do not update rate limits.
    let status = limiter.check().await.map_err(|err| {
        fail(state, &req, None, store_error(ErrorStep::GetRateLimitDoc, err))
    })?;

    let status = if built.update_rate_limits {
        let status = limiter.record_attempt().await.map_err(|err| {
            fail(
                state,
                &req,
                None,
                store_error(ErrorStep::CreateRateLimitDocument, err),
            )
        })?;
        if status.is_rate_limited {
            RATE_LIMITED_REQUESTS.inc();
            info!(target_token = %token, "Rejecting rate limited notification");
            return Err(AppError::RateLimited {
                message: format!(
                    "The daily limit of {} notifications has been reached for this device.",
                    state.max_notifications_per_day
                ),
                target: token,
                rate_limits: status.rate_limits,
            });
        }
        status
    } else {
        status
    };

    let mut message = built.message;
    let _ = message.insert("token".to_string(), json!(token));

    match state.gateway.send(&message).await {
        Ok(message_id) => {
            let rate_limits = if built.update_rate_limits {
                let limits = limiter.record_success().await.map_err(|err| {
                    fail(
                        state,
                        &req,
                        Some(&message),
                        store_error(ErrorStep::UpdateRateLimitDocument, err),
                    )
                })?;
                // Edge trigger: the delivery that lands exactly on the
                // maximum earns the one-shot "you are now rate limited"
                // push. Serialized success increments make this fire once
                // per (token, day).
                if limits.successful == limits.maximum {
                    send_rate_limit_warning(state, &req, &token, limits.resets_at).await;
                }
                limits
            } else {
                status.rate_limits
            };

            DELIVERED_NOTIFICATIONS
                .with_label_values(&[variant.analytics_label()])
                .inc();
            Ok(HttpResponse::Created().json(SendSuccessResponse {
                message_id,
                sent_payload: message,
                target: token,
                rate_limits,
            }))
        }
        Err(gateway_err) => {
            if built.update_rate_limits {
                let _ = limiter.record_error().await.map_err(|err| {
                    fail(
                        state,
                        &req,
                        Some(&message),
                        store_error(ErrorStep::UpdateRateLimitDocument, err),
                    )
                })?;
            }
            let classified = classify_send_error(
                ErrorStep::SendNotification,
                gateway_err.code,
                gateway_err.message,
            );
            let error_type = classified
                .kind()
                .map(|kind| kind.to_string())
                .unwrap_or_default();
            FAILED_NOTIFICATIONS
                .with_label_values(&[variant.analytics_label(), &error_type])
                .inc();
            Err(fail(state, &req, Some(&message), classified))
        }
    }
}

/// Best-effort one-shot sent at the moment the quota is exactly reached. A
/// failure here is reported and swallowed; the triggering request still
/// succeeds.
async fn send_rate_limit_warning(
    state: &AppState,
    req: &NotificationRequest,
    token: &str,
    resets_at: DateTime<Local>,
) {
    let mut message =
        transformer::rate_limit_notification(state.max_notifications_per_day, resets_at);
    let _ = message.insert("token".to_string(), json!(token));

    match state.gateway.send(&message).await {
        Ok(_) => {
            RATE_LIMIT_WARNINGS.inc();
            info!(target_token = %token, "Sent rate limit warning notification");
        }
        Err(err) => {
            let classified = classify_send_error(
                ErrorStep::SendRateLimitNotification,
                err.code,
                err.message,
            );
            warn!(target_token = %token, error = %classified, "Failed to send rate limit warning");
            let _ = fail(state, req, Some(&message), classified);
        }
    }
}

fn validate_token(token: Option<&str>) -> Result<&str, AppError> {
    let token = token
        .filter(|token| !token.is_empty())
        .ok_or(AppError::MissingToken)?;
    if !token.contains(':') {
        return Err(AppError::InvalidTokenFormat);
    }
    Ok(token)
}

/// Funnel for failure paths: internal errors go to the structured sink,
/// client-caused ones stay out of it. Returns the error for `?`-style use.
fn fail(
    state: &AppState,
    req: &NotificationRequest,
    sent_payload: Option<&Map<String, Value>>,
    err: AppError,
) -> AppError {
    if err.wants_structured_log() {
        if let Some(step) = err.step() {
            report_structured_error(&state.region, step, &err.to_string(), req, sent_payload);
        }
    }
    err
}
