/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/

use crate::common::types::RateLimits;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use strum_macros::Display;
use thiserror::Error;

/// Pipeline stage tags attached to classified errors and to structured error
/// log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "camelCase")]
pub enum ErrorStep {
    GetRateLimitDoc,
    SendNotification,
    SendRateLimitNotification,
    CreateRateLimitDocument,
    UpdateRateLimitDocument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ErrorKind {
    InvalidToken,
    PayloadTooLarge,
    InternalError,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("You did not send a token!")]
    MissingToken,
    #[error("That is not a valid FCM token")]
    InvalidTokenFormat,
    #[error("{message}")]
    RateLimited {
        message: String,
        target: String,
        rate_limits: RateLimits,
    },
    #[error("{message}")]
    Classified {
        kind: ErrorKind,
        code: Option<String>,
        step: ErrorStep,
        message: String,
    },
}

const INVALID_TOKEN_CODES: [&str; 2] = [
    "invalid-registration-token",
    "registration-token-not-registered",
];
const PAYLOAD_TOO_LARGE_CODES: [&str; 2] = ["invalid-argument", "payload-too-large"];

/// Classify an upstream send failure. Error codes may arrive with the legacy
/// `messaging/` prefix; it is stripped before matching and before surfacing
/// the code to the client.
pub fn classify_send_error(step: ErrorStep, code: Option<String>, message: String) -> AppError {
    let code = code.map(|c| c.trim_start_matches("messaging/").to_string());
    let lowered = message.to_lowercase();
    let kind = match code.as_deref() {
        Some(c) if INVALID_TOKEN_CODES.contains(&c) => ErrorKind::InvalidToken,
        Some(c) if PAYLOAD_TOO_LARGE_CODES.contains(&c) => ErrorKind::PayloadTooLarge,
        _ if lowered.contains("message is too big") || lowered.contains("payload too large") => {
            ErrorKind::PayloadTooLarge
        }
        _ => ErrorKind::InternalError,
    };
    AppError::Classified {
        kind,
        code,
        step,
        message,
    }
}

/// Wrap a rate-limit store failure. Always `InternalError`; the step pins the
/// stage that touched the store.
pub fn store_error(step: ErrorStep, err: anyhow::Error) -> AppError {
    AppError::Classified {
        kind: ErrorKind::InternalError,
        code: None,
        step,
        message: format!("{err:#}"),
    }
}

impl AppError {
    /// Client-caused send failures are noisy and are kept out of the
    /// structured error sink; everything else is reported.
    pub fn wants_structured_log(&self) -> bool {
        matches!(
            self,
            AppError::Classified {
                kind: ErrorKind::InternalError,
                ..
            }
        )
    }

    pub fn step(&self) -> Option<ErrorStep> {
        match self {
            AppError::Classified { step, .. } => Some(*step),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AppError::Classified { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingToken | AppError::InvalidTokenFormat => StatusCode::FORBIDDEN,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Classified { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::MissingToken | AppError::InvalidTokenFormat => {
                json!({ "errorMessage": self.to_string() })
            }
            AppError::RateLimited {
                message,
                target,
                rate_limits,
            } => json!({
                "errorType": "RateLimited",
                "message": message,
                "target": target,
                "rateLimits": rate_limits,
            }),
            AppError::Classified {
                kind,
                code,
                step,
                message,
            } => {
                let mut body = json!({
                    "errorType": kind.to_string(),
                    "errorStep": step.to_string(),
                    "message": message,
                });
                if let (Some(obj), Some(code)) = (body.as_object_mut(), code) {
                    obj.insert("errorCode".to_string(), json!(code));
                }
                body
            }
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_names_are_wire_format() {
        assert_eq!(ErrorStep::GetRateLimitDoc.to_string(), "getRateLimitDoc");
        assert_eq!(ErrorStep::SendNotification.to_string(), "sendNotification");
        assert_eq!(
            ErrorStep::SendRateLimitNotification.to_string(),
            "sendRateLimitNotification"
        );
        assert_eq!(
            ErrorStep::CreateRateLimitDocument.to_string(),
            "createRateLimitDocument"
        );
        assert_eq!(
            ErrorStep::UpdateRateLimitDocument.to_string(),
            "updateRateLimitDocument"
        );
    }

    #[test]
    fn unregistered_token_is_invalid_token_without_logging() {
        let err = classify_send_error(
            ErrorStep::SendNotification,
            Some("messaging/registration-token-not-registered".to_string()),
            "Requested entity was not found.".to_string(),
        );
        match &err {
            AppError::Classified { kind, code, .. } => {
                assert_eq!(*kind, ErrorKind::InvalidToken);
                assert_eq!(code.as_deref(), Some("registration-token-not-registered"));
            }
            other => panic!("unexpected classification: {other:?}"),
        }
        assert!(!err.wants_structured_log());
    }

    #[test]
    fn oversize_message_text_is_payload_too_large() {
        let err = classify_send_error(
            ErrorStep::SendNotification,
            None,
            "The Message Is Too Big to deliver".to_string(),
        );
        match err {
            AppError::Classified { kind, .. } => assert_eq!(kind, ErrorKind::PayloadTooLarge),
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn unknown_codes_are_internal_and_logged() {
        let err = classify_send_error(
            ErrorStep::SendNotification,
            Some("messaging/unavailable".to_string()),
            "backend unavailable".to_string(),
        );
        match &err {
            AppError::Classified { kind, .. } => assert_eq!(*kind, ErrorKind::InternalError),
            other => panic!("unexpected classification: {other:?}"),
        }
        assert!(err.wants_structured_log());
    }

    #[test]
    fn token_errors_map_to_403() {
        assert_eq!(AppError::MissingToken.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::MissingToken.to_string(),
            "You did not send a token!"
        );
        assert_eq!(
            AppError::InvalidTokenFormat.to_string(),
            "That is not a valid FCM token"
        );
    }
}
