/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
#![allow(clippy::unwrap_used)]

use crate::support::TestContext;
use actix_web::{test, web, App};
use push_notification_service::ratelimit::store::RateLimitStore;
use push_notification_service::server::configure_routes;
use serde_json::{json, Value};

macro_rules! mount {
    ($ctx:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($ctx.state.clone()))
                .configure(configure_routes),
        )
        .await
    };
}

fn field<'a>(body: &'a Value, path: &[&str]) -> &'a Value {
    let mut current = body;
    for key in path {
        current = &current[*key];
    }
    current
}

#[actix_web::test]
async fn happy_path_legacy() {
    let ctx = TestContext::new(500);
    let app = mount!(ctx);

    let req = test::TestRequest::post()
        .uri("/sendPushNotification")
        .set_json(json!({
            "push_token": "abc:1",
            "message": "Hi",
            "registration_info": { "app_id": "com.x" },
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 201);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(field(&body, &["rateLimits", "successful"]), &json!(1));
    assert_eq!(field(&body, &["rateLimits", "total"]), &json!(1));
    assert_eq!(field(&body, &["rateLimits", "attempts"]), &json!(1));
    assert_eq!(field(&body, &["rateLimits", "maximum"]), &json!(500));
    assert_eq!(field(&body, &["rateLimits", "remaining"]), &json!(499));
    assert_eq!(body["target"], json!("abc:1"));
    assert!(body["messageId"].as_str().unwrap().starts_with("projects/"));
    assert_eq!(field(&body, &["sentPayload", "token"]), &json!("abc:1"));

    let sent = ctx.gateway.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["token"], json!("abc:1"));
    assert_eq!(sent[0]["notification"]["body"], json!("Hi"));
}

#[actix_web::test]
async fn missing_token_is_403_without_side_effects() {
    let ctx = TestContext::new(500);
    let app = mount!(ctx);

    let req = test::TestRequest::post()
        .uri("/sendPushNotification")
        .set_json(json!({ "message": "Hi" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 403);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["errorMessage"], json!("You did not send a token!"));
    assert_eq!(ctx.gateway.sent_count(), 0);
}

#[actix_web::test]
async fn malformed_token_is_403() {
    let ctx = TestContext::new(500);
    let app = mount!(ctx);

    let req = test::TestRequest::post()
        .uri("/sendPushNotification")
        .set_json(json!({ "push_token": "legacySNS" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 403);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["errorMessage"], json!("That is not a valid FCM token"));
    assert_eq!(ctx.gateway.sent_count(), 0);
}

#[actix_web::test]
async fn exact_threshold_sends_the_one_shot_once() {
    let ctx = TestContext::new(5);
    ctx.seed_record("abc:1", 5, 4).await;
    let app = mount!(ctx);

    let send = json!({
        "push_token": "abc:1",
        "message": "Hi",
        "registration_info": { "app_id": "com.x" },
    });

    // The delivery that lands exactly on the maximum.
    let req = test::TestRequest::post()
        .uri("/sendPushNotification")
        .set_json(send.clone())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 201);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(field(&body, &["rateLimits", "successful"]), &json!(5));
    assert_eq!(field(&body, &["rateLimits", "remaining"]), &json!(0));

    let sent = ctx.gateway.sent_messages();
    assert_eq!(sent.len(), 2, "notification plus the one-shot warning");
    assert_eq!(
        sent[1]["fcm_options"]["analytics_label"],
        json!("rateLimitNotification")
    );
    assert_eq!(sent[1]["data"]["rateLimited"], json!("true"));
    assert_eq!(sent[1]["data"]["maxNotificationsPerDay"], json!("5"));
    assert_eq!(sent[1]["token"], json!("abc:1"));

    // The next request is refused and no further one-shot goes out.
    let req = test::TestRequest::post()
        .uri("/sendPushNotification")
        .set_json(send)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 429);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["errorType"], json!("RateLimited"));
    assert_eq!(body["target"], json!("abc:1"));
    assert_eq!(field(&body, &["rateLimits", "successful"]), &json!(5));
    assert_eq!(field(&body, &["rateLimits", "attempts"]), &json!(7));
    assert_eq!(ctx.gateway.sent_count(), 2);
}

#[actix_web::test]
async fn ios_command_bypasses_accounting() {
    let ctx = TestContext::new(500);
    let app = mount!(ctx);

    let req = test::TestRequest::post()
        .uri("/iOSV1")
        .set_json(json!({
            "push_token": "a:1",
            "message": "clear_badge",
            "registration_info": { "app_id": "io.robbie.HomeAssistant" },
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 201);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(field(&body, &["rateLimits", "attempts"]), &json!(0));
    assert_eq!(field(&body, &["rateLimits", "successful"]), &json!(0));

    // Store untouched.
    let record = ctx.store.read("a:1").await.unwrap();
    assert_eq!(record.attempts_count, 0);
    assert_eq!(record.total_count, 0);

    let sent = ctx.gateway.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0]["apns"]["payload"]["aps"]["badge"],
        json!(0)
    );
    assert_eq!(
        sent[0]["apns"]["payload"]["homeassistant"]["command"],
        json!("clear_badge")
    );
    assert_eq!(
        sent[0]["apns"]["headers"]["apns-push-type"],
        json!("background")
    );
}

#[actix_web::test]
async fn ios_command_is_sent_even_when_rate_limited() {
    let ctx = TestContext::new(1);
    ctx.seed_record("a:1", 1, 1).await;
    let app = mount!(ctx);

    let req = test::TestRequest::post()
        .uri("/iOSV1")
        .set_json(json!({
            "push_token": "a:1",
            "message": "request_location_update",
            "registration_info": { "app_id": "io.robbie.HomeAssistant" },
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 201);
    assert_eq!(ctx.gateway.sent_count(), 1);
}

#[actix_web::test]
async fn unregistered_token_is_classified_and_counted() {
    let ctx = TestContext::new(500);
    ctx.gateway.fail_next(
        Some("messaging/registration-token-not-registered"),
        "Requested entity was not found.",
    );
    let app = mount!(ctx);

    let req = test::TestRequest::post()
        .uri("/sendPushNotification")
        .set_json(json!({
            "push_token": "gone:1",
            "message": "Hi",
            "registration_info": { "app_id": "com.x" },
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 500);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["errorType"], json!("InvalidToken"));
    assert_eq!(
        body["errorCode"],
        json!("registration-token-not-registered")
    );
    assert_eq!(body["errorStep"], json!("sendNotification"));

    let record = ctx.store.read("gone:1").await.unwrap();
    assert_eq!(record.attempts_count, 1);
    assert_eq!(record.error_count, 1);
    assert_eq!(record.total_count, 1);
    assert_eq!(record.delivered_count, 0);
}

#[actix_web::test]
async fn oversize_payload_is_classified() {
    let ctx = TestContext::new(500);
    ctx.gateway
        .fail_next(None, "Request payload too large for delivery");
    let app = mount!(ctx);

    let req = test::TestRequest::post()
        .uri("/androidV1")
        .set_json(json!({
            "push_token": "abc:1",
            "message": "Hi",
            "registration_info": { "app_id": "io.homeassistant.companion.android" },
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 500);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["errorType"], json!("PayloadTooLarge"));
    assert_eq!(body["errorStep"], json!("sendNotification"));
}

#[actix_web::test]
async fn check_endpoint_reads_without_mutating() {
    let ctx = TestContext::new(500);
    ctx.seed_record("abc:1", 3, 2).await;
    let app = mount!(ctx);

    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/checkRateLimits")
            .set_json(json!({ "push_token": "abc:1" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 200);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["target"], json!("abc:1"));
        assert_eq!(field(&body, &["rateLimits", "attempts"]), &json!(3));
        assert_eq!(field(&body, &["rateLimits", "successful"]), &json!(2));
        assert_eq!(field(&body, &["rateLimits", "remaining"]), &json!(498));
    }
    assert_eq!(ctx.gateway.sent_count(), 0);
}

#[actix_web::test]
async fn check_endpoint_validates_the_token() {
    let ctx = TestContext::new(500);
    let app = mount!(ctx);

    let req = test::TestRequest::post()
        .uri("/checkRateLimits")
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 403);

    let req = test::TestRequest::post()
        .uri("/checkRateLimits")
        .set_json(json!({ "push_token": "nocolon" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 403);
}

#[actix_web::test]
async fn health_endpoint() {
    let ctx = TestContext::new(500);
    let app = mount!(ctx);

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 200);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], json!("ok"));
}

#[actix_web::test]
async fn android_actions_reach_the_wire_flattened() {
    let ctx = TestContext::new(500);
    let app = mount!(ctx);

    let req = test::TestRequest::post()
        .uri("/androidV1")
        .set_json(json!({
            "push_token": "abc:1",
            "message": "Door open",
            "title": "Alert",
            "registration_info": {
                "app_id": "io.homeassistant.companion.android",
                "webhook_id": "wh-1",
            },
            "data": {
                "actions": [{ "key": "SILENCE", "title": "Silence" }],
                "channel": "alarm",
                "ttl": 0,
                "priority": "high",
            },
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 201);

    let sent = ctx.gateway.sent_messages();
    assert_eq!(sent[0]["data"]["action_1_key"], json!("SILENCE"));
    assert_eq!(sent[0]["data"]["action_1_title"], json!("Silence"));
    assert_eq!(sent[0]["data"]["channel"], json!("alarm"));
    assert_eq!(sent[0]["data"]["message"], json!("Door open"));
    assert_eq!(sent[0]["data"]["webhook_id"], json!("wh-1"));
    assert_eq!(sent[0]["android"]["ttl"], json!(0));
    assert_eq!(sent[0]["android"]["priority"], json!("high"));
}

#[actix_web::test]
async fn rate_limited_warning_failure_does_not_fail_the_request() {
    let ctx = TestContext::new(1);
    // The notification itself delivers; the triggered one-shot fails.
    ctx.gateway.succeed_next("projects/test/messages/first");
    ctx.gateway.fail_next(None, "boom");
    let app = mount!(ctx);

    let req = test::TestRequest::post()
        .uri("/sendPushNotification")
        .set_json(json!({
            "push_token": "abc:1",
            "message": "Hi",
            "registration_info": { "app_id": "com.x" },
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 201);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["messageId"], json!("projects/test/messages/first"));
    assert_eq!(field(&body, &["rateLimits", "successful"]), &json!(1));
    assert_eq!(ctx.gateway.sent_count(), 2);
}
