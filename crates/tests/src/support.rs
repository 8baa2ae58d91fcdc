/*  Copyright 2022-23, Juspay India Pvt Ltd
    This program is free software: you can redistribute it and/or modify it under the terms of the GNU Affero General Public License
    as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version. This program
    is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
    or FITNESS FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more details. You should have received a copy of
    the GNU Affero General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
*/
#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use push_notification_service::environment::AppState;
use push_notification_service::outbound::fcm::{GatewayError, PushGateway};
use push_notification_service::ratelimit::document::DocumentStore;
use push_notification_service::ratelimit::store::RateLimitStore;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

type ScriptedResult = Result<String, (Option<String>, String)>;

/// Scripted gateway stand-in: records every outgoing message, pops queued
/// results, and delivers successfully by default.
#[derive(Default)]
pub struct MockGateway {
    responses: Mutex<VecDeque<ScriptedResult>>,
    sent: Mutex<Vec<Map<String, Value>>>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(MockGateway::default())
    }

    pub fn succeed_next(&self, message_id: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(message_id.to_string()));
    }

    pub fn fail_next(&self, code: Option<&str>, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err((code.map(str::to_string), message.to_string())));
    }

    pub fn sent_messages(&self) -> Vec<Map<String, Value>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl PushGateway for MockGateway {
    async fn send(&self, message: &Map<String, Value>) -> Result<String, GatewayError> {
        self.sent.lock().unwrap().push(message.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(message_id)) => Ok(message_id),
            Some(Err((code, message))) => Err(GatewayError { code, message }),
            None => Ok(format!(
                "projects/test/messages/{}",
                uuid::Uuid::new_v4()
            )),
        }
    }
}

/// A full application state over a throwaway document store and a scripted
/// gateway. The temp dir guard must outlive the test.
pub struct TestContext {
    _dir: tempfile::TempDir,
    pub state: AppState,
    pub store: Arc<DocumentStore>,
    pub gateway: Arc<MockGateway>,
}

impl TestContext {
    pub fn new(max_notifications_per_day: u32) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rate_limits.db");
        let store = Arc::new(DocumentStore::open(path.to_str().unwrap()).unwrap());
        let gateway = MockGateway::new();
        let state = AppState::with_parts(
            store.clone(),
            gateway.clone(),
            max_notifications_per_day,
            "us-central1".to_string(),
        );
        TestContext {
            _dir: dir,
            state,
            store,
            gateway,
        }
    }

    /// Pre-populate today's record for a token: `attempts` increments, then
    /// `delivered` successes.
    pub async fn seed_record(&self, token: &str, attempts: u32, delivered: u32) {
        for _ in 0..attempts {
            let _ = self.store.increment_attempt(token).await.unwrap();
        }
        for _ in 0..delivered {
            let _ = self.store.record_success(token).await.unwrap();
        }
    }
}
