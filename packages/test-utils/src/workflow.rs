//! Mock workflow automation webhook (n8n)

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WEBHOOK_PATH: &str = "/webhook/talentflow";

/// Mock n8n webhook receiver
pub struct MockWorkflowServer {
    server: MockServer,
}

impl MockWorkflowServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Full webhook URL to configure as `N8N_WEBHOOK_URL`
    pub fn webhook_url(&self) -> String {
        format!("{}{}", self.server.uri(), WEBHOOK_PATH)
    }

    /// Accept every event
    pub async fn mock_accept(&self) {
        Mock::given(method("POST"))
            .and(path(WEBHOOK_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Workflow was started"})))
            .mount(&self.server)
            .await;
    }

    /// Reject the next `times` events with `status_code`, then fall through
    pub async fn mock_failure_times(&self, status_code: u16, times: u64) {
        Mock::given(method("POST"))
            .and(path(WEBHOOK_PATH))
            .respond_with(ResponseTemplate::new(status_code))
            .up_to_n_times(times)
            .mount(&self.server)
            .await;
    }

    /// Reject every event
    pub async fn mock_failure(&self, status_code: u16) {
        Mock::given(method("POST"))
            .and(path(WEBHOOK_PATH))
            .respond_with(ResponseTemplate::new(status_code))
            .mount(&self.server)
            .await;
    }

    /// Event bodies received so far, in arrival order
    pub async fn received_events(&self) -> Vec<serde_json::Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|request| request.url.path() == WEBHOOK_PATH)
            .filter_map(|request| serde_json::from_slice(&request.body).ok())
            .collect()
    }

    pub fn inner(&self) -> &MockServer {
        &self.server
    }
}
