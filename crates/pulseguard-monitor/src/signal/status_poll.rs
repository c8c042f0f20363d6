//! External status endpoint polling.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{SignalOutcome, SignalSource};
use crate::entity::EntityId;
use crate::error::MonitorError;

const STATUS_PATH: &str = "IsRunning";

/// Polls `{base_url}/IsRunning`. The endpoint is host-wide, so one poll answers for
/// every monitored entity.
pub struct ExternalStatusPoll {
    url: String,
    client: Client,
}

impl ExternalStatusPoll {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, MonitorError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::TransientIo(e.to_string()))?;

        Ok(Self {
            url: format!("{}/{}", base_url.trim_end_matches('/'), STATUS_PATH),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One request against the status endpoint.
    ///
    /// Non-200 or a body other than `ok` is a failure. A transport error or timeout
    /// means the endpoint could not be asked, which is `Unknown`.
    pub async fn poll(&self) -> SignalOutcome {
        let response = match self.client.get(&self.url).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!("Status endpoint unreachable: {}", e);
                return SignalOutcome::Unknown;
            }
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return SignalOutcome::Failed(format!("status endpoint returned HTTP {}", status));
        }

        match response.text().await {
            Ok(body) if body.trim().eq_ignore_ascii_case("ok") => SignalOutcome::Healthy,
            Ok(body) => SignalOutcome::Failed(format!(
                "status endpoint reported {:?}",
                body.trim().chars().take(64).collect::<String>()
            )),
            Err(e) => {
                debug!("Status body unreadable: {}", e);
                SignalOutcome::Unknown
            }
        }
    }
}

#[async_trait]
impl SignalSource for ExternalStatusPoll {
    fn name(&self) -> &str {
        "status-poll"
    }

    async fn sample(&self, _entity: &EntityId) -> SignalOutcome {
        self.poll().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

    async fn server_with(status: u16, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/IsRunning"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[test]
    fn test_url_joins_base() {
        let poll = ExternalStatusPoll::new("http://127.0.0.1:9000/", Duration::from_secs(1)).unwrap();
        assert_eq!(poll.url(), "http://127.0.0.1:9000/IsRunning");
    }

    #[tokio::test]
    async fn test_ok_body_is_healthy() {
        let server = server_with(200, "ok\n").await;
        let poll = ExternalStatusPoll::new(&server.uri(), Duration::from_secs(2)).unwrap();
        assert_eq!(poll.poll().await, SignalOutcome::Healthy);
        assert_eq!(poll.sample(&"wxid_a".into()).await, SignalOutcome::Healthy);
    }

    #[tokio::test]
    async fn test_other_body_is_failure() {
        let server = server_with(200, "stopped").await;
        let poll = ExternalStatusPoll::new(&server.uri(), Duration::from_secs(2)).unwrap();
        match poll.poll().await {
            SignalOutcome::Failed(reason) => assert!(reason.contains("stopped")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_200_is_failure() {
        let server = server_with(500, "ok").await;
        let poll = ExternalStatusPoll::new(&server.uri(), Duration::from_secs(2)).unwrap();
        assert!(poll.poll().await.is_failed());
    }

    #[tokio::test]
    async fn test_unreachable_is_unknown() {
        // Nothing listens on port 9 locally.
        let poll = ExternalStatusPoll::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert_eq!(poll.poll().await, SignalOutcome::Unknown);
    }

    #[tokio::test]
    async fn test_timeout_is_unknown() {
        let mock_server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("ok")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let poll = ExternalStatusPoll::new(&mock_server.uri(), Duration::from_millis(200)).unwrap();
        assert_eq!(poll.poll().await, SignalOutcome::Unknown);
    }
}
