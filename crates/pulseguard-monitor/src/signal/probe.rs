//! Active heartbeat probing through the host session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use super::{SignalOutcome, SignalSource};
use crate::entity::EntityId;

/// Probe call failure.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe transport error: {0}")]
    Transport(String),

    #[error("probe rejected: {0}")]
    Rejected(String),
}

/// Liveness capability exposed by the host session.
#[async_trait]
pub trait SessionProbe: Send + Sync {
    /// `Ok(true)` when the session answered the heartbeat.
    async fn probe(&self, entity: &EntityId) -> Result<bool, ProbeError>;
}

/// Probe source. Reports `Unknown` until a session handle is attached.
pub struct ActiveProbe {
    handle: RwLock<Option<Arc<dyn SessionProbe>>>,
    timeout: RwLock<Duration>,
}

impl ActiveProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            handle: RwLock::new(None),
            timeout: RwLock::new(timeout),
        }
    }

    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.write() = timeout;
    }

    /// Attach (or replace) the session handle.
    pub fn attach(&self, handle: Arc<dyn SessionProbe>) {
        *self.handle.write() = Some(handle);
    }

    pub fn detach(&self) {
        *self.handle.write() = None;
    }

    pub fn is_attached(&self) -> bool {
        self.handle.read().is_some()
    }
}

#[async_trait]
impl SignalSource for ActiveProbe {
    fn name(&self) -> &str {
        "active-probe"
    }

    async fn sample(&self, entity: &EntityId) -> SignalOutcome {
        let Some(handle) = self.handle.read().clone() else {
            debug!("No session handle yet, probe for {} is unknown", entity);
            return SignalOutcome::Unknown;
        };

        let timeout = *self.timeout.read();
        match tokio::time::timeout(timeout, handle.probe(entity)).await {
            Ok(Ok(true)) => SignalOutcome::Healthy,
            Ok(Ok(false)) => SignalOutcome::Failed("heartbeat not acknowledged".to_string()),
            Ok(Err(e)) => SignalOutcome::Failed(e.to_string()),
            Err(_) => SignalOutcome::Failed(format!("probe timed out after {:?}", timeout)),
        }
    }
}

/// Session probe over HTTP. `{entity}` in the URL is replaced with the entity id.
///
/// Any 2xx answer counts as an acknowledged heartbeat.
pub struct HttpSessionProbe {
    url: String,
    client: Client,
}

impl HttpSessionProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Transport(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url_for(&self, entity: &EntityId) -> String {
        self.url.replace("{entity}", entity.as_str())
    }
}

#[async_trait]
impl SessionProbe for HttpSessionProbe {
    async fn probe(&self, entity: &EntityId) -> Result<bool, ProbeError> {
        let response = self
            .client
            .get(self.url_for(entity))
            .send()
            .await
            .map_err(|e| ProbeError::Transport(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

    struct FixedProbe(Result<bool, &'static str>);

    #[async_trait]
    impl SessionProbe for FixedProbe {
        async fn probe(&self, _entity: &EntityId) -> Result<bool, ProbeError> {
            self.0.map_err(|e| ProbeError::Transport(e.to_string()))
        }
    }

    struct HangingProbe;

    #[async_trait]
    impl SessionProbe for HangingProbe {
        async fn probe(&self, _entity: &EntityId) -> Result<bool, ProbeError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_unknown_without_handle() {
        let probe = ActiveProbe::new(Duration::from_secs(1));
        assert!(!probe.is_attached());
        assert_eq!(probe.sample(&"wxid_a".into()).await, SignalOutcome::Unknown);
    }

    #[tokio::test]
    async fn test_healthy_and_failed() {
        let probe = ActiveProbe::new(Duration::from_secs(1));
        probe.attach(Arc::new(FixedProbe(Ok(true))));
        assert_eq!(probe.sample(&"wxid_a".into()).await, SignalOutcome::Healthy);

        probe.attach(Arc::new(FixedProbe(Ok(false))));
        assert!(probe.sample(&"wxid_a".into()).await.is_failed());

        probe.attach(Arc::new(FixedProbe(Err("connection reset"))));
        match probe.sample(&"wxid_a".into()).await {
            SignalOutcome::Failed(reason) => assert!(reason.contains("connection reset")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_failure() {
        let probe = ActiveProbe::new(Duration::from_secs(5));
        probe.attach(Arc::new(HangingProbe));
        match probe.sample(&"wxid_a".into()).await {
            SignalOutcome::Failed(reason) => assert!(reason.contains("timed out")),
            other => panic!("expected timeout failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_detach_returns_to_unknown() {
        let probe = ActiveProbe::new(Duration::from_secs(1));
        probe.attach(Arc::new(FixedProbe(Ok(true))));
        probe.detach();
        assert_eq!(probe.sample(&"wxid_a".into()).await, SignalOutcome::Unknown);
    }

    #[tokio::test]
    async fn test_http_probe() {
        let mock_server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/heartbeat/wxid_ok"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/heartbeat/wxid_down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let url = format!("{}/heartbeat/{{entity}}", mock_server.uri());
        let http = HttpSessionProbe::new(url, Duration::from_secs(2)).unwrap();
        assert!(http.probe(&"wxid_ok".into()).await.unwrap());
        assert!(!http.probe(&"wxid_down".into()).await.unwrap());
    }
}
