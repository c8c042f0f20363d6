//! Monitoring supervisor.
//!
//! Owns the registry, the signal sources and the notifier, and runs the periodic
//! loops. Loops are cancelled on stop and reload; notification transactions run on a
//! task tracker and are allowed to finish so their result still lands in the registry.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use pulseguard_config::{Config, ConfigError, MessageConfig};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::delivery::{DeliveryReceipt, NotificationSink, PushPlusClient};
use crate::entity::{EntityId, MonitoredEntity};
use crate::error::{DeliveryError, MonitorError};
use crate::evidence::EvidenceLog;
use crate::message::MessageRenderer;
use crate::notifier::Notifier;
use crate::registry::{EntitySnapshot, FailureOutcome, MonitorRegistry};
use crate::settings::MonitorSettings;
use crate::signal::{
    ActiveProbe, ExternalStatusPoll, FailureEvent, FailureKind, HttpSessionProbe, InboundEvent,
    PassiveTextEvent, SessionProbe, SignalKind, SignalOutcome, SignalSource, is_entity_id,
};

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;

/// Builds the notification sink for a settings snapshot.
pub type SinkFactory = Arc<
    dyn Fn(&MonitorSettings) -> Result<Arc<dyn NotificationSink>, MonitorError> + Send + Sync,
>;

/// Factory producing a [`PushPlusClient`] from the settings.
pub fn pushplus_sink_factory() -> SinkFactory {
    Arc::new(|settings: &MonitorSettings| -> Result<Arc<dyn NotificationSink>, MonitorError> {
        let client = PushPlusClient::new(&settings.pushplus, settings.retry, settings.request_timeout)?;
        Ok(Arc::new(client) as Arc<dyn NotificationSink>)
    })
}

/// Monitoring summary for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub enabled: bool,
    pub running: bool,
    pub channel: String,
    pub primary: Option<EntityId>,
    pub probe_attached: bool,
    pub status_url: Option<String>,
    pub entities: Vec<EntitySnapshot>,
}

impl StatusReport {
    pub fn offline(&self) -> impl Iterator<Item = &EntitySnapshot> {
        self.entities.iter().filter(|e| e.offline)
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Monitoring: {}{}",
            if self.enabled { "enabled" } else { "disabled" },
            if self.running { " (running)" } else { "" }
        )?;
        writeln!(f, "Channel: {}", self.channel)?;
        match &self.primary {
            Some(p) => writeln!(f, "Primary: {}", p)?,
            None => writeln!(f, "Primary: unset")?,
        }
        writeln!(
            f,
            "Active probe: {}",
            if self.probe_attached { "attached" } else { "no session" }
        )?;
        if let Some(url) = &self.status_url {
            writeln!(f, "Status endpoint: {}", url)?;
        }
        if self.entities.is_empty() {
            return write!(f, "No monitored entities");
        }
        write!(f, "Entities ({}):", self.entities.len())?;
        for e in &self.entities {
            let notified = e
                .last_notified
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "never".to_string());
            write!(
                f,
                "\n- {} [{}] failures={} last_notified={}",
                e.id,
                if e.offline { "OFFLINE" } else { "ok" },
                e.failures_in_window,
                notified
            )?;
            if let Some(err) = &e.last_error {
                write!(f, " last_error={}", err)?;
            }
        }
        Ok(())
    }
}

/// On-demand heartbeat check for one entity. Nothing is recorded.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub entity: EntityId,
    pub monitored: bool,
    /// `None` when status polling is disabled.
    #[serde(serialize_with = "serialize_outcome_opt")]
    pub status_poll: Option<SignalOutcome>,
    #[serde(serialize_with = "serialize_outcome")]
    pub probe: SignalOutcome,
    pub snapshot: Option<EntitySnapshot>,
    pub evidence_path: PathBuf,
}

fn serialize_outcome<S: serde::Serializer>(o: &SignalOutcome, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(o)
}

fn serialize_outcome_opt<S: serde::Serializer>(
    o: &Option<SignalOutcome>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match o {
        Some(o) => s.collect_str(o),
        None => s.serialize_none(),
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Heartbeat check for {}{}",
            self.entity,
            if self.monitored { "" } else { " (not monitored)" }
        )?;
        match &self.status_poll {
            Some(o) => writeln!(f, "Status endpoint: {}", o)?,
            None => writeln!(f, "Status endpoint: disabled")?,
        }
        writeln!(f, "Active probe: {}", self.probe)?;
        if let Some(snap) = &self.snapshot {
            writeln!(
                f,
                "State: {} with {} failure(s) in window",
                if snap.offline { "offline" } else { "online" },
                snap.failures_in_window
            )?;
        }
        write!(f, "Evidence log: {}", self.evidence_path.display())
    }
}

#[derive(Default)]
struct Lifecycle {
    token: Option<CancellationToken>,
    loops: Vec<JoinHandle<()>>,
}

/// The monitoring engine.
pub struct MonitorService {
    settings: RwLock<MonitorSettings>,
    registry: Arc<MonitorRegistry>,
    notifier: Notifier,
    probe: ActiveProbe,
    probe_from_config: AtomicBool,
    status: RwLock<Option<Arc<ExternalStatusPoll>>>,
    evidence: RwLock<Arc<EvidenceLog>>,
    passive: PassiveTextEvent,
    detected: RwLock<Option<EntityId>>,
    sink_factory: SinkFactory,
    lifecycle: Mutex<Lifecycle>,
    apply_lock: tokio::sync::Mutex<()>,
    tracker: TaskTracker,
}

impl MonitorService {
    /// Build a stopped service. Call [`MonitorService::apply`] or [`MonitorService::start`]
    /// to begin monitoring.
    pub fn new(settings: MonitorSettings, sink_factory: SinkFactory) -> Result<Arc<Self>, MonitorError> {
        let registry = Arc::new(MonitorRegistry::new(settings.aggregator(), settings.gate()));
        registry.sync(&settings.entities);
        registry.set_primary(settings.primary_entity.clone());

        let sink = sink_factory(&settings)?;
        let renderer = MessageRenderer::new(settings.messages.clone(), settings.bot_name.clone());
        let notifier = Notifier::new(registry.clone(), sink, renderer);

        let service = Self {
            registry,
            notifier,
            probe: ActiveProbe::new(settings.request_timeout),
            probe_from_config: AtomicBool::new(false),
            status: RwLock::new(None),
            evidence: RwLock::new(Arc::new(Self::evidence_log(&settings))),
            passive: PassiveTextEvent,
            detected: RwLock::new(None),
            sink_factory,
            lifecycle: Mutex::new(Lifecycle::default()),
            apply_lock: tokio::sync::Mutex::new(()),
            tracker: TaskTracker::new(),
            settings: RwLock::new(settings.clone()),
        };
        service.install_sources(&settings)?;
        Ok(Arc::new(service))
    }

    /// Service with the PushPlus sink, started if the settings enable it.
    pub fn launch(settings: MonitorSettings) -> Result<Arc<Self>, MonitorError> {
        let service = Self::new(settings, pushplus_sink_factory())?;
        service.start();
        Ok(service)
    }

    pub fn registry(&self) -> &Arc<MonitorRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> MonitorSettings {
        self.settings.read().clone()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.lock().token.is_some()
    }

    // ---- lifecycle ----

    /// Spawn the periodic loops. No-op when disabled or already running.
    pub fn start(self: &Arc<Self>) {
        let settings = self.settings();
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.token.is_some() {
            return;
        }
        if !settings.enabled {
            info!("Monitoring is disabled, loops not started");
            return;
        }

        let token = CancellationToken::new();
        lifecycle.loops.push(self.spawn_loop(
            "probe",
            settings.check_interval,
            token.clone(),
            |svc| async move { svc.probe_tick().await },
        ));
        if self.status.read().is_some() {
            lifecycle.loops.push(self.spawn_loop(
                "status",
                settings.status_poll_interval,
                token.clone(),
                |svc| async move { svc.poll_tick().await },
            ));
        }
        lifecycle.token = Some(token);

        info!(
            "Monitoring started: {} entities, probe every {:?}, status poll every {:?}",
            self.registry.len(),
            settings.check_interval,
            settings.status_poll_interval
        );
    }

    /// Cancel the loops and wait for them to exit. In-flight notifications continue.
    pub async fn stop(&self) {
        let (token, loops) = {
            let mut lifecycle = self.lifecycle.lock();
            (lifecycle.token.take(), std::mem::take(&mut lifecycle.loops))
        };
        let Some(token) = token else {
            return;
        };

        token.cancel();
        for handle in loops {
            if let Err(e) = handle.await {
                warn!("Monitor loop ended abnormally: {}", e);
            }
        }
        info!("Monitoring stopped");
    }

    /// Wait for tracked notification tasks to finish.
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stop the loops and drain notification tasks.
    pub async fn shutdown(&self) {
        self.stop().await;
        self.flush().await;
    }

    /// Swap in a new settings snapshot. Loops restart only if the new settings enable them.
    pub async fn apply(self: &Arc<Self>, settings: MonitorSettings) -> Result<(), MonitorError> {
        let _apply = self.apply_lock.lock().await;
        self.stop().await;

        let sink = match (self.sink_factory)(&settings) {
            Ok(sink) => sink,
            Err(e) => {
                error!("Cannot build notification sink, monitoring disabled: {}", e);
                self.settings.write().enabled = false;
                return Err(e);
            }
        };

        if let Err(e) = self.install_sources(&settings) {
            error!("Cannot build signal sources, monitoring disabled: {}", e);
            self.settings.write().enabled = false;
            return Err(e);
        }

        self.registry.set_policies(settings.aggregator(), settings.gate());
        let mut entities = settings.entities.clone();
        let mut primary = settings.primary_entity.clone();
        if primary.is_none() {
            if let Some(detected) = self.detected.read().clone() {
                if !entities.iter().any(|e| e.id == detected) {
                    entities.push(MonitoredEntity::new(detected.clone()));
                }
                primary = Some(detected);
            }
        }
        self.registry.sync(&entities);
        self.registry.set_primary(primary);

        self.notifier.set_sink(sink);
        self.notifier.set_renderer(MessageRenderer::new(
            settings.messages.clone(),
            settings.bot_name.clone(),
        ));

        let current = self.settings();
        if current.evidence_path != settings.evidence_path
            || current.evidence_lines != settings.evidence_lines
            || current.evidence_window != settings.evidence_window
        {
            *self.evidence.write() = Arc::new(Self::evidence_log(&settings));
        }

        *self.settings.write() = settings;
        self.start();
        Ok(())
    }

    /// Apply a freshly loaded configuration. A load or validation error disables
    /// monitoring until the next successful reload.
    pub async fn reload(self: &Arc<Self>, loaded: Result<Config, ConfigError>) -> Result<(), MonitorError> {
        match loaded.and_then(|config| MonitorSettings::from_config(&config)) {
            Ok(settings) => {
                self.apply(settings).await?;
                info!("Configuration reloaded");
                Ok(())
            }
            Err(e) => {
                let _apply = self.apply_lock.lock().await;
                error!("Configuration rejected, monitoring disabled: {}", e);
                self.stop().await;
                self.settings.write().enabled = false;
                Err(MonitorError::Config(e))
            }
        }
    }

    fn evidence_log(settings: &MonitorSettings) -> EvidenceLog {
        EvidenceLog::new(
            settings.evidence_path.clone(),
            settings.evidence_lines,
            settings.evidence_window,
        )
    }

    fn install_sources(&self, settings: &MonitorSettings) -> Result<(), MonitorError> {
        let status = match &settings.status_base_url {
            Some(url) => Some(Arc::new(ExternalStatusPoll::new(url, settings.request_timeout)?)),
            None => None,
        };
        *self.status.write() = status;

        self.probe.set_timeout(settings.request_timeout);
        match &settings.probe_url {
            Some(url) => {
                let http = HttpSessionProbe::new(url.clone(), settings.request_timeout)
                    .map_err(|e| MonitorError::TransientIo(e.to_string()))?;
                self.probe.attach(Arc::new(http));
                self.probe_from_config.store(true, Ordering::SeqCst);
            }
            None => {
                if self.probe_from_config.swap(false, Ordering::SeqCst) {
                    self.probe.detach();
                }
            }
        }
        Ok(())
    }

    fn spawn_loop<F, Fut>(
        self: &Arc<Self>,
        name: &'static str,
        interval: Duration,
        token: CancellationToken,
        tick: F,
    ) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let service = self.clone();
        tokio::spawn(async move {
            debug!("{} loop started (interval: {:?})", name, interval);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick(service.clone()) => {}
                }
            }
            debug!("{} loop stopped", name);
        })
    }

    // ---- signals ----

    /// Hand a session probe to the active probe source.
    pub fn attach_session(&self, handle: Arc<dyn SessionProbe>) {
        self.probe.attach(handle);
        self.probe_from_config.store(false, Ordering::SeqCst);
        info!("Session probe attached");
    }

    /// Passive ingestion of one inbound event.
    pub async fn ingest(self: &Arc<Self>, event: &InboundEvent) -> Option<FailureEvent> {
        if !self.settings.read().enabled {
            return None;
        }
        self.detect_entity(event);

        let text = event.text();
        let context = self.registry.fallback_context();
        let failure = self
            .passive
            .observe(text, &context, Utc::now(), SignalKind::PassiveText)?;

        let evidence = self.evidence.read().clone();
        if let Err(e) = evidence.append(text, failure.at).await {
            warn!("Cannot write evidence to {}: {}", evidence.path().display(), e);
        }

        self.handle_failure(&failure);
        Some(failure)
    }

    /// Adopt the first identifier-shaped sender as the primary entity.
    fn detect_entity(&self, event: &InboundEvent) {
        if !self.settings.read().auto_detect_entity || self.registry.primary().is_some() {
            return;
        }
        let Some(candidate) = event
            .sender
            .as_deref()
            .or(event.from.as_deref())
            .filter(|s| is_entity_id(s))
        else {
            return;
        };

        let id = EntityId::new(candidate);
        info!("Detected primary entity {}", id);
        *self.detected.write() = Some(id.clone());
        self.registry.set_primary(Some(id.clone()));
        self.registry.add(MonitoredEntity::new(id));
    }

    /// Feed one failure into the registry and start a notification if one is due.
    pub fn handle_failure(self: &Arc<Self>, failure: &FailureEvent) -> Option<FailureOutcome> {
        let outcome = self.registry.record_failure(failure.entity.as_str(), failure.at)?;
        debug!(
            "{} failure for {} ({}): {} in window",
            failure.source, failure.entity, failure.reason, outcome.count
        );

        let now = Utc::now();
        if self.registry.should_notify(failure.entity.as_str(), now) {
            let service = self.clone();
            let entity = failure.entity.clone();
            self.tracker.spawn(async move {
                service.notifier.notify_if_due(&entity, now).await;
            });
        }
        Some(outcome)
    }

    /// One active-probe pass: replay fresh evidence, then probe every entity.
    pub async fn probe_tick(self: &Arc<Self>) {
        let now = Utc::now();
        let evidence = self.evidence.read().clone();
        match evidence.replay(now).await {
            Ok(entries) => {
                let context = self.registry.fallback_context();
                for entry in entries {
                    if let Some(failure) = self.passive.observe(
                        &entry.text,
                        &context,
                        entry.at,
                        SignalKind::EvidenceReplay,
                    ) {
                        self.handle_failure(&failure);
                    }
                }
            }
            Err(e) => warn!("Cannot replay evidence from {}: {}", evidence.path().display(), e),
        }

        for id in self.registry.ids() {
            match self.probe.sample(&id).await {
                SignalOutcome::Healthy => {
                    debug!("Probe healthy for {}", id);
                    self.registry.record_recovery(id.as_str());
                }
                SignalOutcome::Failed(reason) => {
                    let failure =
                        FailureEvent::new(id, FailureKind::ProbeFailed, SignalKind::ActiveProbe, Utc::now())
                            .with_reason(reason);
                    self.handle_failure(&failure);
                }
                SignalOutcome::Unknown => {}
            }
        }
    }

    /// One status-endpoint poll, fanned out to every monitored entity on failure.
    pub async fn poll_tick(self: &Arc<Self>) {
        let Some(status) = self.status.read().clone() else {
            return;
        };
        match status.poll().await {
            SignalOutcome::Failed(reason) => {
                warn!("Status endpoint check failed: {}", reason);
                let at = Utc::now();
                for id in self.registry.ids() {
                    let failure =
                        FailureEvent::new(id, FailureKind::ServiceDown, SignalKind::StatusPoll, at)
                            .with_reason(reason.clone());
                    self.handle_failure(&failure);
                }
            }
            SignalOutcome::Healthy => debug!("Status endpoint healthy"),
            SignalOutcome::Unknown => debug!("Status endpoint unavailable"),
        }
    }

    // ---- admin-facing operations ----

    pub fn status(&self, now: DateTime<Utc>) -> StatusReport {
        let settings = self.settings.read();
        StatusReport {
            enabled: settings.enabled,
            running: self.is_running(),
            channel: self.notifier.sink().channel(),
            primary: self.registry.primary(),
            probe_attached: self.probe.is_attached(),
            status_url: self.status.read().as_ref().map(|s| s.url().to_string()),
            entities: self.registry.snapshots(now),
        }
    }

    pub fn add_entity(&self, entity: MonitoredEntity) -> bool {
        let mut settings = self.settings.write();
        settings.entities.retain(|e| e.id != entity.id);
        settings.entities.push(entity.clone());
        drop(settings);
        self.registry.add(entity)
    }

    pub fn remove_entity(&self, id: &str) -> bool {
        self.settings.write().entities.retain(|e| e.id.as_str() != id);
        let mut detected = self.detected.write();
        if detected.as_ref().is_some_and(|d| d.as_str() == id) {
            *detected = None;
        }
        drop(detected);
        self.registry.remove(id)
    }

    pub fn set_channel(&self, channel: &str) -> Result<(), DeliveryError> {
        self.notifier.sink().set_channel(channel)?;
        self.settings.write().pushplus.channel = channel.to_string();
        Ok(())
    }

    pub fn set_templates(&self, messages: MessageConfig) {
        let bot_name = {
            let mut settings = self.settings.write();
            settings.messages = messages.clone();
            settings.bot_name.clone()
        };
        self.notifier
            .set_renderer(MessageRenderer::new(messages, bot_name));
    }

    pub async fn send_test(&self, id: &EntityId) -> Result<DeliveryReceipt, DeliveryError> {
        self.notifier.send_test(id).await
    }

    /// Entity an admin command defaults to: the primary, else the first monitored.
    pub fn default_entity(&self) -> Option<EntityId> {
        self.registry
            .primary()
            .or_else(|| self.registry.ids().into_iter().next())
    }

    /// Sample the status endpoint and the active probe for `id` without recording.
    pub async fn diagnose(&self, id: &EntityId) -> Diagnostic {
        let status = self.status.read().clone();
        let status_poll = match status {
            Some(s) => Some(s.poll().await),
            None => None,
        };
        let probe = self.probe.sample(id).await;

        Diagnostic {
            entity: id.clone(),
            monitored: self.registry.contains(id.as_str()),
            status_poll,
            probe,
            snapshot: self.registry.snapshot(id.as_str(), Utc::now()),
            evidence_path: self.evidence.read().path().to_path_buf(),
        }
    }
}
