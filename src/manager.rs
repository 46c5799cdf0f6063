//! Session registry and bridge loop
//!
//! The registry owns every live [`DeviceSession`], keyed by endpoint. It is
//! driven by one task: transport events, stale-check ticks and periodic
//! reconciliation against the discovered endpoint list all arrive through
//! [`Bridge::run`], so the session map is never shared.

use crate::backend::OutputSink;
use crate::meps2::connection::{
    ConnectionError, EndpointEvents, TransportEvent, TransportEventKind, TransportHandle,
};
use crate::meps2::constants::{DEFAULT_SCAN_INTERVAL_MS, DEFAULT_TICK_INTERVAL_MS};
use crate::meps2::types::EndpointId;
use crate::session::{DeviceSession, SessionOptions};
use log::{debug, info, trace, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::MissedTickBehavior;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Failed to open {endpoint}: {source}")]
    Open {
        endpoint: EndpointId,
        #[source]
        source: ConnectionError,
    },
}

/// Lists the endpoints currently available
pub trait Discovery: Send + Sync + 'static {
    fn list_endpoints(&self) -> Result<HashSet<EndpointId>, ConnectionError>;
}

/// Opens a transport and a sink for an endpoint
pub trait Connector {
    type Sink: OutputSink;

    /// Called on the loop task, so it must not block. The transport reports
    /// bytes and closure (including a failed open) through `events`.
    fn connect(
        &mut self,
        events: EndpointEvents,
    ) -> Result<(TransportHandle, Self::Sink), ConnectionError>;
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub opened: Vec<EndpointId>,
    pub closed: Vec<EndpointId>,
    pub failed: Vec<EndpointId>,
}

struct LiveSession<S: OutputSink> {
    generation: u64,
    session: DeviceSession<S>,
    transport: TransportHandle,
}

impl<S: OutputSink> LiveSession<S> {
    fn teardown(mut self, reason: &str) {
        self.session.close(reason);
        self.transport.close();
    }
}

/// Live sessions, one per endpoint
pub struct SessionRegistry<S: OutputSink> {
    sessions: HashMap<EndpointId, LiveSession<S>>,
    options: SessionOptions,
    next_generation: u64,
}

impl<S: OutputSink> SessionRegistry<S> {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            sessions: HashMap::new(),
            options,
            next_generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, endpoint: &EndpointId) -> bool {
        self.sessions.contains_key(endpoint)
    }

    /// Endpoints with a live session, sorted
    pub fn endpoints(&self) -> Vec<EndpointId> {
        let mut endpoints: Vec<_> = self.sessions.keys().cloned().collect();
        endpoints.sort();
        endpoints
    }

    pub fn session(&self, endpoint: &EndpointId) -> Option<&DeviceSession<S>> {
        self.sessions.get(endpoint).map(|live| &live.session)
    }

    pub fn session_mut(&mut self, endpoint: &EndpointId) -> Option<&mut DeviceSession<S>> {
        self.sessions.get_mut(endpoint).map(|live| &mut live.session)
    }

    /// Open sessions for new endpoints and tear down vanished ones
    pub fn reconcile<C>(
        &mut self,
        discovered: &HashSet<EndpointId>,
        connector: &mut C,
        tx: &UnboundedSender<TransportEvent>,
    ) -> ReconcileReport
    where
        C: Connector<Sink = S>,
    {
        let mut report = ReconcileReport::default();

        let mut gone: Vec<EndpointId> = self
            .sessions
            .keys()
            .filter(|endpoint| !discovered.contains(*endpoint))
            .cloned()
            .collect();
        gone.sort();
        for endpoint in gone {
            info!("➖ Device removed: {}", endpoint);
            if let Some(live) = self.sessions.remove(&endpoint) {
                live.teardown("endpoint removed");
            }
            report.closed.push(endpoint);
        }

        let mut new: Vec<&EndpointId> = discovered
            .iter()
            .filter(|endpoint| !self.sessions.contains_key(*endpoint))
            .collect();
        new.sort();
        for endpoint in new {
            let generation = self.next_generation;
            self.next_generation += 1;

            let events = EndpointEvents::new(endpoint.clone(), generation, tx.clone());
            match connector.connect(events) {
                Ok((transport, sink)) => {
                    info!("➕ New device: {}", endpoint);
                    let session = DeviceSession::new(endpoint.clone(), sink, &self.options);
                    self.sessions.insert(
                        endpoint.clone(),
                        LiveSession { generation, session, transport },
                    );
                    report.opened.push(endpoint.clone());
                }
                Err(source) => {
                    let err = BridgeError::Open { endpoint: endpoint.clone(), source };
                    warn!("❌ {} (retrying next scan)", err);
                    report.failed.push(endpoint.clone());
                }
            }
        }

        if !report.opened.is_empty() || !report.closed.is_empty() {
            debug!(
                "Reconciled: +{} -{} !{} ({} live)",
                report.opened.len(),
                report.closed.len(),
                report.failed.len(),
                self.sessions.len()
            );
        }
        report
    }

    /// Route a transport event to its session, ignoring events from older connections
    pub fn handle_event(&mut self, event: TransportEvent, now: Instant) {
        let current = self
            .sessions
            .get(&event.endpoint)
            .is_some_and(|live| live.generation == event.generation);
        if !current {
            trace!("Ignoring event from stale connection to {}", event.endpoint);
            return;
        }

        match event.kind {
            TransportEventKind::Bytes(bytes) => {
                self.on_bytes(&event.endpoint, &bytes, now);
            }
            TransportEventKind::Closed(reason) => {
                self.on_closed(&event.endpoint, &reason);
            }
        }
    }

    /// Feed bytes to a session. Returns the number of frames applied.
    pub fn on_bytes(&mut self, endpoint: &EndpointId, bytes: &[u8], now: Instant) -> usize {
        match self.sessions.get_mut(endpoint) {
            Some(live) => live.session.on_bytes(bytes, now),
            None => 0,
        }
    }

    /// Tear down and forget a session whose transport ended
    pub fn on_closed(&mut self, endpoint: &EndpointId, reason: &str) -> bool {
        match self.sessions.remove(endpoint) {
            Some(live) => {
                info!("⚠️ Disconnected: {} ({})", endpoint, reason);
                live.teardown(reason);
                true
            }
            None => false,
        }
    }

    /// Run stale checks on every session
    pub fn tick(&mut self, now: Instant) {
        for live in self.sessions.values_mut() {
            if live.session.tick(now) {
                info!("[{}] no data, output reset to neutral", live.session.endpoint());
            }
        }
    }

    /// Tear down every session
    pub fn shutdown(&mut self) {
        for (_, live) in self.sessions.drain() {
            live.teardown("shutdown");
        }
    }
}

impl<S: OutputSink> Drop for SessionRegistry<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Loop timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeTiming {
    pub scan_interval: Duration,
    pub tick_interval: Duration,
}

impl Default for BridgeTiming {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_millis(DEFAULT_SCAN_INTERVAL_MS),
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
        }
    }
}

/// Central loop tying discovery, transports and the registry together
pub struct Bridge<D: Discovery, C: Connector> {
    discovery: Arc<D>,
    connector: C,
    registry: SessionRegistry<C::Sink>,
    timing: BridgeTiming,
    tx: UnboundedSender<TransportEvent>,
    rx: UnboundedReceiver<TransportEvent>,
}

impl<D: Discovery, C: Connector> Bridge<D, C> {
    pub fn new(discovery: D, connector: C, options: SessionOptions, timing: BridgeTiming) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            discovery: Arc::new(discovery),
            connector,
            registry: SessionRegistry::new(options),
            timing,
            tx,
            rx,
        }
    }

    pub fn registry(&self) -> &SessionRegistry<C::Sink> {
        &self.registry
    }

    /// Run until `shutdown` is cancelled, then tear down every session
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Bridge started, scanning every {:?}", self.timing.scan_interval);

        let mut scan = tokio::time::interval(self.timing.scan_interval);
        scan.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stale = tokio::time::interval(self.timing.tick_interval);
        stale.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(event) = self.rx.recv() => {
                    self.registry.handle_event(event, Instant::now());
                }
                _ = scan.tick() => {
                    match self.discover().await {
                        Ok(discovered) => {
                            self.registry.reconcile(&discovered, &mut self.connector, &self.tx);
                        }
                        Err(e) => warn!("Endpoint scan failed: {}", e),
                    }
                }
                _ = stale.tick() => {
                    self.registry.tick(Instant::now());
                }
            }
        }

        info!("Shutting down, closing {} session(s)", self.registry.len());
        self.registry.shutdown();
        info!("✓ Bridge stopped");
    }

    async fn discover(&self) -> Result<HashSet<EndpointId>, ConnectionError> {
        let discovery = Arc::clone(&self.discovery);
        tokio::task::spawn_blocking(move || discovery.list_endpoints())
            .await
            .map_err(|e| ConnectionError::Discovery(e.to_string()))?
    }
}
