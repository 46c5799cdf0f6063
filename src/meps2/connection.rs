//! MePS2 serial connection management
//!
//! This module handles the serial side of a receiver: enumerating ports,
//! opening a port and running its reader task, and the events a reader
//! sends back to the central loop.

use crate::backend::{OutputSink, SinkError};
use crate::manager::{Connector, Discovery};
use crate::meps2::types::EndpointId;
use futures::stream::StreamExt;
use log::{debug, info, trace, warn};
use std::collections::HashSet;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_serial::{DataBits, Parity, SerialStream, StopBits};
use tokio_util::codec::{BytesCodec, FramedRead};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("Failed to create sink: {0}")]
    Sink(#[from] SinkError),

    #[error("Port enumeration failed: {0}")]
    Discovery(String),
}

/// What a reader task reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Bytes(Vec<u8>),
    Closed(String),
}

/// Event from one connection, tagged with the generation it was opened under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub endpoint: EndpointId,
    pub generation: u64,
    pub kind: TransportEventKind,
}

/// Sending side handed to a transport when it is opened
#[derive(Debug, Clone)]
pub struct EndpointEvents {
    endpoint: EndpointId,
    generation: u64,
    tx: UnboundedSender<TransportEvent>,
}

impl EndpointEvents {
    pub fn new(endpoint: EndpointId, generation: u64, tx: UnboundedSender<TransportEvent>) -> Self {
        Self { endpoint, generation, tx }
    }

    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    /// Forward received bytes. Returns false once the loop has gone away.
    pub fn bytes(&self, bytes: Vec<u8>) -> bool {
        self.send(TransportEventKind::Bytes(bytes))
    }

    /// Report that the connection ended
    pub fn closed(&self, reason: impl Into<String>) -> bool {
        self.send(TransportEventKind::Closed(reason.into()))
    }

    fn send(&self, kind: TransportEventKind) -> bool {
        self.tx
            .send(TransportEvent {
                endpoint: self.endpoint.clone(),
                generation: self.generation,
                kind,
            })
            .is_ok()
    }
}

/// Owner's handle on an open transport; closing (or dropping) it stops the reader
#[derive(Debug, Default)]
pub struct TransportHandle {
    cancel: Option<CancellationToken>,
}

impl TransportHandle {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel: Some(cancel) }
    }

    /// Handle with no reader behind it
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| !c.is_cancelled())
    }

    pub fn close(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Open a serial port (8N1) in the background and read from it.
///
/// The open itself runs on the blocking pool, so this returns at once. A port
/// that cannot be opened is reported through `events` as closed, with the
/// error as the reason. Must be called from within a tokio runtime.
pub fn open_serial(events: EndpointEvents, baud_rate: u32) -> TransportHandle {
    let builder = tokio_serial::new(events.endpoint().as_str(), baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One);

    let cancel = CancellationToken::new();
    let reader_cancel = cancel.clone();
    tokio::spawn(async move {
        let opened = tokio::select! {
            _ = reader_cancel.cancelled() => return,
            opened = tokio::task::spawn_blocking(move || SerialStream::open(&builder)) => opened,
        };
        let stream = match opened {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!("❌ Cannot open {}: {}", events.endpoint(), e);
                events.closed(format!("open failed: {}", e));
                return;
            }
            Err(e) => {
                events.closed(format!("open task failed: {}", e));
                return;
            }
        };
        info!("✓ Opened {} @ {} baud", events.endpoint(), baud_rate);

        let mut reader = FramedRead::new(stream, BytesCodec::new());
        let reason = loop {
            tokio::select! {
                _ = reader_cancel.cancelled() => break None,
                next = reader.next() => match next {
                    Some(Ok(chunk)) => {
                        trace!("[{}] {} bytes", events.endpoint(), chunk.len());
                        if !events.bytes(chunk.to_vec()) {
                            break None;
                        }
                    }
                    Some(Err(e)) => break Some(e.to_string()),
                    None => break Some("end of stream".to_string()),
                },
            }
        };
        match reason {
            Some(reason) => {
                events.closed(reason);
            }
            None => debug!("[{}] reader stopped", events.endpoint()),
        }
    });

    TransportHandle::new(cancel)
}

/// Lists serial ports known to the OS, optionally restricted to an allow-list
#[derive(Debug, Clone, Default)]
pub struct SerialDiscovery {
    allow: HashSet<EndpointId>,
}

impl SerialDiscovery {
    pub fn new(allow: impl IntoIterator<Item = EndpointId>) -> Self {
        Self { allow: allow.into_iter().collect() }
    }
}

impl Discovery for SerialDiscovery {
    fn list_endpoints(&self) -> Result<HashSet<EndpointId>, ConnectionError> {
        let ports = tokio_serial::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|port| EndpointId::new(port.port_name))
            .filter(|id| self.allow.is_empty() || self.allow.contains(id))
            .collect())
    }
}

/// Fixed endpoint set
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    endpoints: HashSet<EndpointId>,
}

impl StaticDiscovery {
    pub fn new(endpoints: impl IntoIterator<Item = EndpointId>) -> Self {
        Self { endpoints: endpoints.into_iter().collect() }
    }
}

impl Discovery for StaticDiscovery {
    fn list_endpoints(&self) -> Result<HashSet<EndpointId>, ConnectionError> {
        Ok(self.endpoints.clone())
    }
}

/// Opens endpoints as serial ports and builds a sink for each
pub struct SerialConnector<F> {
    baud_rate: u32,
    make_sink: F,
}

impl<F, S> SerialConnector<F>
where
    F: FnMut(&EndpointId) -> Result<S, SinkError>,
    S: OutputSink,
{
    pub fn new(baud_rate: u32, make_sink: F) -> Self {
        Self { baud_rate, make_sink }
    }
}

impl<F, S> Connector for SerialConnector<F>
where
    F: FnMut(&EndpointId) -> Result<S, SinkError>,
    S: OutputSink,
{
    type Sink = S;

    fn connect(&mut self, events: EndpointEvents) -> Result<(TransportHandle, S), ConnectionError> {
        // Build the sink first so a sink failure never leaves a reader running
        let sink = (self.make_sink)(events.endpoint())?;
        Ok((open_serial(events, self.baud_rate), sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn test_endpoint_events_are_tagged() {
        let (tx, mut rx) = unbounded_channel();
        let events = EndpointEvents::new(EndpointId::from("COM5"), 7, tx);
        assert!(events.bytes(vec![1, 2, 3]));
        assert!(events.closed("unplugged"));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.endpoint, EndpointId::from("COM5"));
        assert_eq!(first.generation, 7);
        assert_eq!(first.kind, TransportEventKind::Bytes(vec![1, 2, 3]));
        assert_eq!(
            rx.try_recv().unwrap().kind,
            TransportEventKind::Closed("unplugged".to_string())
        );
    }

    #[test]
    fn test_events_report_dropped_receiver() {
        let (tx, rx) = unbounded_channel();
        let events = EndpointEvents::new(EndpointId::from("COM5"), 0, tx);
        drop(rx);
        assert!(!events.bytes(vec![0xFF]));
    }

    #[test]
    fn test_transport_handle_close_cancels() {
        let token = CancellationToken::new();
        let mut handle = TransportHandle::new(token.clone());
        assert!(handle.is_open());
        handle.close();
        assert!(token.is_cancelled());
        assert!(!handle.is_open());
        // Second close is a no-op
        handle.close();
        assert!(!TransportHandle::detached().is_open());
    }

    #[test]
    fn test_dropping_handle_cancels() {
        let token = CancellationToken::new();
        drop(TransportHandle::new(token.clone()));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_connect_does_not_wait_for_open() {
        let (tx, mut rx) = unbounded_channel();
        let mut connector = SerialConnector::new(115_200, |endpoint: &EndpointId| {
            Ok(crate::backend::LogSink::new(endpoint.clone()))
        });
        let events = EndpointEvents::new(EndpointId::from("/nonexistent/meps2-port"), 3, tx);

        let (handle, _sink) = connector.connect(events).unwrap();
        assert!(handle.is_open());

        // The failed open arrives later as a close event for the same generation
        let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.generation, 3);
        match event.kind {
            TransportEventKind::Closed(reason) => assert!(reason.starts_with("open failed")),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_static_discovery() {
        let discovery = StaticDiscovery::new([EndpointId::from("COM3"), EndpointId::from("COM4")]);
        let endpoints = discovery.list_endpoints().unwrap();
        assert_eq!(endpoints.len(), 2);
        assert!(endpoints.contains(&EndpointId::from("COM4")));
    }
}
