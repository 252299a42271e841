// RevSim - Multi-Core RISC-V Simulation Platform
// Copyright (C) 2026 RevSim Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Inbound message intake for the transport endpoints.

use crate::transport::EndpointId;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Opaque message payload handed over by a transport endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    payload: Arc<[u8]>,
}

impl Message {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = payload.into();
        Self {
            payload: bytes.into(),
        }
    }

    pub fn from_shared(payload: Arc<[u8]>) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageStats {
    pub nic_messages: u64,
    pub pan_messages: u64,
    pub bytes: u64,
}

impl MessageStats {
    pub fn total(&self) -> u64 {
        self.nic_messages + self.pan_messages
    }
}

/// Non-blocking handle an endpoint uses to deliver messages, possibly
/// from another thread.
#[derive(Debug, Clone)]
pub struct MessageSink {
    endpoint: EndpointId,
    tx: Sender<(EndpointId, Message)>,
}

impl MessageSink {
    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    /// Queues `message` for the dispatcher. Returns `false` if the
    /// simulation has already been torn down.
    pub fn deliver(&self, message: Message) -> bool {
        match self.tx.try_send((self.endpoint, message)) {
            Ok(()) => true,
            Err(e) => {
                tracing::trace!("{} message dropped: {}", self.endpoint, e);
                false
            }
        }
    }
}

/// Consumes message notifications, routed purely by which endpoint
/// produced them. Payload contents are not interpreted here.
#[derive(Debug)]
pub struct MessageDispatcher {
    stats: MessageStats,
    tx: Sender<(EndpointId, Message)>,
    inbox: Receiver<(EndpointId, Message)>,
}

impl Default for MessageDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageDispatcher {
    pub fn new() -> Self {
        let (tx, inbox) = crossbeam_channel::unbounded();
        Self {
            stats: MessageStats::default(),
            tx,
            inbox,
        }
    }

    pub fn sink(&self, endpoint: EndpointId) -> MessageSink {
        MessageSink {
            endpoint,
            tx: self.tx.clone(),
        }
    }

    /// Takes ownership of `message` and releases it before returning.
    pub fn on_message(&mut self, endpoint: EndpointId, message: Message) {
        match endpoint {
            EndpointId::Nic => self.consume_nic(message),
            EndpointId::Pan => self.consume_pan(message),
        }
    }

    fn consume_nic(&mut self, message: Message) {
        self.stats.nic_messages += 1;
        self.release(EndpointId::Nic, message);
    }

    fn consume_pan(&mut self, message: Message) {
        self.stats.pan_messages += 1;
        self.release(EndpointId::Pan, message);
    }

    fn release(&mut self, endpoint: EndpointId, message: Message) {
        self.stats.bytes += message.len() as u64;
        tracing::trace!("{} message: {} bytes", endpoint, message.len());
        drop(message);
    }

    /// Routes every queued message without waiting for more.
    pub fn pump(&mut self) -> usize {
        let mut routed = 0;
        loop {
            match self.inbox.try_recv() {
                Ok((endpoint, message)) => {
                    self.on_message(endpoint, message);
                    routed += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        routed
    }

    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    pub fn stats(&self) -> MessageStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_message_releases_payload() {
        let mut dispatcher = MessageDispatcher::new();
        let shared: Arc<[u8]> = Arc::from(vec![1u8, 2, 3]);

        dispatcher.on_message(EndpointId::Nic, Message::from_shared(shared.clone()));
        assert_eq!(Arc::strong_count(&shared), 1);

        dispatcher.on_message(EndpointId::Pan, Message::from_shared(shared.clone()));
        assert_eq!(Arc::strong_count(&shared), 1);

        let stats = dispatcher.stats();
        assert_eq!(stats.nic_messages, 1);
        assert_eq!(stats.pan_messages, 1);
        assert_eq!(stats.bytes, 6);
    }

    #[test]
    fn test_empty_payload_accepted() {
        let mut dispatcher = MessageDispatcher::new();
        let msg = Message::new(Vec::new());
        assert!(msg.is_empty());
        dispatcher.on_message(EndpointId::Pan, msg);
        assert_eq!(dispatcher.stats().pan_messages, 1);
        assert_eq!(dispatcher.stats().bytes, 0);
    }

    #[test]
    fn test_sink_delivery_from_other_thread() {
        let mut dispatcher = MessageDispatcher::new();
        let sink = dispatcher.sink(EndpointId::Pan);

        let handle = std::thread::spawn(move || {
            for i in 0..10u8 {
                assert!(sink.deliver(Message::new(vec![i])));
            }
        });
        handle.join().unwrap();

        assert_eq!(dispatcher.pending(), 10);
        assert_eq!(dispatcher.pump(), 10);
        assert_eq!(dispatcher.pump(), 0);
        assert_eq!(dispatcher.stats().pan_messages, 10);
        assert_eq!(dispatcher.stats().nic_messages, 0);
    }

    #[test]
    fn test_sink_after_dispatcher_dropped() {
        let dispatcher = MessageDispatcher::new();
        let sink = dispatcher.sink(EndpointId::Nic);
        drop(dispatcher);
        assert!(!sink.deliver(Message::new(b"late".to_vec())));
    }
}
