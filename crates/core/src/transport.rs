// RevSim - Multi-Core RISC-V Simulation Platform
// Copyright (C) 2026 RevSim Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::dispatch::{Message, MessageSink};
use revsim_config::Features;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Identity of a transport endpoint slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointId {
    /// Network interface controller.
    Nic,
    /// PAN network endpoint.
    Pan,
}

impl EndpointId {
    pub const ALL: [EndpointId; 2] = [EndpointId::Nic, EndpointId::Pan];

    /// Feature flag that enables this endpoint.
    pub fn feature(self) -> Features {
        match self {
            EndpointId::Nic => Features::NIC,
            EndpointId::Pan => Features::PAN,
        }
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointId::Nic => write!(f, "NIC"),
            EndpointId::Pan => write!(f, "PAN NIC"),
        }
    }
}

/// A message-delivery channel with its own setup/init lifecycle.
pub trait TransportEndpoint: std::fmt::Debug + Send {
    fn id(&self) -> EndpointId;

    /// Called once after construction. The endpoint keeps `sink` and delivers
    /// every arriving message through it.
    fn setup(&mut self, sink: MessageSink);

    /// Called once per initialization phase, phases ascending from 0.
    fn init(&mut self, phase: u32);
}

/// Resolves the concrete endpoint for an enabled slot.
pub trait EndpointResolver {
    fn resolve(&self, id: EndpointId) -> Option<Box<dyn TransportEndpoint>>;
}

type EndpointFactory = Box<dyn Fn() -> Box<dyn TransportEndpoint>>;

/// Resolver backed by registered constructors.
#[derive(Default)]
pub struct EndpointRegistry {
    factories: HashMap<EndpointId, EndpointFactory>,
}

impl std::fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("registered", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, id: EndpointId, factory: F)
    where
        F: Fn() -> Box<dyn TransportEndpoint> + 'static,
    {
        self.factories.insert(id, Box::new(factory));
    }

    /// Registry offering a [`LoopbackEndpoint`] for every slot.
    pub fn with_loopback() -> Self {
        let mut registry = Self::new();
        for id in EndpointId::ALL {
            registry.register(id, move || -> Box<dyn TransportEndpoint> {
                Box::new(LoopbackEndpoint::new(id))
            });
        }
        registry
    }
}

impl EndpointResolver for EndpointRegistry {
    fn resolve(&self, id: EndpointId) -> Option<Box<dyn TransportEndpoint>> {
        self.factories.get(&id).map(|factory| factory())
    }
}

#[derive(Debug, Default)]
struct LoopbackState {
    setup_calls: u32,
    phases: Vec<u32>,
    sink: Option<MessageSink>,
}

/// In-process endpoint: records its lifecycle calls and lets the owner
/// inject messages through a [`LoopbackHandle`].
#[derive(Debug)]
pub struct LoopbackEndpoint {
    id: EndpointId,
    state: Arc<Mutex<LoopbackState>>,
}

/// Observer/injector for a [`LoopbackEndpoint`] that has been moved into a
/// simulation.
#[derive(Debug, Clone)]
pub struct LoopbackHandle {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackEndpoint {
    pub fn new(id: EndpointId) -> Self {
        Self {
            id,
            state: Arc::new(Mutex::new(LoopbackState::default())),
        }
    }

    pub fn handle(&self) -> LoopbackHandle {
        LoopbackHandle {
            state: self.state.clone(),
        }
    }
}

impl TransportEndpoint for LoopbackEndpoint {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn setup(&mut self, sink: MessageSink) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.setup_calls += 1;
        state.sink = Some(sink);
        tracing::debug!("{} endpoint setup", self.id);
    }

    fn init(&mut self, phase: u32) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.phases.push(phase);
        tracing::debug!("{} endpoint init phase {}", self.id, phase);
    }
}

impl LoopbackHandle {
    pub fn setup_calls(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .setup_calls
    }

    pub fn phases(&self) -> Vec<u32> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .phases
            .clone()
    }

    /// Delivers `message` as if it arrived on the wire. Returns `false`
    /// before `setup` or after the simulation is gone.
    pub fn inject(&self, message: Message) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &state.sink {
            Some(sink) => sink.deliver(message),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_resolves_only_registered() {
        let mut registry = EndpointRegistry::new();
        registry.register(EndpointId::Nic, || -> Box<dyn TransportEndpoint> {
            Box::new(LoopbackEndpoint::new(EndpointId::Nic))
        });

        let nic = registry.resolve(EndpointId::Nic).unwrap();
        assert_eq!(nic.id(), EndpointId::Nic);
        assert!(registry.resolve(EndpointId::Pan).is_none());
    }

    #[test]
    fn test_loopback_injection_requires_setup() {
        let endpoint = LoopbackEndpoint::new(EndpointId::Pan);
        let handle = endpoint.handle();
        assert!(!handle.inject(Message::new(vec![1])));
        assert_eq!(handle.setup_calls(), 0);
    }

    #[test]
    fn test_feature_mapping() {
        assert_eq!(EndpointId::Nic.feature(), Features::NIC);
        assert_eq!(EndpointId::Pan.feature(), Features::PAN);
        assert_eq!(EndpointId::Pan.to_string(), "PAN NIC");
    }
}
