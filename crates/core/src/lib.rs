// RevSim - Multi-Core RISC-V Simulation Platform
// Copyright (C) 2026 RevSim Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod cpu;
pub mod decoder;
pub mod dispatch;
pub mod loader;
pub mod memory;
pub mod metrics;
pub mod scheduler;
pub mod snapshot;
pub mod transport;

use std::sync::Arc;

use cpu::{CoreFactory, CoreFault};
use dispatch::{Message, MessageDispatcher, MessageStats};
use loader::{ImageLoader, LoaderInfo};
use memory::{LinearMemory, MemoryHandle, ProgramImage};
use revsim_config::{SimConfig, SimOptions};
use scheduler::{CompletionTable, ExecutionScheduler};
use snapshot::{CoreSnapshot, SimulationSnapshot};
use transport::{EndpointId, EndpointResolver, TransportEndpoint};


#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(u64),
    #[error("Instruction decoding error at {0:#x}")]
    DecodeError(u64),
    #[error("Invalid simulation options: {0}")]
    InvalidConfig(String),
    #[error("Failed to allocate {size} bytes of simulated memory")]
    MemoryAllocation { size: u64 },
    #[error("Failed to load program image: {0}")]
    ImageLoad(String),
    #[error("Failed to initialize the {0} device")]
    EndpointUnresolved(EndpointId),
    #[error("Failed to construct core {core}: {reason}")]
    CoreConstruction { core: usize, reason: String },
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Trait for observing simulation events in a modular way.
pub trait SimulationObserver: std::fmt::Debug + Send + Sync {
    fn on_simulation_start(&self) {}
    /// Fired exactly once, on the cycle the last active core finished.
    fn on_simulation_stop(&self, _cycle: u64) {}
    fn on_cycle(&self, _cycle: u64) {}
    fn on_core_finished(&self, _core: usize, _cycle: u64) {}
}

/// Trait representing byte-addressable simulated memory
pub trait Bus {
    fn read_u8(&self, addr: u64) -> SimResult<u8>;
    fn write_u8(&mut self, addr: u64, value: u8) -> SimResult<()>;

    fn read_u16(&self, addr: u64) -> SimResult<u16> {
        let b0 = self.read_u8(addr)? as u16;
        let b1 = self.read_u8(addr + 1)? as u16;
        // Little Endian
        Ok(b0 | (b1 << 8))
    }

    fn read_u32(&self, addr: u64) -> SimResult<u32> {
        let b0 = self.read_u8(addr)? as u32;
        let b1 = self.read_u8(addr + 1)? as u32;
        let b2 = self.read_u8(addr + 2)? as u32;
        let b3 = self.read_u8(addr + 3)? as u32;
        Ok(b0 | (b1 << 8) | (b2 << 16) | (b3 << 24))
    }

    fn write_u32(&mut self, addr: u64, value: u32) -> SimResult<()> {
        self.write_u8(addr, (value & 0xFF) as u8)?;
        self.write_u8(addr + 1, ((value >> 8) & 0xFF) as u8)?;
        self.write_u8(addr + 2, ((value >> 16) & 0xFF) as u8)?;
        self.write_u8(addr + 3, ((value >> 24) & 0xFF) as u8)?;
        Ok(())
    }

    fn write_u16(&mut self, addr: u64, value: u16) -> SimResult<()> {
        self.write_u8(addr, (value & 0xFF) as u8)?;
        self.write_u8(addr + 1, ((value >> 8) & 0xFF) as u8)?;
        Ok(())
    }
}

const SPLASH: &str = r"
  ____            ____  _
 |  _ \ _____   _/ ___|(_)_ __ ___
 | |_) / _ \ \ / |___ \| | '_ ` _ \
 |  _ <  __/\ V / ___) | | | | | | |
 |_| \_\___| \_/ |____/|_|_| |_| |_|
";

/// A fully constructed multi-core simulation.
///
/// Lifecycle, as driven by the host: [`Simulation::construct`], then
/// [`Simulation::setup`], then [`Simulation::init`] once per phase, then
/// [`Simulation::advance_cycle`] on every clock tick with
/// [`Simulation::on_message`] interleaved at any point, and finally
/// [`Simulation::teardown`].
pub struct Simulation {
    scheduler: ExecutionScheduler,
    dispatcher: MessageDispatcher,
    endpoints: Vec<Box<dyn TransportEndpoint>>,
    memory: MemoryHandle,
    loader: ImageLoader,
    options: Arc<SimOptions>,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("scheduler", &self.scheduler)
            .field("endpoints", &self.endpoints)
            .field("memory_size", &self.memory.size())
            .field("program", &self.loader.program())
            .finish()
    }
}

impl Simulation {
    /// Builds memory, the placed program, every core and every enabled
    /// transport endpoint. Any failure drops whatever was already built.
    pub fn construct(
        options: Arc<SimOptions>,
        image: &ProgramImage,
        resolver: &dyn EndpointResolver,
        factory: &dyn CoreFactory,
    ) -> SimResult<Self> {
        options
            .validate()
            .map_err(|e| SimulationError::InvalidConfig(e.to_string()))?;
        let num_cores = options.num_cores();
        tracing::info!(
            "Building simulation: {} core(s), {} bytes of memory at {:#x}",
            num_cores,
            options.mem_size,
            options.mem_base
        );

        let memory = MemoryHandle::new(LinearMemory::try_new(options.mem_size, options.mem_base)?);
        let loader = ImageLoader::place(&memory, image, &options.program, &options.args)?;

        let mut cores = Vec::with_capacity(num_cores);
        for i in 0..num_cores {
            let core = factory.build(i, &options, &memory, &loader)?;
            if core.index() != i {
                return Err(SimulationError::CoreConstruction {
                    core: i,
                    reason: format!("factory returned core with index {}", core.index()),
                });
            }
            tracing::debug!("Created core {}", i);
            cores.push(core);
        }

        let mut endpoints: Vec<Box<dyn TransportEndpoint>> = Vec::new();
        for id in EndpointId::ALL {
            if !options.features.contains(id.feature()) {
                continue;
            }
            let endpoint = resolver
                .resolve(id)
                .ok_or(SimulationError::EndpointUnresolved(id))?;
            tracing::info!("Loaded {} endpoint", id);
            endpoints.push(endpoint);
        }

        if options.splash {
            tracing::info!("{}", SPLASH);
        }
        tracing::info!("Initialization of {} core(s) complete", num_cores);

        Ok(Self {
            scheduler: ExecutionScheduler::new(cores),
            dispatcher: MessageDispatcher::new(),
            endpoints,
            memory,
            loader,
            options,
        })
    }

    /// Resolves `config` and constructs from the result.
    pub fn from_config(
        config: &SimConfig,
        image: &ProgramImage,
        resolver: &dyn EndpointResolver,
        factory: &dyn CoreFactory,
    ) -> SimResult<Self> {
        let options = config
            .resolve()
            .map_err(|e| SimulationError::InvalidConfig(format!("{:#}", e)))?;
        Self::construct(Arc::new(options), image, resolver, factory)
    }

    /// Hands every enabled endpoint the sink it delivers messages through.
    pub fn setup(&mut self) {
        for endpoint in &mut self.endpoints {
            let sink = self.dispatcher.sink(endpoint.id());
            endpoint.setup(sink);
        }
    }

    pub fn init(&mut self, phase: u32) {
        tracing::debug!("Init phase {}", phase);
        for endpoint in &mut self.endpoints {
            endpoint.init(phase);
        }
    }

    /// One clock tick. Returns `true` once every core has finished.
    pub fn advance_cycle(&mut self, cycle: u64) -> bool {
        self.scheduler.advance_cycle(cycle)
    }

    pub fn on_message(&mut self, endpoint: EndpointId, message: Message) {
        self.dispatcher.on_message(endpoint, message);
    }

    /// Routes every message the endpoints have queued so far.
    pub fn pump_messages(&mut self) -> usize {
        self.dispatcher.pump()
    }

    /// Releases the completion table, the cores, the endpoints, then the
    /// memory and loader, in that order.
    pub fn teardown(self) {
        let Simulation {
            scheduler,
            dispatcher,
            endpoints,
            memory,
            loader,
            options,
        } = self;

        let (table, cores) = scheduler.into_parts();
        drop(table);
        drop(cores);
        drop(endpoints);
        drop(dispatcher);
        drop(memory);
        drop(loader);
        drop(options);
        tracing::debug!("Simulation torn down");
    }

    pub fn add_observer(&mut self, observer: Arc<dyn SimulationObserver>) {
        self.scheduler.add_observer(observer);
    }

    pub fn completion(&self) -> &CompletionTable {
        self.scheduler.completion()
    }

    pub fn num_cores(&self) -> usize {
        self.scheduler.cores().len()
    }

    pub fn stop_signaled(&self) -> bool {
        self.scheduler.stop_signaled()
    }

    pub fn stop_cycle(&self) -> Option<u64> {
        self.scheduler.stop_cycle()
    }

    pub fn faults(&self) -> Vec<&CoreFault> {
        self.scheduler
            .cores()
            .iter()
            .filter_map(|c| c.fault())
            .collect()
    }

    pub fn exit_codes(&self) -> Vec<Option<u32>> {
        self.scheduler
            .cores()
            .iter()
            .map(|c| c.exit_code())
            .collect()
    }

    pub fn message_stats(&self) -> MessageStats {
        self.dispatcher.stats()
    }

    pub fn options(&self) -> &SimOptions {
        &self.options
    }

    pub fn loader_info(&self) -> LoaderInfo {
        self.loader.info()
    }

    pub fn memory(&self) -> &MemoryHandle {
        &self.memory
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        let table = self.scheduler.completion();
        let cores = self
            .scheduler
            .cores()
            .iter()
            .map(|c| CoreSnapshot {
                index: c.index(),
                active: table.is_active(c.index()),
                pc: c.pc(),
                retired: c.retired(),
                exit_code: c.exit_code(),
                fault: c.fault().map(|f| f.to_string()),
            })
            .collect();
        SimulationSnapshot {
            stop_cycle: self.scheduler.stop_cycle(),
            cores,
            messages: self.dispatcher.stats(),
        }
    }
}
