// RevSim - Multi-Core RISC-V Simulation Platform
// Copyright (C) 2026 RevSim Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod riscv;

use crate::loader::ImageLoader;
use crate::memory::MemoryHandle;
use crate::{SimResult, SimulationError};
use revsim_config::SimOptions;

pub use riscv::RevCore;

/// Liveness reported by a core after one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreStatus {
    Active,
    Finished,
}

/// A fault a core hit while executing. The core stops and reports
/// `Finished`; the host decides what the fault means for the run.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreFault {
    pub core: usize,
    pub cycle: u64,
    pub pc: u64,
    pub error: SimulationError,
}

impl std::fmt::Display for CoreFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "core {} faulted at cycle {} (pc={:#x}): {}",
            self.core, self.cycle, self.pc, self.error
        )
    }
}

/// One simulated processor core.
pub trait Core: std::fmt::Debug {
    /// Dense 0-based position of this core in every per-core table.
    fn index(&self) -> usize;

    /// Advances the core by one clock cycle.
    fn advance_one_cycle(&mut self, cycle: u64) -> CoreStatus;

    fn pc(&self) -> u64 {
        0
    }
    fn retired(&self) -> u64 {
        0
    }
    fn exit_code(&self) -> Option<u32> {
        None
    }
    fn fault(&self) -> Option<&CoreFault> {
        None
    }
}

/// Builds the core for one index. Called once per core, in index order.
pub trait CoreFactory {
    fn build(
        &self,
        index: usize,
        options: &SimOptions,
        memory: &MemoryHandle,
        loader: &ImageLoader,
    ) -> SimResult<Box<dyn Core>>;
}

/// Factory for the built-in RV32IM core.
#[derive(Debug, Default, Clone, Copy)]
pub struct RevCoreFactory;

impl CoreFactory for RevCoreFactory {
    fn build(
        &self,
        index: usize,
        options: &SimOptions,
        memory: &MemoryHandle,
        loader: &ImageLoader,
    ) -> SimResult<Box<dyn Core>> {
        let core_opts = options
            .core(index)
            .ok_or_else(|| SimulationError::CoreConstruction {
                core: index,
                reason: "no options for this core".to_string(),
            })?;
        Ok(Box::new(RevCore::new(
            index,
            core_opts.clone(),
            memory.clone(),
            loader.info(),
        )?))
    }
}
