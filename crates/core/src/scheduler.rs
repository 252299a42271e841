// RevSim - Multi-Core RISC-V Simulation Platform
// Copyright (C) 2026 RevSim Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Clock-driven multi-core scheduling and completion detection.

use crate::cpu::{Core, CoreStatus};
use crate::SimulationObserver;
use std::sync::Arc;

/// Per-core liveness, indexed by core index.
///
/// An entry starts `true` and flips to `false` at most once, when its core
/// first reports [`CoreStatus::Finished`]. It never reverts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionTable {
    active: Vec<bool>,
}

impl CompletionTable {
    pub fn all_active(num_cores: usize) -> Self {
        Self {
            active: vec![true; num_cores],
        }
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Out-of-range indices read as inactive.
    pub fn is_active(&self, core: usize) -> bool {
        self.active.get(core).copied().unwrap_or(false)
    }

    /// Marks `core` finished. Returns `true` if the entry changed.
    pub fn retire(&mut self, core: usize) -> bool {
        match self.active.get_mut(core) {
            Some(entry) if *entry => {
                *entry = false;
                true
            }
            _ => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    pub fn all_finished(&self) -> bool {
        !self.active.iter().any(|&a| a)
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.active
    }
}

/// Owns the cores and advances every active one once per clock tick.
pub struct ExecutionScheduler {
    cores: Vec<Box<dyn Core>>,
    table: CompletionTable,
    observers: Vec<Arc<dyn SimulationObserver>>,
    started: bool,
    stop_cycle: Option<u64>,
}

impl std::fmt::Debug for ExecutionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionScheduler")
            .field("cores", &self.cores.len())
            .field("table", &self.table)
            .field("stop_cycle", &self.stop_cycle)
            .finish()
    }
}

impl ExecutionScheduler {
    /// `cores[i]` must report `index() == i`.
    pub fn new(cores: Vec<Box<dyn Core>>) -> Self {
        debug_assert!(cores.iter().enumerate().all(|(i, c)| c.index() == i));
        let table = CompletionTable::all_active(cores.len());
        Self {
            cores,
            table,
            observers: Vec::new(),
            started: false,
            stop_cycle: None,
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn SimulationObserver>) {
        self.observers.push(observer);
    }

    /// Advances every still-active core once, in ascending index order, and
    /// returns whether the simulation may stop.
    ///
    /// The first call that observes no active core notifies the observers;
    /// every later call is a no-op that returns `true` without touching any
    /// core.
    pub fn advance_cycle(&mut self, cycle: u64) -> bool {
        if self.stop_cycle.is_some() {
            return true;
        }

        tracing::trace!("Cycle: {}", cycle);

        if !self.started {
            self.started = true;
            for observer in &self.observers {
                observer.on_simulation_start();
            }
        }

        for (i, core) in self.cores.iter_mut().enumerate() {
            if !self.table.is_active(i) {
                continue;
            }
            if core.advance_one_cycle(cycle) == CoreStatus::Finished && self.table.retire(i) {
                tracing::debug!("Core {} finished at cycle {}", i, cycle);
                for observer in &self.observers {
                    observer.on_core_finished(i, cycle);
                }
            }
        }

        for observer in &self.observers {
            observer.on_cycle(cycle);
        }

        let should_stop = self.table.all_finished();
        if should_stop {
            self.stop_cycle = Some(cycle);
            tracing::info!("All cores finished at cycle {}; simulation may end", cycle);
            for observer in &self.observers {
                observer.on_simulation_stop(cycle);
            }
        }
        should_stop
    }

    pub fn completion(&self) -> &CompletionTable {
        &self.table
    }

    pub fn cores(&self) -> &[Box<dyn Core>] {
        &self.cores
    }

    pub fn stop_signaled(&self) -> bool {
        self.stop_cycle.is_some()
    }

    /// Cycle on which the stop notification was issued.
    pub fn stop_cycle(&self) -> Option<u64> {
        self.stop_cycle
    }

    pub(crate) fn into_parts(self) -> (CompletionTable, Vec<Box<dyn Core>>) {
        (self.table, self.cores)
    }
}
