// RevSim - Multi-Core RISC-V Simulation Platform
// Copyright (C) 2026 RevSim Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::SimulationObserver;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

const NOT_STOPPED: u64 = u64::MAX;

#[derive(Debug)]
pub struct PerformanceMetrics {
    cycle_count: AtomicU64,
    finished_cores: AtomicU64,
    stop_cycle: AtomicU64,
    start_time: Mutex<Option<Instant>>,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            cycle_count: AtomicU64::new(0),
            finished_cores: AtomicU64::new(0),
            stop_cycle: AtomicU64::new(NOT_STOPPED),
            start_time: Mutex::new(None),
        }
    }

    pub fn reset(&self) {
        self.cycle_count.store(0, Ordering::SeqCst);
        self.finished_cores.store(0, Ordering::SeqCst);
        self.stop_cycle.store(NOT_STOPPED, Ordering::SeqCst);
    }

    pub fn get_cycles(&self) -> u64 {
        self.cycle_count.load(Ordering::SeqCst)
    }

    pub fn get_finished_cores(&self) -> u64 {
        self.finished_cores.load(Ordering::SeqCst)
    }

    pub fn get_stop_cycle(&self) -> Option<u64> {
        match self.stop_cycle.load(Ordering::SeqCst) {
            NOT_STOPPED => None,
            cycle => Some(cycle),
        }
    }

    /// Simulated cycles per wall-clock second since the first cycle.
    pub fn get_cps(&self) -> f64 {
        let start = *self
            .start_time
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let elapsed = start.map(|s| s.elapsed().as_secs_f64()).unwrap_or(0.0);
        if elapsed > 0.0 {
            self.get_cycles() as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl SimulationObserver for PerformanceMetrics {
    fn on_simulation_start(&self) {
        let mut start = self
            .start_time
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *start = Some(Instant::now());
    }

    fn on_simulation_stop(&self, cycle: u64) {
        self.stop_cycle.store(cycle, Ordering::SeqCst);
    }

    fn on_cycle(&self, _cycle: u64) {
        self.cycle_count.fetch_add(1, Ordering::SeqCst);
    }

    fn on_core_finished(&self, _core: usize, _cycle: u64) {
        self.finished_cores.fetch_add(1, Ordering::SeqCst);
    }
}
