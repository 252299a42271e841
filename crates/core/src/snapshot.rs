// RevSim - Multi-Core RISC-V Simulation Platform
// Copyright (C) 2026 RevSim Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::dispatch::MessageStats;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SimulationSnapshot {
    /// Cycle on which every core had finished, if that has happened.
    pub stop_cycle: Option<u64>,
    pub cores: Vec<CoreSnapshot>,
    pub messages: MessageStats,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CoreSnapshot {
    pub index: usize,
    pub active: bool,
    pub pc: u64,
    pub retired: u64,
    pub exit_code: Option<u32>,
    pub fault: Option<String>,
}

impl SimulationSnapshot {
    pub fn stopped(&self) -> bool {
        self.stop_cycle.is_some()
    }

    pub fn retired_total(&self) -> u64 {
        self.cores.iter().map(|c| c.retired).sum()
    }
}
