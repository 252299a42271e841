// RevSim - Multi-Core RISC-V Simulation Platform
// Copyright (C) 2026 RevSim Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::cpu::{Core, CoreFault, CoreStatus};
use crate::decoder::{decode_rv32, Instruction};
use crate::loader::LoaderInfo;
use crate::memory::{access_latency, MemoryHandle};
use crate::{Bus, SimResult, SimulationError};
use revsim_config::{CoreOptions, Extensions};

/// Stack reserved for each core below the shared argument block.
pub const CORE_STACK_SIZE: u64 = 0x1_0000;

/// `a7` value of the exit system call (RISC-V Linux ABI).
pub const SYS_EXIT: u32 = 93;

const REG_SP: u8 = 2;
const REG_TP: u8 = 4;
const REG_A0: u8 = 10;
const REG_A1: u8 = 11;
const REG_A7: u8 = 17;

enum Retire {
    /// Instruction retired; the core is busy for this many cycles.
    Continue(u32),
    Exit(u32),
}

/// RV32IM core with a per-instruction cost model.
///
/// An instruction issues on the first cycle the core is free and keeps it
/// busy for `cost(mnemonic)` cycles, plus the memory latency for loads and
/// stores.
#[derive(Debug)]
pub struct RevCore {
    pub x: [u32; 32], // x0..x31. x0 is hardwired to 0 in logic.
    pub pc: u32,
    index: usize,
    options: CoreOptions,
    memory: MemoryHandle,
    stall: u32,
    retired: u64,
    exit_code: Option<u32>,
    fault: Option<CoreFault>,
}

impl RevCore {
    pub fn new(
        index: usize,
        options: CoreOptions,
        memory: MemoryHandle,
        info: LoaderInfo,
    ) -> SimResult<Self> {
        let construction = |reason: String| SimulationError::CoreConstruction {
            core: index,
            reason,
        };

        let start = options.start_addr.unwrap_or(info.entry_point);
        let pc = u32::try_from(start).map_err(|_| {
            construction(format!(
                "start address {:#x} is outside the 32-bit address space",
                start
            ))
        })?;

        let sp = (index as u64)
            .checked_mul(CORE_STACK_SIZE)
            .and_then(|offset| info.stack_top.checked_sub(offset))
            .filter(|&sp| sp >= memory.base_addr())
            .and_then(|sp| u32::try_from(sp).ok())
            .ok_or_else(|| construction("no room for the core's stack".to_string()))?;

        let mut core = Self {
            x: [0; 32],
            pc,
            index,
            options,
            memory,
            stall: 0,
            retired: 0,
            exit_code: None,
            fault: None,
        };
        core.write_reg(REG_SP, sp);
        core.write_reg(REG_TP, index as u32);
        core.write_reg(REG_A0, info.argc);
        core.write_reg(REG_A1, info.argv_addr as u32);

        tracing::debug!(
            "Core {} ready: pc={:#x}, sp={:#x}, machine={}",
            index,
            pc,
            sp,
            core.options.machine.name
        );
        Ok(core)
    }

    pub fn read_reg(&self, n: u8) -> u32 {
        if n == 0 {
            0
        } else {
            self.x[n as usize]
        }
    }

    pub fn write_reg(&mut self, n: u8, val: u32) {
        if n != 0 {
            self.x[n as usize] = val;
        }
    }

    fn mem_latency(&self, addr: u32) -> u32 {
        access_latency(&self.options.mem_cost, self.index, addr as u64)
    }

    fn step(&mut self) -> SimResult<Retire> {
        let opcode = self.memory.read_u32(self.pc as u64)?;
        let instruction = decode_rv32(opcode);
        tracing::debug!(
            "Core {} PC={:#x}, Op={:#010x}, Instr={:?}",
            self.index,
            self.pc,
            opcode,
            instruction
        );

        if instruction.is_m_extension() && !self.options.machine.has(Extensions::M) {
            return Err(SimulationError::DecodeError(self.pc as u64));
        }

        let mut cost = self.options.table.cost(instruction.mnemonic());
        let mut next_pc = self.pc.wrapping_add(4);

        match instruction {
            Instruction::Lui { rd, imm } => {
                self.write_reg(rd, imm);
            }
            Instruction::Auipc { rd, imm } => {
                let val = self.pc.wrapping_add(imm);
                self.write_reg(rd, val);
            }
            Instruction::Jal { rd, imm } => {
                let target = self.pc.wrapping_add(imm as u32);
                self.write_reg(rd, self.pc.wrapping_add(4));
                next_pc = target;
            }
            Instruction::Jalr { rd, rs1, imm } => {
                let base = self.read_reg(rs1);
                let target = base.wrapping_add(imm as u32) & !1;
                self.write_reg(rd, self.pc.wrapping_add(4));
                next_pc = target;
            }
            Instruction::Beq { rs1, rs2, imm } => {
                if self.read_reg(rs1) == self.read_reg(rs2) {
                    next_pc = self.pc.wrapping_add(imm as u32);
                }
            }
            Instruction::Bne { rs1, rs2, imm } => {
                if self.read_reg(rs1) != self.read_reg(rs2) {
                    next_pc = self.pc.wrapping_add(imm as u32);
                }
            }
            Instruction::Blt { rs1, rs2, imm } => {
                if (self.read_reg(rs1) as i32) < (self.read_reg(rs2) as i32) {
                    next_pc = self.pc.wrapping_add(imm as u32);
                }
            }
            Instruction::Bge { rs1, rs2, imm } => {
                if (self.read_reg(rs1) as i32) >= (self.read_reg(rs2) as i32) {
                    next_pc = self.pc.wrapping_add(imm as u32);
                }
            }
            Instruction::Bltu { rs1, rs2, imm } => {
                if self.read_reg(rs1) < self.read_reg(rs2) {
                    next_pc = self.pc.wrapping_add(imm as u32);
                }
            }
            Instruction::Bgeu { rs1, rs2, imm } => {
                if self.read_reg(rs1) >= self.read_reg(rs2) {
                    next_pc = self.pc.wrapping_add(imm as u32);
                }
            }
            Instruction::Lb { rd, rs1, imm } => {
                let addr = self.read_reg(rs1).wrapping_add(imm as u32);
                cost = cost.saturating_add(self.mem_latency(addr));
                let val = self.memory.read_u8(addr as u64)? as i8;
                self.write_reg(rd, val as i32 as u32);
            }
            Instruction::Lh { rd, rs1, imm } => {
                let addr = self.read_reg(rs1).wrapping_add(imm as u32);
                cost = cost.saturating_add(self.mem_latency(addr));
                let val = self.memory.read_u16(addr as u64)? as i16;
                self.write_reg(rd, val as i32 as u32);
            }
            Instruction::Lw { rd, rs1, imm } => {
                let addr = self.read_reg(rs1).wrapping_add(imm as u32);
                cost = cost.saturating_add(self.mem_latency(addr));
                let val = self.memory.read_u32(addr as u64)?;
                self.write_reg(rd, val);
            }
            Instruction::Lbu { rd, rs1, imm } => {
                let addr = self.read_reg(rs1).wrapping_add(imm as u32);
                cost = cost.saturating_add(self.mem_latency(addr));
                let val = self.memory.read_u8(addr as u64)?;
                self.write_reg(rd, val as u32);
            }
            Instruction::Lhu { rd, rs1, imm } => {
                let addr = self.read_reg(rs1).wrapping_add(imm as u32);
                cost = cost.saturating_add(self.mem_latency(addr));
                let val = self.memory.read_u16(addr as u64)?;
                self.write_reg(rd, val as u32);
            }
            Instruction::Sb { rs1, rs2, imm } => {
                let addr = self.read_reg(rs1).wrapping_add(imm as u32);
                cost = cost.saturating_add(self.mem_latency(addr));
                let val = self.read_reg(rs2);
                self.memory.write_u8(addr as u64, val as u8)?;
            }
            Instruction::Sh { rs1, rs2, imm } => {
                let addr = self.read_reg(rs1).wrapping_add(imm as u32);
                cost = cost.saturating_add(self.mem_latency(addr));
                let val = self.read_reg(rs2);
                self.memory.write_u16(addr as u64, val as u16)?;
            }
            Instruction::Sw { rs1, rs2, imm } => {
                let addr = self.read_reg(rs1).wrapping_add(imm as u32);
                cost = cost.saturating_add(self.mem_latency(addr));
                let val = self.read_reg(rs2);
                self.memory.write_u32(addr as u64, val)?;
            }
            Instruction::Addi { rd, rs1, imm } => {
                let val = self.read_reg(rs1).wrapping_add(imm as u32);
                self.write_reg(rd, val);
            }
            Instruction::Slti { rd, rs1, imm } => {
                let val = ((self.read_reg(rs1) as i32) < imm) as u32;
                self.write_reg(rd, val);
            }
            Instruction::Sltiu { rd, rs1, imm } => {
                let val = (self.read_reg(rs1) < imm as u32) as u32;
                self.write_reg(rd, val);
            }
            Instruction::Xori { rd, rs1, imm } => {
                let val = self.read_reg(rs1) ^ imm as u32;
                self.write_reg(rd, val);
            }
            Instruction::Ori { rd, rs1, imm } => {
                let val = self.read_reg(rs1) | imm as u32;
                self.write_reg(rd, val);
            }
            Instruction::Andi { rd, rs1, imm } => {
                let val = self.read_reg(rs1) & imm as u32;
                self.write_reg(rd, val);
            }
            Instruction::Slli { rd, rs1, shamt } => {
                let val = self.read_reg(rs1) << shamt;
                self.write_reg(rd, val);
            }
            Instruction::Srli { rd, rs1, shamt } => {
                let val = self.read_reg(rs1) >> shamt;
                self.write_reg(rd, val);
            }
            Instruction::Srai { rd, rs1, shamt } => {
                let val = ((self.read_reg(rs1) as i32) >> shamt) as u32;
                self.write_reg(rd, val);
            }
            Instruction::Add { rd, rs1, rs2 } => {
                let val = self.read_reg(rs1).wrapping_add(self.read_reg(rs2));
                self.write_reg(rd, val);
            }
            Instruction::Sub { rd, rs1, rs2 } => {
                let val = self.read_reg(rs1).wrapping_sub(self.read_reg(rs2));
                self.write_reg(rd, val);
            }
            Instruction::Sll { rd, rs1, rs2 } => {
                let val = self.read_reg(rs1).wrapping_shl(self.read_reg(rs2));
                self.write_reg(rd, val);
            }
            Instruction::Slt { rd, rs1, rs2 } => {
                let val = ((self.read_reg(rs1) as i32) < (self.read_reg(rs2) as i32)) as u32;
                self.write_reg(rd, val);
            }
            Instruction::Sltu { rd, rs1, rs2 } => {
                let val = (self.read_reg(rs1) < self.read_reg(rs2)) as u32;
                self.write_reg(rd, val);
            }
            Instruction::Xor { rd, rs1, rs2 } => {
                let val = self.read_reg(rs1) ^ self.read_reg(rs2);
                self.write_reg(rd, val);
            }
            Instruction::Srl { rd, rs1, rs2 } => {
                let val = self.read_reg(rs1).wrapping_shr(self.read_reg(rs2));
                self.write_reg(rd, val);
            }
            Instruction::Sra { rd, rs1, rs2 } => {
                let val = (self.read_reg(rs1) as i32).wrapping_shr(self.read_reg(rs2)) as u32;
                self.write_reg(rd, val);
            }
            Instruction::Or { rd, rs1, rs2 } => {
                let val = self.read_reg(rs1) | self.read_reg(rs2);
                self.write_reg(rd, val);
            }
            Instruction::And { rd, rs1, rs2 } => {
                let val = self.read_reg(rs1) & self.read_reg(rs2);
                self.write_reg(rd, val);
            }
            Instruction::Mul { rd, rs1, rs2 } => {
                let val = self.read_reg(rs1).wrapping_mul(self.read_reg(rs2));
                self.write_reg(rd, val);
            }
            Instruction::Mulh { rd, rs1, rs2 } => {
                let a = self.read_reg(rs1) as i32 as i64;
                let b = self.read_reg(rs2) as i32 as i64;
                self.write_reg(rd, ((a * b) >> 32) as u32);
            }
            Instruction::Mulhsu { rd, rs1, rs2 } => {
                let a = self.read_reg(rs1) as i32 as i64;
                let b = self.read_reg(rs2) as i64;
                self.write_reg(rd, ((a * b) >> 32) as u32);
            }
            Instruction::Mulhu { rd, rs1, rs2 } => {
                let a = self.read_reg(rs1) as u64;
                let b = self.read_reg(rs2) as u64;
                self.write_reg(rd, ((a * b) >> 32) as u32);
            }
            Instruction::Div { rd, rs1, rs2 } => {
                let a = self.read_reg(rs1) as i32;
                let b = self.read_reg(rs2) as i32;
                let val = if b == 0 { u32::MAX } else { a.wrapping_div(b) as u32 };
                self.write_reg(rd, val);
            }
            Instruction::Divu { rd, rs1, rs2 } => {
                let a = self.read_reg(rs1);
                let b = self.read_reg(rs2);
                let val = if b == 0 { u32::MAX } else { a / b };
                self.write_reg(rd, val);
            }
            Instruction::Rem { rd, rs1, rs2 } => {
                let a = self.read_reg(rs1) as i32;
                let b = self.read_reg(rs2) as i32;
                let val = if b == 0 { a as u32 } else { a.wrapping_rem(b) as u32 };
                self.write_reg(rd, val);
            }
            Instruction::Remu { rd, rs1, rs2 } => {
                let a = self.read_reg(rs1);
                let b = self.read_reg(rs2);
                let val = if b == 0 { a } else { a % b };
                self.write_reg(rd, val);
            }
            Instruction::Fence => {}
            Instruction::Ecall => {
                let syscall = self.read_reg(REG_A7);
                if syscall == SYS_EXIT {
                    self.retired += 1;
                    return Ok(Retire::Exit(self.read_reg(REG_A0)));
                }
                tracing::warn!(
                    "Core {}: unsupported system call {} at {:#x}, ignoring",
                    self.index,
                    syscall,
                    self.pc
                );
            }
            Instruction::Ebreak => {
                self.retired += 1;
                return Ok(Retire::Exit(self.read_reg(REG_A0)));
            }
            Instruction::Unknown(_) => {
                return Err(SimulationError::DecodeError(self.pc as u64));
            }
        }

        self.pc = next_pc;
        self.retired += 1;
        Ok(Retire::Continue(cost))
    }
}

impl Core for RevCore {
    fn index(&self) -> usize {
        self.index
    }

    fn advance_one_cycle(&mut self, cycle: u64) -> CoreStatus {
        if self.exit_code.is_some() || self.fault.is_some() {
            return CoreStatus::Finished;
        }
        if self.stall > 0 {
            self.stall -= 1;
            return CoreStatus::Active;
        }

        match self.step() {
            Ok(Retire::Continue(cost)) => {
                self.stall = cost.saturating_sub(1);
                CoreStatus::Active
            }
            Ok(Retire::Exit(code)) => {
                tracing::info!(
                    "Core {} exited with code {} at cycle {} ({} instructions)",
                    self.index,
                    code,
                    cycle,
                    self.retired
                );
                self.exit_code = Some(code);
                CoreStatus::Finished
            }
            Err(error) => {
                let fault = CoreFault {
                    core: self.index,
                    cycle,
                    pc: self.pc as u64,
                    error,
                };
                tracing::error!("{}", fault);
                self.fault = Some(fault);
                CoreStatus::Finished
            }
        }
    }

    fn pc(&self) -> u64 {
        self.pc as u64
    }

    fn retired(&self) -> u64 {
        self.retired
    }

    fn exit_code(&self) -> Option<u32> {
        self.exit_code
    }

    fn fault(&self) -> Option<&CoreFault> {
        self.fault.as_ref()
    }
}
