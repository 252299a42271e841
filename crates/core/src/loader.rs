// RevSim - Multi-Core RISC-V Simulation Platform
// Copyright (C) 2026 RevSim Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Places a program image and its argument block into simulated memory.
//!
//! The argument block sits at the top of memory:
//!
//! ```text
//! end of memory  -> argv strings, NUL terminated
//!                   (16-byte alignment)
//! argv_addr      -> argv[0] .. argv[argc-1], NULL   (32-bit pointers)
//! stack_top      == argv_addr; core stacks grow down from here
//! ```

use crate::memory::{MemoryHandle, ProgramImage};
use crate::{SimResult, SimulationError};

/// Entry metadata recorded while placing the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderInfo {
    pub entry_point: u64,
    pub stack_top: u64,
    pub argc: u32,
    pub argv_addr: u64,
}

#[derive(Debug)]
pub struct ImageLoader {
    program: String,
    argv: Vec<String>,
    info: LoaderInfo,
}

impl ImageLoader {
    pub fn place(
        memory: &MemoryHandle,
        image: &ProgramImage,
        program: &str,
        args: &str,
    ) -> SimResult<Self> {
        for segment in &image.segments {
            if !memory.load_segment(segment) {
                return Err(SimulationError::ImageLoad(format!(
                    "segment at {:#x} ({} bytes) lies outside memory [{:#x}, {:#x})",
                    segment.start_addr,
                    segment.data.len(),
                    memory.base_addr(),
                    memory.end_addr()
                )));
            }
            tracing::debug!(
                "Placed segment at {:#x} ({} bytes)",
                segment.start_addr,
                segment.data.len()
            );
        }

        let argv: Vec<String> = std::iter::once(program.to_string())
            .chain(args.split_whitespace().map(str::to_string))
            .collect();
        let (argv_addr, argc) = Self::write_args(memory, &argv)?;

        let info = LoaderInfo {
            entry_point: image.entry_point,
            stack_top: argv_addr,
            argc,
            argv_addr,
        };
        tracing::info!(
            "Loaded {}: entry={:#x}, argc={}, stack_top={:#x}",
            program,
            info.entry_point,
            info.argc,
            info.stack_top
        );

        Ok(Self {
            program: program.to_string(),
            argv,
            info,
        })
    }

    fn write_args(memory: &MemoryHandle, argv: &[String]) -> SimResult<(u64, u32)> {
        let no_room = || SimulationError::ImageLoad("no room for the argument block".to_string());
        let base = memory.base_addr();

        let mut cursor = memory.end_addr();
        let mut pointers = Vec::with_capacity(argv.len() + 1);
        for arg in argv {
            let mut bytes = arg.as_bytes().to_vec();
            bytes.push(0);
            cursor = cursor
                .checked_sub(bytes.len() as u64)
                .filter(|&c| c >= base)
                .ok_or_else(no_room)?;
            memory.write_bytes(cursor, &bytes)?;
            let ptr = u32::try_from(cursor).map_err(|_| {
                SimulationError::ImageLoad(format!(
                    "argument address {:#x} does not fit a 32-bit pointer",
                    cursor
                ))
            })?;
            pointers.push(ptr);
        }
        pointers.push(0);

        let table: Vec<u8> = pointers.iter().flat_map(|p| p.to_le_bytes()).collect();
        let argv_addr = (cursor & !0xF)
            .checked_sub(table.len() as u64)
            .map(|a| a & !0xF)
            .filter(|&a| a >= base)
            .ok_or_else(no_room)?;
        memory.write_bytes(argv_addr, &table)?;

        Ok((argv_addr, argv.len() as u32))
    }

    pub fn info(&self) -> LoaderInfo {
        self.info
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::LinearMemory;
    use crate::Bus;

    fn read_cstr(memory: &MemoryHandle, mut addr: u64) -> String {
        let mut out = Vec::new();
        loop {
            let b = memory.read_u8(addr).unwrap();
            if b == 0 {
                break;
            }
            out.push(b);
            addr += 1;
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_place_segments_and_argv() {
        let memory = MemoryHandle::new(LinearMemory::new(0x1000, 0x8000_0000));
        let mut image = ProgramImage::new(0x8000_0010);
        image.add_segment(0x8000_0000, vec![0x13, 0x00, 0x00, 0x00]);

        let loader = ImageLoader::place(&memory, &image, "prog", "alpha  beta").unwrap();
        let info = loader.info();

        assert_eq!(info.entry_point, 0x8000_0010);
        assert_eq!(info.argc, 3);
        assert_eq!(info.argv_addr % 16, 0);
        assert_eq!(info.stack_top, info.argv_addr);
        assert_eq!(loader.argv(), ["prog", "alpha", "beta"]);
        assert_eq!(memory.read_u32(0x8000_0000).unwrap(), 0x13);

        let names: Vec<String> = (0..3)
            .map(|i| {
                let ptr = memory.read_u32(info.argv_addr + 4 * i).unwrap();
                read_cstr(&memory, ptr as u64)
            })
            .collect();
        assert_eq!(names, ["prog", "alpha", "beta"]);
        assert_eq!(memory.read_u32(info.argv_addr + 12).unwrap(), 0);
    }

    #[test]
    fn test_segment_outside_memory_rejected() {
        let memory = MemoryHandle::new(LinearMemory::new(0x100, 0x8000_0000));
        let mut image = ProgramImage::new(0x8000_0000);
        image.add_segment(0x8000_00F0, vec![0; 0x20]);

        let err = ImageLoader::place(&memory, &image, "prog", "").unwrap_err();
        assert!(matches!(err, SimulationError::ImageLoad(_)));
    }

    #[test]
    fn test_argument_block_too_large() {
        let memory = MemoryHandle::new(LinearMemory::new(16, 0x8000_0000));
        let image = ProgramImage::new(0x8000_0000);
        let err = ImageLoader::place(&memory, &image, "a-very-long-program-name", "").unwrap_err();
        assert!(matches!(err, SimulationError::ImageLoad(_)));
    }
}
