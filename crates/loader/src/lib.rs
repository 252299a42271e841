// RevSim - Multi-Core RISC-V Simulation Platform
// Copyright (C) 2026 RevSim Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{anyhow, bail, Context, Result};
use goblin::elf::header::EM_RISCV;
use goblin::elf::program_header::PT_LOAD;
use goblin::elf::Elf;
use revsim_core::memory::ProgramImage;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

/// Largest in-memory size accepted for a single loadable segment.
pub const MAX_SEGMENT_SIZE: u64 = 256 * 1024 * 1024;

/// Loads `path` as an ELF executable when it carries the ELF magic,
/// otherwise as a flat binary placed at `base`.
pub fn load_program(path: &Path, base: u64) -> Result<ProgramImage> {
    let buffer = fs::read(path).with_context(|| format!("Failed to read program: {:?}", path))?;
    if buffer.starts_with(ELF_MAGIC) {
        parse_elf(&buffer)
    } else {
        Ok(flat_image(buffer, base))
    }
}

pub fn load_elf(path: &Path) -> Result<ProgramImage> {
    let buffer = fs::read(path).with_context(|| format!("Failed to read ELF file: {:?}", path))?;
    parse_elf(&buffer)
}

/// Raw instruction words; execution starts at `base`.
pub fn load_flat(path: &Path, base: u64) -> Result<ProgramImage> {
    let buffer =
        fs::read(path).with_context(|| format!("Failed to read flat binary: {:?}", path))?;
    Ok(flat_image(buffer, base))
}

fn flat_image(buffer: Vec<u8>, base: u64) -> ProgramImage {
    info!("Flat binary: {} bytes at {:#x}", buffer.len(), base);
    let mut program_image = ProgramImage::new(base);
    if !buffer.is_empty() {
        program_image.add_segment(base, buffer);
    }
    program_image
}

pub fn parse_elf(buffer: &[u8]) -> Result<ProgramImage> {
    let elf = Elf::parse(buffer).context("Failed to parse ELF binary")?;

    if elf.header.e_machine != EM_RISCV {
        bail!(
            "Unsupported ELF machine {:#x}, expected RISC-V",
            elf.header.e_machine
        );
    }
    if elf.is_64 {
        bail!("64-bit ELF images are not supported, expected RV32");
    }

    info!("ELF Entry Point: {:#x}", elf.entry);

    let mut program_image = ProgramImage::new(elf.entry);

    for ph in &elf.program_headers {
        if ph.p_type != PT_LOAD {
            continue;
        }
        let start_addr = ph.p_vaddr;
        let size = ph.p_filesz as usize;
        let offset = ph.p_offset as usize;

        if ph.p_memsz == 0 {
            continue;
        }

        debug!(
            "Found Loadable Segment: Addr={:#x}, Size={} bytes ({} in memory), Offset={:#x}",
            start_addr, size, ph.p_memsz, offset
        );

        let end = offset
            .checked_add(size)
            .filter(|&end| end <= buffer.len())
            .ok_or_else(|| anyhow!("Segment out of bounds in ELF file"))?;

        let mem_size = ph.p_memsz.max(ph.p_filesz);
        if mem_size > MAX_SEGMENT_SIZE {
            bail!(
                "Segment at {:#x} requests {} bytes, more than the {} byte limit",
                start_addr,
                mem_size,
                MAX_SEGMENT_SIZE
            );
        }

        let mut segment_data = buffer[offset..end].to_vec();
        // .bss tail
        segment_data.resize(mem_size as usize, 0);
        program_image.add_segment(start_addr, segment_data);
    }

    if program_image.segments.is_empty() {
        warn!("No loadable segments found in ELF file");
    }

    Ok(program_image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn write_temp_file(prefix: &str, contents: &[u8]) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push("revsim-loader-tests");
        let _ = std::fs::create_dir_all(&dir);

        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = dir.join(format!("{}-{}.bin", prefix, nonce));
        std::fs::write(&path, contents).expect("Failed to write temp file");
        path
    }

    /// ELF32 little-endian executable with one PT_LOAD segment.
    fn tiny_elf(machine: u16, entry: u32, vaddr: u32, code: &[u8], memsz: u32) -> Vec<u8> {
        const EHSIZE: u32 = 52;
        const PHENTSIZE: u32 = 32;
        let data_off = EHSIZE + PHENTSIZE;

        let mut out = Vec::new();
        out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 1, 1, 1, 0]);
        out.extend_from_slice(&[0; 8]);
        out.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        out.extend_from_slice(&machine.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&entry.to_le_bytes());
        out.extend_from_slice(&EHSIZE.to_le_bytes()); // e_phoff
        out.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
        out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        out.extend_from_slice(&(EHSIZE as u16).to_le_bytes());
        out.extend_from_slice(&(PHENTSIZE as u16).to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
        out.extend_from_slice(&40u16.to_le_bytes()); // e_shentsize
        out.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
        out.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx

        out.extend_from_slice(&PT_LOAD.to_le_bytes());
        out.extend_from_slice(&data_off.to_le_bytes());
        out.extend_from_slice(&vaddr.to_le_bytes());
        out.extend_from_slice(&vaddr.to_le_bytes());
        out.extend_from_slice(&(code.len() as u32).to_le_bytes());
        out.extend_from_slice(&memsz.to_le_bytes());
        out.extend_from_slice(&5u32.to_le_bytes()); // R+X
        out.extend_from_slice(&4u32.to_le_bytes());

        out.extend_from_slice(code);
        out
    }

    #[test]
    fn test_parse_riscv_elf() {
        let code = [0x13, 0x00, 0x00, 0x00, 0x73, 0x00, 0x00, 0x00];
        let bytes = tiny_elf(EM_RISCV, 0x8000_0004, 0x8000_0000, &code, 16);

        let image = parse_elf(&bytes).unwrap();
        assert_eq!(image.entry_point, 0x8000_0004);
        assert_eq!(image.segments.len(), 1);
        assert_eq!(image.segments[0].start_addr, 0x8000_0000);
        assert_eq!(image.segments[0].data.len(), 16);
        assert_eq!(&image.segments[0].data[..8], &code);
        assert!(image.segments[0].data[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_reject_foreign_machine() {
        // EM_ARM
        let bytes = tiny_elf(40, 0x100, 0x100, &[0; 4], 4);
        let err = parse_elf(&bytes).unwrap_err();
        assert!(err.to_string().contains("RISC-V"));
    }

    #[test]
    fn test_reject_oversized_bss() {
        let bytes = tiny_elf(EM_RISCV, 0x8000_0000, 0x8000_0000, &[0; 4], 0xFFFF_FFFF);
        let err = parse_elf(&bytes).unwrap_err();
        assert!(err.to_string().contains("byte limit"));
    }

    #[test]
    fn test_load_program_detects_format() {
        let flat = write_temp_file("flat", &[0x73, 0x00, 0x00, 0x00]);
        let image = load_program(&flat, 0x8000_0000).unwrap();
        assert_eq!(image.entry_point, 0x8000_0000);
        assert_eq!(image.segments[0].data, vec![0x73, 0, 0, 0]);

        let elf = write_temp_file("elf", &tiny_elf(EM_RISCV, 0x8000_0000, 0x8000_0000, &[0; 4], 4));
        let image = load_program(&elf, 0).unwrap();
        assert_eq!(image.entry_point, 0x8000_0000);

        let _ = std::fs::remove_file(flat);
        let _ = std::fs::remove_file(elf);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_program(Path::new("does-not-exist.bin"), 0).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read program"));
    }
}
