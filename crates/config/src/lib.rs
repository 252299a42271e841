// RevSim - Multi-Core RISC-V Simulation Platform
// Copyright (C) 2026 RevSim Team
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default base of the simulated RAM, matching the usual RISC-V reset vector.
pub const DEFAULT_MEM_BASE: u64 = 0x8000_0000;

/// Selector meaning "apply this entry to every core".
pub const ALL_CORES: &str = "CORES";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum OptionError {
    #[error("malformed entry '{0}', expected '<core>:<value>'")]
    MalformedEntry(String),
    #[error("core index {index} out of range for {num_cores} cores")]
    CoreOutOfRange { index: usize, num_cores: usize },
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
    #[error("invalid machine model '{0}'")]
    InvalidMachine(String),
    #[error("invalid memory cost range '{0}', expected '<min>:<max>' with min <= max")]
    InvalidMemCost(String),
    #[error("invalid instruction cost {cost} for '{mnemonic}'")]
    InvalidCost { mnemonic: String, cost: u32 },
    #[error("invalid clock '{0}'")]
    InvalidClock(String),
    #[error("memory size must be greater than zero")]
    InvalidMemSize,
}

bitflags! {
    /// Optional transport endpoints requested by the configuration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Features: u8 {
        const NIC = 0b01;
        const PAN = 0b10;
    }
}

bitflags! {
    /// RISC-V extensions named by a machine model string.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Extensions: u8 {
        const I = 1 << 0;
        const M = 1 << 1;
        const A = 1 << 2;
        const F = 1 << 3;
        const D = 1 << 4;
        const C = 1 << 5;
        const G = Self::I.bits() | Self::M.bits() | Self::A.bits() | Self::F.bits() | Self::D.bits();
    }
}

/// Raw simulation parameters, as written in a YAML configuration file.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    #[serde(default)]
    pub verbose: u32,
    #[serde(default = "SimConfig::default_clock")]
    pub clock: String,
    #[serde(default = "SimConfig::default_program")]
    pub program: String,
    #[serde(default)]
    pub args: String,
    #[serde(default = "SimConfig::default_num_cores")]
    pub num_cores: usize,
    #[serde(default = "SimConfig::default_mem_size")]
    pub mem_size: String,
    #[serde(default = "SimConfig::default_mem_base")]
    pub mem_base: u64,
    #[serde(default)]
    pub start_addr: Vec<String>,
    #[serde(default)]
    pub machine: Vec<String>,
    #[serde(default)]
    pub table: Vec<String>,
    #[serde(default)]
    pub mem_cost: Vec<String>,
    #[serde(default)]
    pub enable_nic: bool,
    #[serde(default)]
    pub enable_pan: bool,
    #[serde(default)]
    pub splash: bool,
    #[serde(default = "SimConfig::default_init_phases")]
    pub init_phases: u32,
    /// Directory used to resolve relative cost-table paths.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl SimConfig {
    fn default_clock() -> String {
        "1GHz".to_string()
    }

    fn default_program() -> String {
        "a.out".to_string()
    }

    fn default_num_cores() -> usize {
        1
    }

    fn default_mem_size() -> String {
        "1GiB".to_string()
    }

    fn default_mem_base() -> u64 {
        DEFAULT_MEM_BASE
    }

    fn default_init_phases() -> u32 {
        1
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            verbose: 0,
            clock: Self::default_clock(),
            program: Self::default_program(),
            args: String::new(),
            num_cores: Self::default_num_cores(),
            mem_size: Self::default_mem_size(),
            mem_base: Self::default_mem_base(),
            start_addr: Vec::new(),
            machine: Vec::new(),
            table: Vec::new(),
            mem_cost: Vec::new(),
            enable_nic: false,
            enable_pan: false,
            splash: false,
            init_phases: Self::default_init_phases(),
            base_dir: None,
        }
    }
}

/// Machine model of a single core, e.g. `G` or `IMAC`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineModel {
    pub name: String,
    pub extensions: Extensions,
}

impl MachineModel {
    pub fn parse(name: &str) -> Result<Self, OptionError> {
        let mut extensions = Extensions::empty();
        for c in name.trim().chars() {
            let ext = match c.to_ascii_uppercase() {
                'G' => Extensions::G,
                'I' => Extensions::I,
                'M' => Extensions::M,
                'A' => Extensions::A,
                'F' => Extensions::F,
                'D' => Extensions::D,
                'C' => Extensions::C,
                _ => return Err(OptionError::InvalidMachine(name.to_string())),
            };
            extensions |= ext;
        }
        if !extensions.contains(Extensions::I) {
            return Err(OptionError::InvalidMachine(name.to_string()));
        }
        Ok(Self {
            name: name.trim().to_ascii_uppercase(),
            extensions,
        })
    }

    pub fn has(&self, ext: Extensions) -> bool {
        self.extensions.contains(ext)
    }
}

impl Default for MachineModel {
    fn default() -> Self {
        Self {
            name: "G".to_string(),
            extensions: Extensions::G,
        }
    }
}

/// Inclusive range of memory latencies, in cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemCost {
    pub min: u32,
    pub max: u32,
}

impl MemCost {
    pub fn parse(range: &str) -> Result<Self, OptionError> {
        let err = || OptionError::InvalidMemCost(range.to_string());
        let (min, max) = range.split_once(':').ok_or_else(err)?;
        let min: u32 = min.trim().parse().map_err(|_| err())?;
        let max: u32 = max.trim().parse().map_err(|_| err())?;
        if min > max {
            return Err(err());
        }
        Ok(Self { min, max })
    }
}

impl Default for MemCost {
    fn default() -> Self {
        Self { min: 0, max: 10 }
    }
}

/// Per-mnemonic instruction costs. Unlisted mnemonics cost one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CostTable {
    pub costs: HashMap<String, u32>,
}

impl CostTable {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open cost table at {:?}", path.as_ref()))?;
        let table: Self =
            serde_yaml::from_reader(f).context("Failed to parse instruction cost table")?;
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), OptionError> {
        if let Some((mnemonic, &cost)) = self.costs.iter().find(|(_, c)| **c == 0) {
            return Err(OptionError::InvalidCost {
                mnemonic: mnemonic.clone(),
                cost,
            });
        }
        Ok(())
    }

    pub fn cost(&self, mnemonic: &str) -> u32 {
        self.costs.get(mnemonic).copied().unwrap_or(1)
    }
}

/// Resolved settings for one core.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreOptions {
    /// Explicit start address; `None` means the program entry point.
    pub start_addr: Option<u64>,
    pub machine: MachineModel,
    pub table: CostTable,
    pub mem_cost: MemCost,
}

/// Validated, immutable simulation options shared by every component.
#[derive(Debug, Clone)]
pub struct SimOptions {
    pub verbose: u32,
    pub clock_hz: u64,
    pub program: String,
    pub args: String,
    pub mem_size: u64,
    pub mem_base: u64,
    pub features: Features,
    pub splash: bool,
    pub init_phases: u32,
    pub cores: Vec<CoreOptions>,
}

impl SimOptions {
    pub fn num_cores(&self) -> usize {
        self.cores.len()
    }

    pub fn core(&self, index: usize) -> Option<&CoreOptions> {
        self.cores.get(index)
    }

    /// Rechecks the invariants `resolve` establishes, for options built
    /// or edited by hand.
    pub fn validate(&self) -> Result<(), OptionError> {
        if self.mem_size == 0 {
            return Err(OptionError::InvalidMemSize);
        }
        for core in &self.cores {
            let MemCost { min, max } = core.mem_cost;
            if min > max {
                return Err(OptionError::InvalidMemCost(format!("{}:{}", min, max)));
            }
            core.table.validate()?;
        }
        Ok(())
    }
}

impl SimConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open simulation config at {:?}", path.as_ref()))?;
        let mut config: Self =
            serde_yaml::from_reader(f).context("Failed to parse simulation config YAML")?;
        config.base_dir = path.as_ref().parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Validates the raw parameters and materializes per-core options.
    pub fn resolve(&self) -> Result<SimOptions> {
        let n = self.num_cores;
        let mem_size = parse_size(&self.mem_size)
            .with_context(|| format!("Invalid memory size '{}'", self.mem_size))?;
        if mem_size == 0 {
            anyhow::bail!("Memory size must be greater than zero");
        }
        let clock_hz = parse_clock(&self.clock)?;

        let start_addrs = resolve_list(&self.start_addr, n, None, |s| parse_addr(s).map(Some))
            .context("Failed to initialize the starting addresses")?;
        let machines = resolve_list(&self.machine, n, MachineModel::default(), MachineModel::parse)
            .context("Failed to initialize the machine models")?;
        let table_paths = resolve_list(&self.table, n, None, |p| {
            Ok::<_, OptionError>(Some(p.trim().to_string()))
        })
        .context("Failed to initialize the instruction tables")?;
        let mem_costs = resolve_list(&self.mem_cost, n, MemCost::default(), MemCost::parse)
            .context("Failed to initialize the memory latency range")?;

        let mut loaded: HashMap<String, CostTable> = HashMap::new();
        let mut cores = Vec::with_capacity(n);
        for (i, (((start_addr, machine), table), mem_cost)) in start_addrs
            .into_iter()
            .zip(machines)
            .zip(table_paths)
            .zip(mem_costs)
            .enumerate()
        {
            let table = match table {
                Some(path) => {
                    if !loaded.contains_key(&path) {
                        let full = self.table_path(&path);
                        tracing::debug!("Loading instruction table for core {}: {:?}", i, full);
                        let parsed = CostTable::from_file(&full)
                            .context("Failed to initialize the instruction tables")?;
                        loaded.insert(path.clone(), parsed);
                    }
                    loaded.get(&path).cloned().unwrap_or_default()
                }
                None => CostTable::default(),
            };
            cores.push(CoreOptions {
                start_addr,
                machine,
                table,
                mem_cost,
            });
        }

        let mut features = Features::empty();
        features.set(Features::NIC, self.enable_nic);
        features.set(Features::PAN, self.enable_pan);

        let options = SimOptions {
            verbose: self.verbose,
            clock_hz,
            program: self.program.clone(),
            args: self.args.clone(),
            mem_size,
            mem_base: self.mem_base,
            features,
            splash: self.splash,
            init_phases: self.init_phases,
            cores,
        };
        options.validate()?;
        Ok(options)
    }

    fn table_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        match &self.base_dir {
            Some(dir) if p.is_relative() => dir.join(p),
            _ => p.to_path_buf(),
        }
    }
}

/// Expands `<core>:<value>` entries into one value per core.
/// Later entries override earlier ones; `CORES:<value>` targets every core.
fn resolve_list<T, F>(
    entries: &[String],
    num_cores: usize,
    default: T,
    parse: F,
) -> Result<Vec<T>, OptionError>
where
    T: Clone,
    F: Fn(&str) -> Result<T, OptionError>,
{
    let mut values = vec![default; num_cores];
    for entry in entries {
        let (target, value) = entry
            .split_once(':')
            .ok_or_else(|| OptionError::MalformedEntry(entry.clone()))?;
        let target = target.trim();
        let parsed = parse(value)?;
        if target.eq_ignore_ascii_case(ALL_CORES) {
            values.iter_mut().for_each(|v| *v = parsed.clone());
            continue;
        }
        let index: usize = target
            .parse()
            .map_err(|_| OptionError::MalformedEntry(entry.clone()))?;
        let slot = values.get_mut(index).ok_or(OptionError::CoreOutOfRange {
            index,
            num_cores,
        })?;
        *slot = parsed;
    }
    Ok(values)
}

pub fn parse_addr(s: &str) -> Result<u64, OptionError> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|_| OptionError::InvalidAddress(s.to_string()))
}

pub fn parse_clock(s: &str) -> Result<u64, OptionError> {
    let lower = s.trim().to_ascii_lowercase();
    let (digits, scale) = if let Some(v) = lower.strip_suffix("ghz") {
        (v, 1_000_000_000)
    } else if let Some(v) = lower.strip_suffix("mhz") {
        (v, 1_000_000)
    } else if let Some(v) = lower.strip_suffix("khz") {
        (v, 1_000)
    } else if let Some(v) = lower.strip_suffix("hz") {
        (v, 1)
    } else {
        (lower.as_str(), 1)
    };
    let value: f64 = digits
        .trim()
        .parse()
        .map_err(|_| OptionError::InvalidClock(s.to_string()))?;
    let hz = (value * scale as f64) as u64;
    if hz == 0 {
        return Err(OptionError::InvalidClock(s.to_string()));
    }
    Ok(hz)
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    if let Ok(bytes) = size_str.trim().parse::<u64>() {
        return Ok(bytes);
    }
    // Normalise "64KiB" to "64 KiB" before handing it to human-size.
    let trimmed = size_str.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (value, unit) = trimmed.split_at(split);
    let s: Size = format!("{} {}", value.trim(), unit.trim())
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config: SimConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.num_cores, 1);
        assert_eq!(config.program, "a.out");
        let opts = config.resolve().unwrap();
        assert_eq!(opts.num_cores(), 1);
        assert_eq!(opts.mem_size, 1024 * 1024 * 1024);
        assert_eq!(opts.clock_hz, 1_000_000_000);
        assert_eq!(opts.cores[0].start_addr, None);
        assert_eq!(opts.cores[0].machine, MachineModel::default());
        assert_eq!(opts.cores[0].mem_cost, MemCost { min: 0, max: 10 });
        assert!(opts.features.is_empty());
    }

    #[test]
    fn test_per_core_overrides() {
        let yaml = r#"
num_cores: 3
mem_size: "64KiB"
start_addr:
  - "CORES:0x80000000"
  - "2:0x80001000"
machine:
  - "1:IMAC"
mem_cost:
  - "0:2:4"
enable_pan: true
"#;
        let config: SimConfig = serde_yaml::from_str(yaml).unwrap();
        let opts = config.resolve().unwrap();
        assert_eq!(opts.mem_size, 64 * 1024);
        assert_eq!(opts.cores[0].start_addr, Some(0x8000_0000));
        assert_eq!(opts.cores[1].start_addr, Some(0x8000_0000));
        assert_eq!(opts.cores[2].start_addr, Some(0x8000_1000));
        assert_eq!(opts.cores[1].machine.name, "IMAC");
        assert!(opts.cores[1].machine.has(Extensions::C));
        assert!(!opts.cores[1].machine.has(Extensions::F));
        assert_eq!(opts.cores[0].mem_cost, MemCost { min: 2, max: 4 });
        assert_eq!(opts.cores[1].mem_cost, MemCost::default());
        assert_eq!(opts.features, Features::PAN);
    }

    #[test]
    fn test_zero_cores_resolves_empty() {
        let config = SimConfig {
            num_cores: 0,
            ..SimConfig::default()
        };
        let opts = config.resolve().unwrap();
        assert_eq!(opts.num_cores(), 0);
    }

    #[test]
    fn test_core_out_of_range() {
        let config = SimConfig {
            num_cores: 2,
            start_addr: vec!["2:0x1000".to_string()],
            ..SimConfig::default()
        };
        let err = config.resolve().unwrap_err();
        assert!(format!("{:#}", err).contains("starting addresses"));
        assert!(format!("{:#}", err).contains("out of range"));
    }

    #[test]
    fn test_invalid_machine_model() {
        assert!(MachineModel::parse("MAFD").is_err());
        assert!(MachineModel::parse("IX").is_err());
        let g = MachineModel::parse("g").unwrap();
        assert_eq!(g.extensions, Extensions::G);
    }

    #[test]
    fn test_inverted_mem_cost() {
        assert_eq!(
            MemCost::parse("10:2"),
            Err(OptionError::InvalidMemCost("10:2".to_string()))
        );
        assert!(MemCost::parse("5").is_err());
        assert_eq!(MemCost::parse("3:3").unwrap(), MemCost { min: 3, max: 3 });
    }

    #[test]
    fn test_validate_hand_built_options() {
        let mut opts = SimConfig::default().resolve().unwrap();
        assert_eq!(opts.validate(), Ok(()));

        opts.cores[0].mem_cost = MemCost { min: 5, max: 2 };
        assert_eq!(
            opts.validate(),
            Err(OptionError::InvalidMemCost("5:2".to_string()))
        );

        opts.cores[0].mem_cost = MemCost::default();
        opts.cores[0].table.costs.insert("add".to_string(), 0);
        assert!(matches!(
            opts.validate(),
            Err(OptionError::InvalidCost { cost: 0, .. })
        ));

        opts.cores[0].table = CostTable::default();
        opts.mem_size = 0;
        assert_eq!(opts.validate(), Err(OptionError::InvalidMemSize));
    }

    #[test]
    fn test_malformed_entry() {
        let config = SimConfig {
            machine: vec!["G".to_string()],
            ..SimConfig::default()
        };
        let err = config.resolve().unwrap_err();
        assert!(format!("{:#}", err).contains("machine models"));
    }

    #[test]
    fn test_cost_table_from_file() {
        let dir = std::env::temp_dir().join(format!("revsim-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("costs.yaml"), "add: 1\nmul: 3\nlw: 2\n").unwrap();

        let config = SimConfig {
            num_cores: 2,
            table: vec!["1:costs.yaml".to_string()],
            base_dir: Some(dir.clone()),
            ..SimConfig::default()
        };
        let opts = config.resolve().unwrap();
        assert_eq!(opts.cores[0].table.cost("mul"), 1);
        assert_eq!(opts.cores[1].table.cost("mul"), 3);
        assert_eq!(opts.cores[1].table.cost("lw"), 2);
        assert_eq!(opts.cores[1].table.cost("sub"), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_zero_cost_rejected() {
        let table: CostTable = serde_yaml::from_str("add: 0").unwrap();
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_addr("0x8000_1000").unwrap(), 0x8000_1000);
        assert_eq!(parse_addr("4096").unwrap(), 4096);
        assert!(parse_addr("zz").is_err());
        assert_eq!(parse_clock("2GHz").unwrap(), 2_000_000_000);
        assert_eq!(parse_clock("100MHz").unwrap(), 100_000_000);
        assert!(parse_clock("fast").is_err());
        assert_eq!(parse_size("1048576").unwrap(), 1024 * 1024);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let res: Result<SimConfig, _> = serde_yaml::from_str("cores: 4");
        assert!(res.is_err());
    }
}
