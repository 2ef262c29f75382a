//! Capabilities consumed from the simulator proper
use crate::ExitEvent;
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path};

pub trait SimulationEngine {
    /// Run until `bound` ticks have elapsed (or forever when `None`) or
    /// until something else stops the simulation.
    fn execute(&mut self, bound: Option<u64>) -> ExitEvent;

    fn current_tick(&self) -> u64;

    fn num_cores(&self) -> usize;

    /// Stop after `count` more committed instructions on `core`. Only one
    /// stop may be pending per core; scheduling again replaces it.
    fn schedule_instruction_stop(&mut self, core: usize, count: u64);

    /// Committed instructions on `core` since instantiation
    fn total_instructions(&self, core: usize) -> u64;

    /// Swap active cpu models, in order
    fn switch_cpus(&mut self, switches: &[CpuSwitch]);
}

pub trait CheckpointStore {
    fn save(&mut self, dir: &Path) -> std::io::Result<()>;
}

pub trait Statistics {
    fn reset(&mut self);
    fn dump(&mut self);
}

/// Everything the orchestrator drives
pub trait Simulator: SimulationEngine + CheckpointStore + Statistics {}

impl<T: SimulationEngine + CheckpointStore + Statistics + ?Sized> Simulator for T {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuModel {
    pub name: String,
    pub requires_caches: bool,
    pub supports_live_switch: bool,
}

impl CpuModel {
    pub fn requires_caches(&self) -> bool {
        self.requires_caches
    }

    pub fn supports_live_switch(&self) -> bool {
        self.supports_live_switch
    }
}

pub trait CpuCatalog {
    fn lookup(&self, name: &str) -> Option<CpuModel>;
}

pub const KVM_CPU: &str = "X86KvmCPU";
pub const ATOMIC_CPU: &str = "AtomicSimpleCPU";
pub const TIMING_CPU: &str = "TimingSimpleCPU";
pub const MINOR_CPU: &str = "MinorCPU";
pub const O3_CPU: &str = "DerivO3CPU";

/// The models every gem5 x86 build ships
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCatalog;

impl CpuCatalog for BuiltinCatalog {
    fn lookup(&self, name: &str) -> Option<CpuModel> {
        let (requires_caches, supports_live_switch) = match name {
            KVM_CPU => (false, true),
            ATOMIC_CPU => (false, true),
            TIMING_CPU => (false, true),
            MINOR_CPU => (true, true),
            O3_CPU => (true, true),
            _ => return None,
        };
        Some(CpuModel {
            name: name.to_string(),
            requires_caches,
            supports_live_switch,
        })
    }
}

/// A named group of per-core cpu instances sharing one model
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CpuSet {
    /// e.g. "cpu", "switch_cpus", "warmup_cpu"
    pub role: String,
    pub model: String,
}

impl CpuSet {
    pub fn new(role: &str, model: &str) -> Self {
        Self {
            role: role.to_string(),
            model: model.to_string(),
        }
    }
}

impl fmt::Display for CpuSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.role, self.model)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSwitch {
    pub core: usize,
    pub from: CpuSet,
    pub to: CpuSet,
}

/// One (old, new) pair per core
pub fn switch_all(num_cores: usize, from: &CpuSet, to: &CpuSet) -> Vec<CpuSwitch> {
    (0..num_cores)
        .map(|core| CpuSwitch {
            core,
            from: from.clone(),
            to: to.clone(),
        })
        .collect()
}

/// Swap every pair's direction
pub fn invert(switches: &[CpuSwitch]) -> Vec<CpuSwitch> {
    switches
        .iter()
        .map(|switch| CpuSwitch {
            core: switch.core,
            from: switch.to.clone(),
            to: switch.from.clone(),
        })
        .collect()
}
