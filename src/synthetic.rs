//! A deterministic stand-in for the simulator proper.
//!
//! Every core commits a fixed number of instructions per tick depending on
//! its active cpu model (plus a per-core skew, so cores drift apart), which
//! lets `execute` jump straight to the next event instead of stepping ticks.
//! Checkpoints are directories holding a `manifest.json`.
use crate::{
    ATOMIC_CPU, CheckpointStore, CpuSwitch, ExitEvent, KVM_CPU, MINOR_CPU, O3_CPU,
    SimulationEngine, Statistics, StopCause, TIMING_CPU,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

pub const MANIFEST: &str = "manifest.json";

pub fn instructions_per_tick(model: &str) -> u64 {
    match model {
        KVM_CPU => 8,
        ATOMIC_CPU => 4,
        TIMING_CPU | MINOR_CPU => 2,
        O3_CPU => 1,
        _ => 1,
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub num_cores: usize,
    pub initial_model: String,
    /// program exits once core 0 has committed this many instructions
    pub workload_instructions: Option<u64>,
    /// the workload requests a checkpoint every this many ticks
    pub checkpoint_interval: Option<u64>,
    /// extra instructions per tick for each core
    pub core_skew: Vec<u64>,
    /// where stats dumps are appended
    pub stats_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreState {
    pub model: String,
    pub instructions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub tick: u64,
    pub cores: Vec<CoreState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsDump {
    pub sim_ticks: u64,
    pub sim_insts: Vec<u64>,
}

#[derive(Debug)]
struct Core {
    state: CoreState,
    skew: u64,
    stop_at: Option<u64>,
}

impl Core {
    fn rate(&self) -> u64 {
        instructions_per_tick(&self.state.model) + self.skew
    }

    fn ticks_until(&self, instructions: u64) -> u64 {
        instructions
            .saturating_sub(self.state.instructions)
            .div_ceil(self.rate())
    }
}

#[derive(Debug)]
pub struct SyntheticEngine {
    config: SyntheticConfig,
    tick: u64,
    cores: Vec<Core>,
    reset_tick: u64,
    reset_instructions: Vec<u64>,
    resets: usize,
    dumps: Vec<StatsDump>,
    switches: Vec<CpuSwitch>,
}

impl SyntheticEngine {
    pub fn new(config: SyntheticConfig) -> Self {
        let cores = (0..config.num_cores)
            .map(|core| Core {
                state: CoreState {
                    model: config.initial_model.clone(),
                    instructions: 0,
                },
                skew: config.core_skew.get(core).copied().unwrap_or(0),
                stop_at: None,
            })
            .collect();
        Self {
            reset_instructions: vec![0; config.num_cores],
            config,
            tick: 0,
            cores,
            reset_tick: 0,
            resets: 0,
            dumps: vec![],
            switches: vec![],
        }
    }

    /// Instantiate from a checkpoint written by [`CheckpointStore::save`]
    pub fn restore(mut config: SyntheticConfig, dir: &Path) -> anyhow::Result<Self> {
        let manifest: Manifest =
            serde_json::from_slice(&std::fs::read(dir.join(MANIFEST))?)?;
        info!(
            "Restoring {} cores at tick {} from {}",
            manifest.cores.len(),
            manifest.tick,
            dir.display()
        );
        config.num_cores = manifest.cores.len();
        let mut engine = Self::new(config);
        engine.tick = manifest.tick;
        engine.reset_tick = manifest.tick;
        for (core, state) in engine.cores.iter_mut().zip(manifest.cores) {
            // restoring onto another model keeps only the architectural state
            if core.state.model.is_empty() {
                core.state.model = state.model;
            }
            core.state.instructions = state.instructions;
        }
        engine.reset_instructions = engine
            .cores
            .iter()
            .map(|core| core.state.instructions)
            .collect();
        Ok(engine)
    }

    pub fn manifest(&self) -> Manifest {
        Manifest {
            tick: self.tick,
            cores: self.cores.iter().map(|core| core.state.clone()).collect(),
        }
    }

    pub fn model(&self, core: usize) -> &str {
        &self.cores[core].state.model
    }

    pub fn resets(&self) -> usize {
        self.resets
    }

    pub fn dumps(&self) -> &[StatsDump] {
        &self.dumps
    }

    pub fn switches(&self) -> &[CpuSwitch] {
        &self.switches
    }

    fn workload_done(&self) -> bool {
        match (self.config.workload_instructions, self.cores.first()) {
            (Some(limit), Some(core)) => core.state.instructions >= limit,
            _ => false,
        }
    }
}

impl SimulationEngine for SyntheticEngine {
    fn execute(&mut self, bound: Option<u64>) -> ExitEvent {
        if self.workload_done() {
            return ExitEvent::new(StopCause::ProgramExit(0));
        }

        // ticks until the next event of each kind
        let stop = self
            .cores
            .iter()
            .filter_map(|core| core.stop_at.map(|target| core.ticks_until(target)))
            .min();
        let exit = match (self.config.workload_instructions, self.cores.first()) {
            (Some(limit), Some(core)) => Some(core.ticks_until(limit)),
            _ => None,
        };
        let request = self
            .config
            .checkpoint_interval
            .filter(|interval| *interval > 0)
            .map(|interval| interval - self.tick % interval);

        let Some(delta) = [stop, exit, bound, request].into_iter().flatten().min() else {
            return ExitEvent::new(StopCause::Other("no events left to simulate".to_string()));
        };

        self.tick = self.tick.saturating_add(delta);
        let limit = self.config.workload_instructions.unwrap_or(u64::MAX);
        for core in &mut self.cores {
            let advanced = core.rate().saturating_mul(delta);
            core.state.instructions = core.state.instructions.saturating_add(advanced).min(limit);
        }

        let fired = self.cores.iter().position(|core| {
            core.stop_at
                .is_some_and(|target| core.state.instructions >= target)
        });
        let cause = if let Some(core) = fired {
            self.cores[core].stop_at = None;
            StopCause::MaxInstructions(Some(core))
        } else if self.workload_done() {
            StopCause::ProgramExit(0)
        } else if bound == Some(delta) {
            StopCause::BoundReached
        } else if request == Some(delta) {
            StopCause::CheckpointRequested
        } else {
            StopCause::BoundReached
        };
        debug!("tick {}: {}", self.tick, cause);
        ExitEvent::new(cause)
    }

    fn current_tick(&self) -> u64 {
        self.tick
    }

    fn num_cores(&self) -> usize {
        self.cores.len()
    }

    fn schedule_instruction_stop(&mut self, core: usize, count: u64) {
        if let Some(core) = self.cores.get_mut(core) {
            core.stop_at = Some(core.state.instructions.saturating_add(count));
        }
    }

    fn total_instructions(&self, core: usize) -> u64 {
        self.cores.get(core).map_or(0, |core| core.state.instructions)
    }

    fn switch_cpus(&mut self, switches: &[CpuSwitch]) {
        for switch in switches {
            let Some(core) = self.cores.get_mut(switch.core) else {
                warn!("No core {} to switch", switch.core);
                continue;
            };
            if core.state.model != switch.from.model {
                warn!(
                    "Switching core {} from {} but {} is active",
                    switch.core, switch.from, core.state.model
                );
            }
            core.state.model = switch.to.model.clone();
            self.switches.push(switch.clone());
        }
        info!("Switched CPUS @ tick {}", self.tick);
    }
}

impl CheckpointStore for SyntheticEngine {
    fn save(&mut self, dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(MANIFEST), serde_json::to_vec_pretty(&self.manifest())?)
    }
}

impl Statistics for SyntheticEngine {
    fn reset(&mut self) {
        self.reset_tick = self.tick;
        self.reset_instructions = self
            .cores
            .iter()
            .map(|core| core.state.instructions)
            .collect();
        self.resets += 1;
    }

    fn dump(&mut self) {
        let dump = StatsDump {
            sim_ticks: self.tick - self.reset_tick,
            sim_insts: self
                .cores
                .iter()
                .zip(&self.reset_instructions)
                .map(|(core, base)| core.state.instructions.saturating_sub(*base))
                .collect(),
        };
        if let Some(path) = &self.config.stats_path {
            let written = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut file| {
                    writeln!(file, "---------- Begin Simulation Statistics ----------")?;
                    writeln!(file, "sim_ticks {}", dump.sim_ticks)?;
                    for (core, insts) in dump.sim_insts.iter().enumerate() {
                        writeln!(file, "system.cpu{}.committedInsts {}", core, insts)?;
                    }
                    writeln!(file, "---------- End Simulation Statistics   ----------")
                });
            if let Err(err) = written {
                warn!("Failed to write stats to {}: {}", path.display(), err);
            }
        }
        self.dumps.push(dump);
    }
}
