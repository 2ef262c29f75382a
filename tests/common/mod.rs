#![allow(dead_code)]

use sim_phases::{
    CheckpointStore, CpuSwitch, ExitEvent, SimulationEngine, Statistics, StopCause,
};
use std::{collections::VecDeque, path::Path, path::PathBuf};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// What the next `execute` call does
#[derive(Debug, Clone)]
pub struct Step {
    /// ticks to advance, the requested bound when `None`
    pub ticks: Option<u64>,
    /// instructions committed per core
    pub instructions: Vec<u64>,
    pub cause: StopCause,
}

impl Step {
    pub fn bounded(instructions: &[u64]) -> Self {
        Self {
            ticks: None,
            instructions: instructions.to_vec(),
            cause: StopCause::BoundReached,
        }
    }

    pub fn stop(ticks: u64, instructions: &[u64], cause: StopCause) -> Self {
        Self {
            ticks: Some(ticks),
            instructions: instructions.to_vec(),
            cause,
        }
    }
}

/// Replays a fixed sequence of stops and records every call made on it
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    pub tick: u64,
    pub instructions: Vec<u64>,
    pub script: VecDeque<Step>,
    pub bounds: Vec<Option<u64>>,
    pub stops: Vec<(usize, u64)>,
    pub saves: Vec<PathBuf>,
    pub switches: Vec<CpuSwitch>,
    pub resets: usize,
    pub dumps: usize,
}

impl ScriptedEngine {
    pub fn new(num_cores: usize, script: Vec<Step>) -> Self {
        Self {
            instructions: vec![0; num_cores],
            script: script.into(),
            ..Default::default()
        }
    }

    pub fn executes(&self) -> usize {
        self.bounds.len()
    }
}

impl SimulationEngine for ScriptedEngine {
    fn execute(&mut self, bound: Option<u64>) -> ExitEvent {
        self.bounds.push(bound);
        let Some(step) = self.script.pop_front() else {
            return ExitEvent::new(StopCause::Other("script exhausted".to_string()));
        };
        self.tick += step.ticks.or(bound).unwrap_or(0);
        for (total, delta) in self.instructions.iter_mut().zip(&step.instructions) {
            *total += delta;
        }
        ExitEvent::new(step.cause)
    }

    fn current_tick(&self) -> u64 {
        self.tick
    }

    fn num_cores(&self) -> usize {
        self.instructions.len()
    }

    fn schedule_instruction_stop(&mut self, core: usize, count: u64) {
        self.stops.push((core, count));
    }

    fn total_instructions(&self, core: usize) -> u64 {
        self.instructions[core]
    }

    fn switch_cpus(&mut self, switches: &[CpuSwitch]) {
        self.switches.extend_from_slice(switches);
    }
}

impl CheckpointStore for ScriptedEngine {
    fn save(&mut self, dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        self.saves.push(dir.to_path_buf());
        Ok(())
    }
}

impl Statistics for ScriptedEngine {
    fn reset(&mut self) {
        self.resets += 1;
    }

    fn dump(&mut self) {
        self.dumps += 1;
    }
}
