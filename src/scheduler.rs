//! Decides when checkpoints are written while the workload runs
use crate::{CheckpointName, ExecutionDriver, ExitEvent, Result, Simulator, StopCause};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointPolicy {
    /// `cpt.<tick>` at `first_tick` and every `period` ticks after it
    Periodic {
        first_tick: u64,
        period: u64,
        max_checkpoints: u32,
    },
    /// A single `cpt.<benchmark>.<instruction>` once every core has
    /// committed `instruction` instructions (absolute count)
    AtInstruction { benchmark: String, instruction: u64 },
    /// `cpt.<tick>` whenever the workload requests one
    Benchmark { max_checkpoints: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleReport {
    /// The stop the caller has to interpret for overall termination
    pub event: ExitEvent,
    pub written: Vec<PathBuf>,
    /// The workload asked for more checkpoints than allowed
    pub budget_exhausted: bool,
}

pub struct CheckpointScheduler<'a, S: Simulator + ?Sized> {
    sim: &'a mut S,
    dir: &'a Path,
    max_tick: u64,
    driver: ExecutionDriver,
    written: Vec<PathBuf>,
}

impl<'a, S: Simulator + ?Sized> CheckpointScheduler<'a, S> {
    pub fn new(sim: &'a mut S, dir: &'a Path, max_tick: u64, driver: ExecutionDriver) -> Self {
        Self {
            sim,
            dir,
            max_tick,
            driver,
            written: vec![],
        }
    }

    pub fn run(mut self, policy: &CheckpointPolicy) -> Result<ScheduleReport> {
        let mut budget_exhausted = false;
        let event = match policy {
            CheckpointPolicy::Periodic {
                first_tick,
                period,
                max_checkpoints,
            } => self.periodic(*first_tick, *period, *max_checkpoints)?,
            CheckpointPolicy::AtInstruction {
                benchmark,
                instruction,
            } => self.at_instruction(benchmark, *instruction)?,
            CheckpointPolicy::Benchmark { max_checkpoints } => {
                let (event, exhausted) = self.benchmark(*max_checkpoints)?;
                budget_exhausted = exhausted;
                event
            }
        };
        Ok(ScheduleReport {
            event,
            written: self.written,
            budget_exhausted,
        })
    }

    fn checkpoint(&mut self, name: CheckpointName) -> Result<()> {
        let path = self.dir.join(name.to_string());
        self.sim.save(&path)?;
        info!("Checkpoint written to {}", path.display());
        self.written.push(path);
        Ok(())
    }

    /// Run up to absolute tick `target`, treating workload checkpoint
    /// requests as transparent.
    fn run_to(&mut self, target: u64) -> ExitEvent {
        loop {
            let now = self.sim.current_tick();
            if now >= target {
                return ExitEvent::bound_reached();
            }
            let event = self.sim.execute(Some(target - now));
            if event.cause != StopCause::CheckpointRequested {
                return event;
            }
            debug!("Skipping checkpoint request at tick {}", self.sim.current_tick());
        }
    }

    fn periodic(
        &mut self,
        first_tick: u64,
        period: u64,
        max_checkpoints: u32,
    ) -> Result<ExitEvent> {
        let mut num_checkpoints = 0;
        let mut boundary = first_tick;
        let now = self.sim.current_tick();
        if boundary <= now {
            if period == 0 {
                warn!("Checkpoint tick {} already passed at tick {}", first_tick, now);
                return Ok(ExitEvent::bound_reached());
            }
            // first boundary strictly after the restored tick
            let steps = (now - first_tick) / period + 1;
            boundary = first_tick.saturating_add(steps.saturating_mul(period));
            debug!("First checkpoint moved from tick {} to {}", first_tick, boundary);
        }

        let mut last = ExitEvent::bound_reached();
        loop {
            if num_checkpoints >= max_checkpoints {
                return Ok(last);
            }
            if boundary > self.max_tick {
                return Ok(self.run_to(self.max_tick));
            }
            let event = self.run_to(boundary);
            if event.cause != StopCause::BoundReached {
                return Ok(event);
            }
            let tick = self.sim.current_tick();
            self.checkpoint(CheckpointName::Tick(tick))?;
            num_checkpoints += 1;
            last = event;
            if period == 0 {
                return Ok(last);
            }
            boundary = boundary.saturating_add(period);
        }
    }

    fn at_instruction(&mut self, benchmark: &str, instruction: u64) -> Result<ExitEvent> {
        info!("Creating checkpoint at inst:{}", instruction);
        for core in 0..self.sim.num_cores() {
            let remaining = instruction.saturating_sub(self.sim.total_instructions(core));
            self.sim.schedule_instruction_stop(core, remaining);
        }

        let mut resumes = 0;
        let event = loop {
            let event = self.sim.execute(None);
            resumes += 1;
            info!("exit cause = {}", event.cause);
            if event.cause != StopCause::CheckpointRequested {
                break event;
            }
            if self.driver.resume_limit.is_some_and(|limit| resumes >= limit) {
                break event;
            }
        };

        if event.cause.is_max_instructions() {
            self.checkpoint(CheckpointName::Instruction {
                benchmark: benchmark.to_string(),
                instruction,
            })?;
        } else {
            warn!(
                "No checkpoint at inst:{}, simulation stopped because {}",
                instruction, event.cause
            );
        }
        Ok(event)
    }

    fn benchmark(&mut self, max_checkpoints: u32) -> Result<(ExitEvent, bool)> {
        let mut num_checkpoints = 0;
        let mut exhausted = false;
        loop {
            let now = self.sim.current_tick();
            if now >= self.max_tick {
                return Ok((ExitEvent::bound_reached(), exhausted));
            }
            let event = self.sim.execute(Some(self.max_tick - now));
            if event.cause != StopCause::CheckpointRequested {
                return Ok((event, exhausted));
            }
            if num_checkpoints < max_checkpoints {
                let tick = self.sim.current_tick();
                self.checkpoint(CheckpointName::Tick(tick))?;
                num_checkpoints += 1;
            }
            if num_checkpoints >= max_checkpoints && !exhausted {
                warn!(
                    "maximum {} checkpoints dropped, running on without checkpointing",
                    max_checkpoints
                );
                exhausted = true;
            }
        }
    }
}
