use crate::{ExitEvent, SimulationEngine, StopCause};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Which cores an instruction budget is counted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlCore {
    /// Only this core's committed instructions matter
    Single(usize),
    /// Every core must commit the full budget
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub success: bool,
    pub event: ExitEvent,
    /// Number of `execute` calls issued
    pub resumes: usize,
}

/// Bounded execution on top of an engine that only knows how to stop on
/// one instruction count per core at a time.
///
/// Stop causes other than the expected one are never fatal here: execution
/// is simply resumed. There is no ceiling on resumes unless `resume_limit` is
/// set, so an engine that never produces the expected cause hangs the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionDriver {
    pub resume_limit: Option<usize>,
}

impl ExecutionDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resume_limit(limit: usize) -> Self {
        Self {
            resume_limit: Some(limit),
        }
    }

    fn exhausted(&self, resumes: usize) -> bool {
        self.resume_limit.is_some_and(|limit| resumes >= limit)
    }

    /// Run until `budget` instructions have been committed
    pub fn run_instructions<E: SimulationEngine + ?Sized>(
        &self,
        engine: &mut E,
        budget: u64,
        control: ControlCore,
    ) -> RunResult {
        match control {
            ControlCore::Single(core) => self.run_single(engine, budget, core),
            ControlCore::All => self.run_all(engine, budget),
        }
    }

    fn run_single<E: SimulationEngine + ?Sized>(
        &self,
        engine: &mut E,
        budget: u64,
        core: usize,
    ) -> RunResult {
        engine.schedule_instruction_stop(core, budget);
        let baseline = engine.total_instructions(core);

        let mut resumes = 0;
        loop {
            let event = engine.execute(None);
            resumes += 1;
            debug!("{}", event.cause);
            if event.cause.is_max_instructions() {
                debug!(
                    "insts simed this interval {}",
                    engine.total_instructions(core).saturating_sub(baseline)
                );
                return RunResult {
                    success: true,
                    event,
                    resumes,
                };
            }
            if self.exhausted(resumes) {
                warn!("Giving up after {} resumes: {}", resumes, event.cause);
                return RunResult {
                    success: false,
                    event,
                    resumes,
                };
            }
        }
    }

    fn run_all<E: SimulationEngine + ?Sized>(&self, engine: &mut E, budget: u64) -> RunResult {
        let num_cores = engine.num_cores();
        let baselines: Vec<u64> = (0..num_cores)
            .map(|core| engine.total_instructions(core))
            .collect();
        if num_cores == 0 || budget == 0 {
            return RunResult {
                success: true,
                event: ExitEvent::new(StopCause::MaxInstructions(None)),
                resumes: 0,
            };
        }
        // the engine accepts a single pending stop, so the first core carries it
        engine.schedule_instruction_stop(0, budget);

        let mut resumes = 0;
        loop {
            let event = engine.execute(None);
            resumes += 1;
            debug!("{}", event.cause);

            if event.cause.is_max_instructions() {
                let mut finished = 0;
                let mut installed = false;
                for (core, baseline) in baselines.iter().enumerate() {
                    let simulated = engine.total_instructions(core).saturating_sub(*baseline);
                    debug!("cpu {}: insts simed this interval {}", core, simulated);
                    if simulated >= budget {
                        finished += 1;
                    } else if !installed {
                        engine.schedule_instruction_stop(core, budget - simulated);
                        installed = true;
                    }
                }
                if finished == num_cores {
                    return RunResult {
                        success: true,
                        event,
                        resumes,
                    };
                }
            }

            if self.exhausted(resumes) {
                warn!("Giving up after {} resumes: {}", resumes, event.cause);
                return RunResult {
                    success: false,
                    event,
                    resumes,
                };
            }
        }
    }

    /// Run for exactly `ticks`; any other stop cause is a failure
    pub fn run_ticks<E: SimulationEngine + ?Sized>(&self, engine: &mut E, ticks: u64) -> RunResult {
        let event = engine.execute(Some(ticks));
        RunResult {
            success: event.cause == StopCause::BoundReached,
            event,
            resumes: 1,
        }
    }

    /// Run until the workload exits, skipping over every other stop cause
    pub fn run_until_exit<E: SimulationEngine + ?Sized>(&self, engine: &mut E) -> RunResult {
        let mut resumes = 0;
        loop {
            let event = engine.execute(None);
            resumes += 1;
            if matches!(event.cause, StopCause::ProgramExit(_)) {
                return RunResult {
                    success: true,
                    event,
                    resumes,
                };
            }
            debug!("Skipping stop cause {} while waiting for exit", event.cause);
            if self.exhausted(resumes) {
                return RunResult {
                    success: false,
                    event,
                    resumes,
                };
            }
        }
    }
}
