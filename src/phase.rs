//! Sequencing of cpu-model phases over one engine
use crate::{
    CheckpointName, CheckpointPolicy, CheckpointScheduler, ControlCore, CpuSet, CpuSwitch,
    ExecutionDriver, ExitEvent, PhaseFailure, Result, RunPlan, SampleRecord, SimPointPlan,
    Simulator, StopCause, invert, simpoint,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseState {
    Init,
    FastForward,
    Warmup,
    Detailed,
    RepeatSwitch,
    Drain,
    Done,
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// When a phase hands over to the next one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StopCriterion {
    Instructions { count: u64, control: ControlCore },
    Ticks(u64),
    /// until the workload executes its exit instruction
    UntilExit,
    /// alternate `interval`-tick slices with model swaps up to the max tick
    RepeatSwitch {
        interval: u64,
        switches: Vec<CpuSwitch>,
    },
    /// run to the max tick, writing checkpoints per the policy
    Checkpoints(CheckpointPolicy),
    /// write one checkpoint per distinct SimPoint start; ends the run
    SimPoints(SimPointPlan),
}

impl fmt::Display for StopCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopCriterion::Instructions { count, control } => match control {
                ControlCore::Single(core) => write!(f, "{} insts on cpu {}", count, core),
                ControlCore::All => write!(f, "{} insts on all cpus", count),
            },
            StopCriterion::Ticks(ticks) => write!(f, "{} ticks", ticks),
            StopCriterion::UntilExit => write!(f, "until exit"),
            StopCriterion::RepeatSwitch { interval, .. } => {
                write!(f, "switch every {} ticks", interval)
            }
            StopCriterion::Checkpoints(CheckpointPolicy::Periodic {
                first_tick,
                period,
                max_checkpoints,
            }) => write!(
                f,
                "checkpoint at {} every {} ticks (max {})",
                first_tick, period, max_checkpoints
            ),
            StopCriterion::Checkpoints(CheckpointPolicy::AtInstruction {
                benchmark,
                instruction,
            }) => write!(f, "checkpoint {} at inst {}", benchmark, instruction),
            StopCriterion::Checkpoints(CheckpointPolicy::Benchmark { max_checkpoints }) => {
                write!(f, "benchmark checkpoints (max {})", max_checkpoints)
            }
            StopCriterion::SimPoints(plan) => write!(f, "{} simpoints", plan.entries.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PhaseAction {
    SwitchCpus(Vec<CpuSwitch>),
    ResetStats,
    DumpStats,
    /// `cpt.<tick>` in the plan's checkpoint directory
    Checkpoint,
}

impl fmt::Display for PhaseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseAction::SwitchCpus(switches) => match switches.first() {
                Some(switch) => write!(f, "switch {} -> {}", switch.from, switch.to),
                None => write!(f, "switch nothing"),
            },
            PhaseAction::ResetStats => write!(f, "reset stats"),
            PhaseAction::DumpStats => write!(f, "dump stats"),
            PhaseAction::Checkpoint => write!(f, "checkpoint"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub name: String,
    pub state: PhaseState,
    /// cpu set active while the phase runs
    pub cpus: CpuSet,
    pub enter: Vec<PhaseAction>,
    pub stop: StopCriterion,
    pub exit: Vec<PhaseAction>,
}

impl Phase {
    pub fn new(name: &str, state: PhaseState, cpus: &CpuSet, stop: StopCriterion) -> Self {
        Self {
            name: name.to_string(),
            state,
            cpus: cpus.clone(),
            enter: vec![],
            stop,
            exit: vec![],
        }
    }

    pub fn on_enter(mut self, action: PhaseAction) -> Self {
        self.enter.push(action);
        self
    }

    pub fn on_exit(mut self, action: PhaseAction) -> Self {
        self.exit.push(action);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub final_tick: u64,
    pub last_event: Option<ExitEvent>,
    pub phases_completed: usize,
    pub checkpoints: Vec<PathBuf>,
    pub samples: Vec<SampleRecord>,
    pub budget_exhausted: bool,
    /// a terminal stop cause cut the phase list short
    pub ended_early: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(RunSummary),
    Failed(PhaseFailure),
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Completed(_) => 0,
            Outcome::Failed(_) => 1,
        }
    }
}

pub struct Orchestrator<'a, S: Simulator + ?Sized> {
    sim: &'a mut S,
    driver: ExecutionDriver,
    state: PhaseState,
    transitions: Vec<PhaseState>,
}

impl<'a, S: Simulator + ?Sized> Orchestrator<'a, S> {
    pub fn new(sim: &'a mut S, driver: ExecutionDriver) -> Self {
        Self {
            sim,
            driver,
            state: PhaseState::Init,
            transitions: vec![PhaseState::Init],
        }
    }

    pub fn state(&self) -> PhaseState {
        self.state
    }

    /// Every state entered so far, starting with `Init`
    pub fn transitions(&self) -> &[PhaseState] {
        &self.transitions
    }

    fn enter_state(&mut self, state: PhaseState) {
        if state != self.state {
            info!("{} -> {}", self.state, state);
            self.state = state;
            self.transitions.push(state);
        }
    }

    pub fn run(&mut self, plan: &RunPlan) -> Result<Outcome> {
        let mut summary = RunSummary::default();

        for (index, phase) in plan.phases.iter().enumerate() {
            self.enter_state(phase.state);
            info!("Start {} on {}", phase.name, phase.cpus);
            for action in &phase.enter {
                self.fire(action, plan, &mut summary)?;
            }

            let event = match &phase.stop {
                StopCriterion::Instructions { count, control } => {
                    let result = self.driver.run_instructions(self.sim, *count, *control);
                    if !result.success {
                        return Ok(self.failed(phase, result.event.cause));
                    }
                    result.event
                }
                StopCriterion::Ticks(ticks) => {
                    let result = self.driver.run_ticks(self.sim, *ticks);
                    if !result.success {
                        return Ok(self.failed(phase, result.event.cause));
                    }
                    result.event
                }
                StopCriterion::UntilExit => {
                    let result = self.driver.run_until_exit(self.sim);
                    if !result.success {
                        return Ok(self.failed(phase, result.event.cause));
                    }
                    result.event
                }
                StopCriterion::RepeatSwitch { interval, switches } => {
                    self.repeat_switch(switches, plan.max_tick, *interval)
                }
                StopCriterion::Checkpoints(policy) => {
                    let report = CheckpointScheduler::new(
                        &mut *self.sim,
                        &plan.checkpoint_dir,
                        plan.max_tick,
                        self.driver,
                    )
                    .run(policy)?;
                    summary.checkpoints.extend(report.written);
                    summary.budget_exhausted |= report.budget_exhausted;
                    report.event
                }
                StopCriterion::SimPoints(simpoints) => {
                    let applied =
                        simpoint::apply(simpoints, self.sim, &plan.checkpoint_dir, &self.driver);
                    let samples = match applied {
                        Ok(samples) => samples,
                        Err(crate::Error::PhaseFailure(failure)) => {
                            error!("{}", failure);
                            self.enter_state(PhaseState::Done);
                            return Ok(Outcome::Failed(failure));
                        }
                        Err(err) => return Err(err),
                    };
                    summary.checkpoints.extend(
                        samples
                            .iter()
                            .filter(|sample| sample.written)
                            .map(|sample| sample.checkpoint.clone()),
                    );
                    summary.samples = samples;
                    ExitEvent::new(StopCause::Other("simpoint starting point found".to_string()))
                }
            };

            for action in &phase.exit {
                self.fire(action, plan, &mut summary)?;
            }
            summary.phases_completed += 1;
            summary.last_event = Some(event.clone());

            if matches!(phase.stop, StopCriterion::SimPoints(_)) {
                break;
            }
            let remaining = plan.phases.len() - index - 1;
            if remaining > 0
                && event.cause.is_terminal()
                && !matches!(phase.stop, StopCriterion::UntilExit)
            {
                warn!("Skipping {} remaining phases: {}", remaining, event.cause);
                summary.ended_early = true;
                break;
            }
        }

        if plan.checkpoint_at_end {
            self.checkpoint(plan, &mut summary)?;
        }
        self.enter_state(PhaseState::Done);

        summary.final_tick = self.sim.current_tick();
        match &summary.last_event {
            Some(event) => {
                info!("Exiting @ tick {} because {}", summary.final_tick, event.cause);
                if event.code != 0 {
                    warn!("Simulated exit code not 0! Exit code is {}", event.code);
                }
            }
            None => info!("Exiting @ tick {} without running", summary.final_tick),
        }
        Ok(Outcome::Completed(summary))
    }

    fn failed(&mut self, phase: &Phase, cause: StopCause) -> Outcome {
        let failure = PhaseFailure {
            phase: phase.name.clone(),
            cause,
        };
        error!("{}", failure);
        self.enter_state(PhaseState::Done);
        Outcome::Failed(failure)
    }

    fn fire(
        &mut self,
        action: &PhaseAction,
        plan: &RunPlan,
        summary: &mut RunSummary,
    ) -> Result<()> {
        match action {
            PhaseAction::SwitchCpus(switches) => self.sim.switch_cpus(switches),
            PhaseAction::ResetStats => self.sim.reset(),
            PhaseAction::DumpStats => self.sim.dump(),
            PhaseAction::Checkpoint => self.checkpoint(plan, summary)?,
        }
        Ok(())
    }

    fn checkpoint(&mut self, plan: &RunPlan, summary: &mut RunSummary) -> Result<()> {
        let name = CheckpointName::Tick(self.sim.current_tick());
        let path = plan.checkpoint_dir.join(name.to_string());
        self.sim.save(&path)?;
        info!("Checkpoint written to {}", path.display());
        summary.checkpoints.push(path);
        Ok(())
    }

    fn repeat_switch(&mut self, switches: &[CpuSwitch], max_tick: u64, interval: u64) -> ExitEvent {
        info!("starting switch loop");
        let mut switches = switches.to_vec();
        loop {
            let event = self.sim.execute(Some(interval));
            if event.cause != StopCause::BoundReached {
                return event;
            }

            self.sim.switch_cpus(&switches);
            switches = invert(&switches);

            let remaining = max_tick.saturating_sub(self.sim.current_tick());
            if remaining <= interval {
                if remaining == 0 {
                    return event;
                }
                return self.sim.execute(Some(remaining));
            }
        }
    }
}
