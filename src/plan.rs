//! Turning validated options into an ordered phase list
use crate::{
    CheckpointPolicy, ControlCore, CpuCatalog, CpuSet, Error, KVM_CPU, O3_CPU, Phase, PhaseAction,
    PhaseState, ResolvedCheckpoint, Result, RunOptions, SelectionPolicy, SimPointPlan,
    SimPointInputs, SimPointTag, StopCriterion, TIMING_CPU, get_checkpoint_read_dir,
    get_checkpoint_write_dir, resolve, switch_all,
};
use log::info;
use std::path::PathBuf;

/// Ticks to run on the restore model before switching to the measured one
pub const RESTORE_SETTLE_TICKS: u64 = 10_000;

/// Everything a run does, fixed before the engine is instantiated
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub num_cores: usize,
    /// cpu set the engine is instantiated with
    pub initial: CpuSet,
    pub restore: Option<ResolvedCheckpoint>,
    /// absolute tick ceiling
    pub max_tick: u64,
    /// where new checkpoints are written
    pub checkpoint_dir: PathBuf,
    pub phases: Vec<Phase>,
    pub checkpoint_at_end: bool,
    pub initialize_only: bool,
}

impl Default for RunPlan {
    fn default() -> Self {
        Self {
            num_cores: 1,
            initial: CpuSet::new("cpu", crate::ATOMIC_CPU),
            restore: None,
            max_tick: u64::MAX,
            checkpoint_dir: PathBuf::from("."),
            phases: vec![],
            checkpoint_at_end: false,
            initialize_only: false,
        }
    }
}

/// Sample lengths of one repeat iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLengths {
    pub fast_forward: u64,
    pub warmup: u64,
    pub detailed: u64,
    /// lengths are ticks instead of instructions
    pub in_ticks: bool,
    /// cores the detailed sample is counted on
    pub control: ControlCore,
}

impl SampleLengths {
    fn criterion(&self, length: u64, control: ControlCore) -> StopCriterion {
        if self.in_ticks {
            StopCriterion::Ticks(length)
        } else {
            StopCriterion::Instructions {
                count: length,
                control,
            }
        }
    }
}

/// Boot the kernel on `cpu` until the workload signals, then hand over to
/// the fast-forward set
pub fn kernel_boot(num_cores: usize, cpu: &CpuSet, fast_forward: &CpuSet) -> Phase {
    Phase::new("kernel boot", PhaseState::Init, cpu, StopCriterion::UntilExit)
        .on_exit(PhaseAction::SwitchCpus(switch_all(num_cores, cpu, fast_forward)))
}

/// `repeat` rounds of fast-forward, then a measured sample on `detailed`.
/// The first round starts by bringing `detailed` up once before handing
/// back to the fast-forward set.
pub fn repeat_samples(
    num_cores: usize,
    repeat: u32,
    fast_forward: &CpuSet,
    detailed: &CpuSet,
    lengths: &SampleLengths,
) -> Vec<Phase> {
    let mut phases = vec![];
    for trial in 0..repeat {
        let mut ff = Phase::new(
            &format!("fast-forward repeat {}", trial),
            PhaseState::FastForward,
            fast_forward,
            lengths.criterion(lengths.fast_forward, ControlCore::Single(0)),
        );
        if trial == 0 {
            ff = ff.on_enter(PhaseAction::SwitchCpus(switch_all(
                num_cores,
                fast_forward,
                detailed,
            )));
        }
        phases.push(ff.on_enter(PhaseAction::SwitchCpus(switch_all(
            num_cores,
            detailed,
            fast_forward,
        ))));
        phases.push(
            Phase::new(
                &format!("detailed repeat {}", trial),
                PhaseState::Detailed,
                detailed,
                lengths.criterion(lengths.detailed, lengths.control),
            )
            .on_enter(PhaseAction::SwitchCpus(switch_all(
                num_cores,
                fast_forward,
                detailed,
            )))
            .on_enter(PhaseAction::ResetStats)
            .on_exit(PhaseAction::DumpStats),
        );
    }
    phases
}

/// Like [`repeat_samples`] with a warmup on `warmup` between fast-forward
/// and measurement. Each round still returns to fast-forward from
/// `detailed`, and the one-off bring-up at the start still targets
/// `detailed` rather than `warmup`.
pub fn repeat_samples_with_warmup(
    num_cores: usize,
    repeat: u32,
    fast_forward: &CpuSet,
    warmup: &CpuSet,
    detailed: &CpuSet,
    lengths: &SampleLengths,
) -> Vec<Phase> {
    let mut phases = vec![];
    for trial in 0..repeat {
        let mut ff = Phase::new(
            &format!("fast-forward repeat {}", trial),
            PhaseState::FastForward,
            fast_forward,
            lengths.criterion(lengths.fast_forward, ControlCore::Single(0)),
        );
        if trial == 0 {
            ff = ff.on_enter(PhaseAction::SwitchCpus(switch_all(
                num_cores,
                fast_forward,
                detailed,
            )));
        }
        phases.push(ff.on_enter(PhaseAction::SwitchCpus(switch_all(
            num_cores,
            detailed,
            fast_forward,
        ))));
        phases.push(
            Phase::new(
                &format!("warmup repeat {}", trial),
                PhaseState::Warmup,
                warmup,
                lengths.criterion(lengths.warmup, ControlCore::Single(0)),
            )
            .on_enter(PhaseAction::SwitchCpus(switch_all(
                num_cores,
                fast_forward,
                warmup,
            ))),
        );
        phases.push(
            Phase::new(
                &format!("detailed repeat {}", trial),
                PhaseState::Detailed,
                detailed,
                lengths.criterion(lengths.detailed, lengths.control),
            )
            .on_enter(PhaseAction::SwitchCpus(switch_all(num_cores, warmup, detailed)))
            .on_enter(PhaseAction::ResetStats)
            .on_exit(PhaseAction::DumpStats),
        );
    }
    phases
}

/// Fast-forward on `cpu`, warm up on a timing model, measure on O3
pub fn standard_switch(
    num_cores: usize,
    cpu: &CpuSet,
    fast_forward: u64,
    warmup: StopCriterion,
) -> (Vec<Phase>, CpuSet) {
    let timing = CpuSet::new("switch_cpus", TIMING_CPU);
    let detailed = CpuSet::new("switch_cpus_1", O3_CPU);
    let phases = vec![
        Phase::new(
            "fast-forward",
            PhaseState::FastForward,
            cpu,
            StopCriterion::Instructions {
                count: fast_forward,
                control: ControlCore::Single(0),
            },
        )
        .on_exit(PhaseAction::SwitchCpus(switch_all(num_cores, cpu, &timing))),
        Phase::new("warmup", PhaseState::Warmup, &timing, warmup).on_exit(
            PhaseAction::SwitchCpus(switch_all(num_cores, &timing, &detailed)),
        ),
    ];
    (phases, detailed)
}

/// Warm up and measure with the lengths recorded in a SimPoint checkpoint
pub fn simpoint_restore(cpus: &CpuSet, tag: &SimPointTag) -> Vec<Phase> {
    vec![
        Phase::new(
            "simpoint warmup",
            PhaseState::Warmup,
            cpus,
            StopCriterion::Instructions {
                count: tag.warmup_length,
                control: ControlCore::All,
            },
        )
        .on_exit(PhaseAction::ResetStats),
        Phase::new(
            "simpoint sample",
            PhaseState::Detailed,
            cpus,
            StopCriterion::Instructions {
                count: tag.interval_length,
                control: ControlCore::All,
            },
        )
        .on_exit(PhaseAction::DumpStats),
    ]
}

impl RunPlan {
    /// Validate `options`, load every input file and resolve the checkpoint
    /// to restore. Fails before anything is simulated.
    pub fn build(options: &RunOptions, catalog: &dyn CpuCatalog) -> Result<Self> {
        options.validate(catalog)?;
        let num_cores = options.num_cpus;
        let control = if options.sync_all_cores {
            ControlCore::All
        } else {
            ControlCore::Single(0)
        };

        let simpoints = match &options.take_simpoint_checkpoints {
            Some(value) => Some(SimPointPlan::load(&SimPointInputs::parse(value)?)?),
            None => None,
        };

        let restore = match options.checkpoint_restore {
            Some(ordinal) => {
                let policy = if options.instruction_named() {
                    let mut instruction = ordinal;
                    if options.simpoint {
                        instruction += options.workload_simpoint;
                    }
                    SelectionPolicy::ByBenchmarkInstruction {
                        benchmark: options.bench.clone().unwrap_or_default(),
                        instruction,
                    }
                } else if options.restore_simpoint_checkpoint {
                    SelectionPolicy::BySimPoint { ordinal }
                } else {
                    SelectionPolicy::ByTick { ordinal }
                };
                let resolved = resolve(&get_checkpoint_read_dir(options), &policy)?;
                info!(
                    "Restoring from {} (tick {})",
                    resolved.path.display(),
                    resolved.start_tick
                );
                Some(resolved)
            }
            None => None,
        };

        let max_tick = options.max_tick(restore.as_ref().map(|cpt| cpt.start_tick));
        if let Some(cpt) = &restore {
            if max_tick < cpt.start_tick {
                return Err(Error::ConfigurationConflict(format!(
                    "Bad maxtick ({}) specified: Checkpoint starts from tick: {}",
                    max_tick, cpt.start_tick
                )));
            }
        }

        // the model the engine starts with, and the one it switches to
        let switch_model = if options.is_restoring() && options.restore_with_cpu != options.cpu_type
        {
            Some(options.restore_with_cpu.as_str())
        } else if options.fast_forward.is_some() {
            Some(KVM_CPU)
        } else {
            None
        };
        let cpu = CpuSet::new("cpu", switch_model.unwrap_or(options.cpu_type.as_str()));
        let switch_cpus = CpuSet::new("switch_cpus", &options.cpu_type);
        let switching = switch_model.is_some();

        let mut phases = vec![];
        let mut active = cpu.clone();
        let mut reset_before_measure = false;

        if options.standard_switch.is_some() || switching {
            if options.kernel_starting {
                let progkvm = CpuSet::new("progkvm_cpu", KVM_CPU);
                phases.push(kernel_boot(num_cores, &active, &progkvm));
                active = progkvm;
                reset_before_measure = true;
            }

            if let (Some(repeat), Some(fast_forward), Some(detailed)) =
                (options.repeat, options.fast_forward, options.maxinsts)
            {
                let lengths = SampleLengths {
                    fast_forward,
                    warmup: options.warmup_aftkernel.unwrap_or(0),
                    detailed,
                    in_ticks: options.period_in_ticks,
                    control,
                };
                match options.warmup_aftkernel {
                    Some(_) => phases.extend(repeat_samples_with_warmup(
                        num_cores,
                        repeat,
                        &active,
                        &CpuSet::new("warmup_cpu", TIMING_CPU),
                        &switch_cpus,
                        &lengths,
                    )),
                    None => phases.extend(repeat_samples(
                        num_cores,
                        repeat,
                        &active,
                        &switch_cpus,
                        &lengths,
                    )),
                }
                return Ok(Self {
                    num_cores,
                    initial: cpu,
                    restore,
                    max_tick,
                    checkpoint_dir: get_checkpoint_write_dir(options),
                    phases,
                    checkpoint_at_end: options.checkpoint_at_end,
                    initialize_only: options.initialize_only,
                });
            }

            if let Some(ticks) = options.standard_switch {
                let fast_forward = if options.is_restoring() {
                    1
                } else if let Some(count) = options.fast_forward {
                    count
                } else if options.simpoint {
                    options.workload_simpoint
                } else {
                    1
                };
                let warmup = match options.warmup_insts {
                    Some(count) => StopCriterion::Instructions {
                        count,
                        control: ControlCore::Single(0),
                    },
                    None => StopCriterion::Ticks(ticks),
                };
                let (switch_phases, detailed) =
                    standard_switch(num_cores, &active, fast_forward, warmup);
                phases.extend(switch_phases);
                active = detailed;
            } else {
                let target = match options.warmup_aftkernel {
                    Some(_) => CpuSet::new("warmup_cpu", TIMING_CPU),
                    None => switch_cpus.clone(),
                };
                let first = match options.fast_forward {
                    Some(count) => Phase::new(
                        "fast-forward",
                        PhaseState::FastForward,
                        &active,
                        StopCriterion::Instructions {
                            count,
                            control: ControlCore::Single(0),
                        },
                    ),
                    None => Phase::new(
                        "restore settle",
                        PhaseState::FastForward,
                        &active,
                        StopCriterion::Ticks(RESTORE_SETTLE_TICKS),
                    ),
                };
                phases.push(first.on_exit(PhaseAction::SwitchCpus(switch_all(
                    num_cores, &active, &target,
                ))));
                active = target;

                if let Some(count) = options.warmup_aftkernel {
                    phases.push(
                        Phase::new(
                            "warmup",
                            PhaseState::Warmup,
                            &active,
                            StopCriterion::Instructions {
                                count,
                                control: ControlCore::Single(0),
                            },
                        )
                        .on_exit(PhaseAction::SwitchCpus(switch_all(
                            num_cores,
                            &active,
                            &switch_cpus,
                        ))),
                    );
                    active = switch_cpus.clone();
                }
            }
        }
        if options.fast_forward.is_some() {
            reset_before_measure = true;
        }

        if options.take_checkpoints.is_some() {
            let (name, policy) = if options.instruction_named() {
                let mut instruction = options.checkpoint_offset()?.unwrap_or_default();
                if options.simpoint {
                    instruction += options.workload_simpoint;
                }
                // keep the name absolute when resuming from an earlier one
                if let Some(restored) = options.checkpoint_restore {
                    instruction += restored;
                }
                (
                    "instruction checkpoint",
                    CheckpointPolicy::AtInstruction {
                        benchmark: options.bench.clone().unwrap_or_default(),
                        instruction,
                    },
                )
            } else {
                let (first_tick, period) = options.checkpoint_period()?.unwrap_or_default();
                (
                    "periodic checkpoints",
                    CheckpointPolicy::Periodic {
                        first_tick,
                        period,
                        max_checkpoints: options.max_checkpoints,
                    },
                )
            };
            phases.push(Phase::new(
                name,
                PhaseState::Drain,
                &active,
                StopCriterion::Checkpoints(policy),
            ));
        } else if let Some(simpoints) = simpoints {
            let mut phase = Phase::new(
                "simpoint checkpoints",
                PhaseState::Drain,
                &cpu,
                StopCriterion::SimPoints(simpoints),
            );
            if active != cpu {
                phase = phase.on_enter(PhaseAction::SwitchCpus(switch_all(
                    num_cores, &active, &cpu,
                )));
            }
            phases.push(phase);
        } else if let Some(tag) = restore
            .as_ref()
            .and_then(|cpt| cpt.simpoint())
            .filter(|_| options.restore_simpoint_checkpoint)
        {
            phases.extend(simpoint_restore(&active, tag));
        } else {
            let repeat_switch = options
                .repeat_switch
                .filter(|interval| max_tick > *interval);
            let mut phase = if let Some(interval) = repeat_switch {
                let repeat_cpus = CpuSet::new("repeat_switch_cpus", &options.cpu_type);
                Phase::new(
                    "repeat switch",
                    PhaseState::RepeatSwitch,
                    &active,
                    StopCriterion::RepeatSwitch {
                        interval,
                        switches: switch_all(num_cores, &active, &repeat_cpus),
                    },
                )
            } else if let Some(count) = options.maxinsts {
                Phase::new(
                    "detailed",
                    PhaseState::Detailed,
                    &active,
                    StopCriterion::Instructions { count, control },
                )
                .on_exit(PhaseAction::DumpStats)
            } else {
                Phase::new(
                    "benchmark",
                    PhaseState::Drain,
                    &active,
                    StopCriterion::Checkpoints(CheckpointPolicy::Benchmark {
                        max_checkpoints: options.max_checkpoints,
                    }),
                )
            };
            if reset_before_measure || (options.is_restoring() && repeat_switch.is_none()) {
                phase = phase.on_enter(PhaseAction::ResetStats);
            }
            phases.push(phase);
        }

        Ok(Self {
            num_cores,
            initial: cpu,
            restore,
            max_tick,
            checkpoint_dir: get_checkpoint_write_dir(options),
            phases,
            checkpoint_at_end: options.checkpoint_at_end,
            initialize_only: options.initialize_only,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ATOMIC_CPU, BuiltinCatalog};

    fn build(options: RunOptions) -> RunPlan {
        RunPlan::build(&options, &BuiltinCatalog).unwrap()
    }

    fn names(plan: &RunPlan) -> Vec<&str> {
        plan.phases.iter().map(|phase| phase.name.as_str()).collect()
    }

    #[test]
    fn plain_run_drains_to_max_tick() {
        let plan = build(RunOptions::default());
        assert_eq!(plan.initial, CpuSet::new("cpu", ATOMIC_CPU));
        assert_eq!(names(&plan), vec!["benchmark"]);
        assert!(plan.phases[0].enter.is_empty());
    }

    #[test]
    fn fast_forward_then_measure() {
        let plan = build(RunOptions {
            cpu_type: O3_CPU.to_string(),
            caches: true,
            fast_forward: Some(1000),
            maxinsts: Some(500),
            ..Default::default()
        });
        assert_eq!(plan.initial.model, KVM_CPU);
        assert_eq!(names(&plan), vec!["fast-forward", "detailed"]);
        assert_eq!(plan.phases[1].cpus, CpuSet::new("switch_cpus", O3_CPU));
        assert_eq!(plan.phases[1].enter, vec![PhaseAction::ResetStats]);
        assert_eq!(plan.phases[1].exit, vec![PhaseAction::DumpStats]);
    }

    #[test]
    fn standard_switch_goes_through_timing() {
        let plan = build(RunOptions {
            num_cpus: 2,
            caches: true,
            standard_switch: Some(5000),
            maxinsts: Some(100),
            ..Default::default()
        });
        assert_eq!(names(&plan), vec!["fast-forward", "warmup", "detailed"]);
        assert_eq!(plan.phases[1].stop, StopCriterion::Ticks(5000));
        assert_eq!(plan.phases[2].cpus.model, O3_CPU);
        let PhaseAction::SwitchCpus(switches) = &plan.phases[0].exit[0] else {
            panic!("expected a switch");
        };
        assert_eq!(switches.len(), 2);
        assert_eq!(switches[1].to.model, TIMING_CPU);
    }

    #[test]
    fn kernel_boot_with_repeat_and_warmup() {
        let plan = build(RunOptions {
            kernel_starting: true,
            fast_forward: Some(1000),
            warmup_aftkernel: Some(200),
            maxinsts: Some(100),
            repeat: Some(2),
            ..Default::default()
        });
        assert_eq!(
            names(&plan),
            vec![
                "kernel boot",
                "fast-forward repeat 0",
                "warmup repeat 0",
                "detailed repeat 0",
                "fast-forward repeat 1",
                "warmup repeat 1",
                "detailed repeat 1",
            ]
        );
        // the first round brings the detailed set up before fast-forwarding
        assert_eq!(plan.phases[1].enter.len(), 2);
        assert_eq!(plan.phases[4].enter.len(), 1);
        assert_eq!(plan.phases[2].cpus.role, "warmup_cpu");
    }

    #[test]
    fn periodic_checkpoints_from_options() {
        let plan = build(RunOptions {
            take_checkpoints: Some("100,100".to_string()),
            max_checkpoints: 3,
            abs_max_tick: Some(250),
            ..Default::default()
        });
        assert_eq!(plan.max_tick, 250);
        assert_eq!(
            plan.phases[0].stop,
            StopCriterion::Checkpoints(CheckpointPolicy::Periodic {
                first_tick: 100,
                period: 100,
                max_checkpoints: 3,
            })
        );
    }

    #[test]
    fn repeat_switch_needs_room_below_max_tick() {
        let options = RunOptions {
            repeat_switch: Some(1000),
            abs_max_tick: Some(500),
            ..Default::default()
        };
        assert_eq!(names(&build(options)), vec!["benchmark"]);

        let options = RunOptions {
            repeat_switch: Some(100),
            abs_max_tick: Some(500),
            ..Default::default()
        };
        assert_eq!(names(&build(options)), vec!["repeat switch"]);
    }

    #[test]
    fn conflicts_fail_before_restore_lookup() {
        let options = RunOptions {
            fast_forward: Some(10),
            checkpoint_restore: Some(1),
            checkpoint_dir: Some(PathBuf::from("/nonexistent/checkpoints")),
            ..Default::default()
        };
        assert!(matches!(
            RunPlan::build(&options, &BuiltinCatalog),
            Err(Error::ConfigurationConflict(_))
        ));
    }

    #[test]
    fn restore_settles_before_switching() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("cpt.5000")).unwrap();
        let plan = build(RunOptions {
            checkpoint_dir: Some(dir.path().to_path_buf()),
            checkpoint_restore: Some(1),
            restore_with_cpu: ATOMIC_CPU.to_string(),
            cpu_type: TIMING_CPU.to_string(),
            rel_max_tick: Some(1000),
            maxinsts: Some(100),
            ..Default::default()
        });
        assert_eq!(plan.restore.as_ref().unwrap().start_tick, 5000);
        assert_eq!(plan.max_tick, 6000);
        assert_eq!(names(&plan), vec!["restore settle", "detailed"]);
        assert_eq!(plan.phases[0].stop, StopCriterion::Ticks(RESTORE_SETTLE_TICKS));
        assert_eq!(plan.phases[1].enter, vec![PhaseAction::ResetStats]);
    }

    #[test]
    fn max_tick_before_checkpoint_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("cpt.5000")).unwrap();
        let options = RunOptions {
            checkpoint_dir: Some(dir.path().to_path_buf()),
            checkpoint_restore: Some(1),
            abs_max_tick: Some(100),
            ..Default::default()
        };
        assert!(matches!(
            RunPlan::build(&options, &BuiltinCatalog),
            Err(Error::ConfigurationConflict(_))
        ));
    }
}
