//! Run a phase plan against the synthetic engine
use clap::Parser;
use cli_table::{Cell, CellStruct, Table, print_stdout};
use sim_phases::{
    BuiltinCatalog, ExecutionDriver, Orchestrator, Outcome, Phase, RunOptions, RunPlan,
    SyntheticConfig, SyntheticEngine, get_datetime, get_output_dir, get_stats_path,
};
use std::{
    fs::{File, create_dir_all},
    path::PathBuf,
};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to run options json, defaults apply when omitted
    #[arg(short, long)]
    config_path: Option<PathBuf>,

    /// Path to synthetic engine json
    #[arg(short, long)]
    engine_path: Option<PathBuf>,

    /// Output directory, overrides the one in run options
    #[arg(short, long)]
    outdir: Option<PathBuf>,

    /// Give up a phase after this many engine calls
    #[arg(short, long)]
    resume_limit: Option<usize>,
}

fn phase_row(index: usize, phase: &Phase) -> Vec<CellStruct> {
    let actions: Vec<String> = phase
        .enter
        .iter()
        .chain(phase.exit.iter())
        .map(|action| action.to_string())
        .collect();
    vec![
        index.cell(),
        phase.name.as_str().cell(),
        phase.state.cell(),
        (&phase.cpus).cell(),
        (&phase.stop).cell(),
        actions.join(", ").cell(),
    ]
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Cli::parse();

    let mut options = match &args.config_path {
        Some(path) => RunOptions::load(path)?,
        None => RunOptions::default(),
    };
    if let Some(outdir) = args.outdir {
        options.outdir = Some(outdir);
    }
    let outdir = options
        .outdir
        .clone()
        .unwrap_or_else(|| get_output_dir(&get_datetime()));
    options.outdir = Some(outdir.clone());
    create_dir_all(&outdir)?;

    let plan = RunPlan::build(&options, &BuiltinCatalog)?;
    println!(
        "Planned {} phases on {} cores, max tick {}",
        plan.phases.len(),
        plan.num_cores,
        plan.max_tick
    );
    let table: Vec<_> = plan
        .phases
        .iter()
        .enumerate()
        .map(|(index, phase)| phase_row(index, phase))
        .collect();
    let table = table.table().title(vec![
        "#".cell(),
        "Phase".cell(),
        "State".cell(),
        "CPUs".cell(),
        "Stop".cell(),
        "Actions".cell(),
    ]);
    print_stdout(table)?;
    serde_json::to_writer_pretty(File::create(outdir.join("plan.json"))?, &plan.phases)?;

    let mut config: SyntheticConfig = match &args.engine_path {
        Some(path) => serde_json::from_slice(&std::fs::read(path)?)?,
        None => SyntheticConfig::default(),
    };
    config.num_cores = plan.num_cores;
    config.initial_model = plan.initial.model.clone();
    if config.stats_path.is_none() {
        config.stats_path = Some(get_stats_path(&outdir));
    }
    let mut engine = match &plan.restore {
        Some(checkpoint) => SyntheticEngine::restore(config, &checkpoint.path)?,
        None => SyntheticEngine::new(config),
    };
    if plan.initialize_only {
        println!("Initialized, not running any phase");
        return Ok(());
    }

    let driver = match args.resume_limit {
        Some(limit) => ExecutionDriver::with_resume_limit(limit),
        None => ExecutionDriver::new(),
    };
    let outcome = Orchestrator::new(&mut engine, driver).run(&plan)?;
    match &outcome {
        Outcome::Completed(summary) => {
            println!(
                "Completed {} phases @ tick {}",
                summary.phases_completed, summary.final_tick
            );
            for checkpoint in &summary.checkpoints {
                println!("Checkpoint: {}", checkpoint.display());
            }
            if summary.budget_exhausted {
                println!("Checkpoint budget exhausted");
            }
            serde_json::to_writer_pretty(File::create(outdir.join("summary.json"))?, summary)?;
        }
        Outcome::Failed(failure) => {
            eprintln!("ERROR {}", failure);
            std::process::exit(outcome.exit_code());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_phases::{
        ATOMIC_CPU, CpuSet, PhaseAction, PhaseState, StopCriterion, TIMING_CPU, switch_all,
    };

    #[test]
    fn phase_row_borrows_the_phase() {
        let atomic = CpuSet::new("cpu", ATOMIC_CPU);
        let timing = CpuSet::new("switch_cpus", TIMING_CPU);
        let phase = Phase::new("settle", PhaseState::FastForward, &atomic, StopCriterion::Ticks(10))
            .on_exit(PhaseAction::SwitchCpus(switch_all(1, &atomic, &timing)))
            .on_exit(PhaseAction::DumpStats);
        let row = phase_row(0, &phase);
        assert_eq!(row.len(), 6);
        // still usable after rendering
        assert_eq!(phase.stop, StopCriterion::Ticks(10));
        assert_eq!(phase.cpus.to_string(), "cpu(AtomicSimpleCPU)");
    }
}
