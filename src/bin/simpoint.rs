//! Inspect the checkpoint plan derived from SimPoint analysis files
use clap::Parser;
use cli_table::{Cell, Table, print_stdout};
use sim_phases::{SimPointPlan, SimPointInputs};
use std::{fs::File, path::PathBuf};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to SimPoint analysis (.simpts) file
    #[arg(short, long)]
    analysis_path: PathBuf,

    /// Path to SimPoint weights file
    #[arg(short, long)]
    weight_path: PathBuf,

    /// SimPoint interval length in instructions
    #[arg(short, long)]
    interval_length: u64,

    /// Warmup length in instructions
    #[arg(short = 'l', long, default_value = "0")]
    warmup_length: u64,

    /// Path to output json
    #[arg(short, long)]
    output_path: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Cli::parse();

    let plan = SimPointPlan::load(&SimPointInputs {
        analysis_path: args.analysis_path,
        weight_path: args.weight_path,
        interval_length: args.interval_length,
        warmup_length: args.warmup_length,
    })?;

    let mut table = vec![];
    let mut last_start = None;
    for (index, entry) in plan.entries.iter().enumerate() {
        let name = plan
            .checkpoint_name(index)
            .map(|name| name.to_string())
            .unwrap_or_default();
        let shared = last_start == Some(entry.start_instruction);
        last_start = Some(entry.start_instruction);
        table.push(vec![
            index.cell(),
            entry.interval.cell(),
            format!("{:.6}", entry.weight).cell(),
            entry.start_instruction.cell(),
            entry.warmup_length.cell(),
            if shared { "shared" } else { name.as_str() }.cell(),
        ]);
    }
    let table = table.table().title(vec![
        "#".cell(),
        "Interval".cell(),
        "Weight".cell(),
        "Start Instruction".cell(),
        "Warmup".cell(),
        "Checkpoint".cell(),
    ]);
    print_stdout(table)?;

    let total_weight: f64 = plan.entries.iter().map(|entry| entry.weight).sum();
    println!(
        "{} simpoints covering {:.2}% of the program",
        plan.entries.len(),
        total_weight * 100.0
    );

    if let Some(output_path) = &args.output_path {
        serde_json::to_writer_pretty(File::create(output_path)?, &plan)?;
        println!("Plan written to {}", output_path.display());
    }
    Ok(())
}
