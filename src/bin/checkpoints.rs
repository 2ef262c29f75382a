//! Inspect checkpoint directories
use clap::{Parser, Subcommand, ValueEnum};
use cli_table::{Cell, Table, print_stdout};
use sim_phases::{SelectionPolicy, list_checkpoints, resolve};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, ValueEnum)]
enum Naming {
    /// cpt.<tick>
    Tick,
    /// cpt.simpoint_<index>_inst_...
    #[value(name = "simpoint")]
    SimPoint,
    /// Whatever the directory holds
    Any,
}

#[derive(Subcommand)]
enum Commands {
    /// List every recognised checkpoint in order
    List {
        /// Checkpoint directory
        #[arg(short, long, default_value = ".")]
        checkpoint_dir: PathBuf,
    },
    /// Show which checkpoint a restore would pick
    Select {
        /// Checkpoint directory
        #[arg(short, long, default_value = ".")]
        checkpoint_dir: PathBuf,

        /// Naming convention to select among
        #[arg(short, long, default_value = "tick")]
        naming: Naming,

        /// 1-indexed checkpoint, or the instruction count with --bench
        #[arg(short, long)]
        restore: u64,

        /// Benchmark name of instruction-named checkpoints
        #[arg(short, long)]
        bench: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Cli::parse();

    match args.command {
        Commands::List { checkpoint_dir } => {
            let checkpoints = list_checkpoints(&checkpoint_dir)?;
            let mut table = vec![];
            for (index, (name, path)) in checkpoints.iter().enumerate() {
                table.push(vec![
                    (index + 1).cell(),
                    name.convention().cell(),
                    name.start_tick().cell(),
                    path.display().cell(),
                ]);
            }
            let table = table.table().title(vec![
                "#".cell(),
                "Naming".cell(),
                "Start Tick".cell(),
                "Path".cell(),
            ]);
            print_stdout(table)?;
        }
        Commands::Select {
            checkpoint_dir,
            naming,
            restore,
            bench,
        } => {
            let policy = match (bench, naming) {
                (Some(benchmark), _) => SelectionPolicy::ByBenchmarkInstruction {
                    benchmark,
                    instruction: restore,
                },
                (None, Naming::Tick) => SelectionPolicy::ByTick { ordinal: restore },
                (None, Naming::SimPoint) => SelectionPolicy::BySimPoint { ordinal: restore },
                (None, Naming::Any) => SelectionPolicy::ByOrdinal { ordinal: restore },
            };
            let checkpoint = resolve(&checkpoint_dir, &policy)?;
            println!("{}", checkpoint.path.display());
            println!("Start tick: {}", checkpoint.start_tick);
            if let Some(tag) = checkpoint.simpoint() {
                println!(
                    "SimPoint #{}: start inst {} weight {} interval {} warmup {}",
                    tag.index,
                    tag.start_instruction,
                    tag.weight,
                    tag.interval_length,
                    tag.warmup_length
                );
            }
        }
    }
    Ok(())
}
