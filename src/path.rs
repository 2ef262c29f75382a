// output folder structure:
// m5out/
// \- {datetime}/
//    |- stats.txt
//    |- plan.json
//    |- cpt.{tick}/
//    |- cpt.{benchmark}.{instruction}/
//    \- cpt.simpoint_{index}_inst_{start}_weight_{weight}_interval_{length}_warmup_{length}/
//       \- manifest.json

use crate::RunOptions;
use std::path::{Path, PathBuf};

pub fn get_output_dir(datetime: &str) -> PathBuf {
    PathBuf::from("m5out").join(datetime)
}

pub fn get_stats_path<P: AsRef<Path>>(outdir: P) -> PathBuf {
    outdir.as_ref().join("stats.txt")
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Where checkpoints to restore are looked up
pub fn get_checkpoint_read_dir(options: &RunOptions) -> PathBuf {
    options
        .checkpoint_dir
        .clone()
        .or_else(|| options.outdir.clone())
        .unwrap_or_else(current_dir)
}

/// Where new checkpoints go. A run that restores and takes checkpoints
/// writes to the output directory so the two sets stay apart.
pub fn get_checkpoint_write_dir(options: &RunOptions) -> PathBuf {
    let taking = options.take_checkpoints.is_some() || options.take_simpoint_checkpoints.is_some();
    if taking && options.is_restoring() {
        options.outdir.clone().unwrap_or_else(current_dir)
    } else {
        get_checkpoint_read_dir(options)
    }
}
