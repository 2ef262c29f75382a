use crate::{
    CheckpointName, ControlCore, ExecutionDriver, MalformedInputError, PhaseFailure, Result,
    SimPointTag, Simulator, get_tqdm_style,
};
use log::info;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
    sync::LazyLock,
};

// SimPoint 3.2 output: "<interval> <cluster>" and "<weight> <cluster>"
static ANALYSIS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)\s+(\d+)").unwrap());
static WEIGHT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9.e-]+)\s+(\d+)").unwrap());

/// One representative interval to checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimPointEntry {
    /// interval index as reported by SimPoint, starting from 0
    pub interval: u64,
    /// fraction of the program represented by this interval
    pub weight: f64,
    /// where the checkpoint is taken: the interval start minus warmup
    pub start_instruction: u64,
    /// warmup actually available before the interval start
    pub warmup_length: u64,
}

impl SimPointEntry {
    pub fn new(
        interval: u64,
        weight: f64,
        interval_length: u64,
        warmup_length: u64,
    ) -> Option<Self> {
        let interval_start = interval.checked_mul(interval_length)?;
        let (start_instruction, warmup_length) = if interval_start > warmup_length {
            (interval_start - warmup_length, warmup_length)
        } else {
            // not enough room for a full warmup, start from the beginning
            (0, interval_start)
        };
        Some(Self {
            interval,
            weight,
            start_instruction,
            warmup_length,
        })
    }
}

/// Where to find the SimPoint files and how to size intervals, as given by
/// `analysis,weights,interval_length,warmup_length`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimPointInputs {
    pub analysis_path: PathBuf,
    pub weight_path: PathBuf,
    pub interval_length: u64,
    pub warmup_length: u64,
}

impl SimPointInputs {
    pub fn parse(value: &str) -> std::result::Result<Self, MalformedInputError> {
        let malformed = || MalformedInputError::OptionValue {
            value: value.to_string(),
            expected: "<analysis file>,<weight file>,<interval length>,<warmup length>",
        };
        let parts: Vec<&str> = value.splitn(4, ',').collect();
        let &[analysis, weights, interval, warmup] = parts.as_slice() else {
            return Err(malformed());
        };
        Ok(Self {
            analysis_path: PathBuf::from(analysis.trim()),
            weight_path: PathBuf::from(weights.trim()),
            interval_length: interval.trim().parse().map_err(|_| malformed())?,
            warmup_length: warmup.trim().parse().map_err(|_| malformed())?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimPointPlan {
    /// SimPoint interval length in instructions
    pub interval_length: u64,
    /// requested warmup in instructions
    pub warmup_length: u64,
    /// sorted by starting instruction
    pub entries: Vec<SimPointEntry>,
}

impl SimPointPlan {
    pub fn load(inputs: &SimPointInputs) -> std::result::Result<Self, MalformedInputError> {
        info!("simpoint analysis file: {}", inputs.analysis_path.display());
        info!("simpoint weight file: {}", inputs.weight_path.display());
        info!("interval length: {}", inputs.interval_length);
        info!("warmup length: {}", inputs.warmup_length);

        let open = |path: &Path| {
            File::open(path)
                .map(BufReader::new)
                .map_err(|source| MalformedInputError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                })
        };
        Self::parse(
            open(&inputs.analysis_path)?,
            &inputs.analysis_path,
            open(&inputs.weight_path)?,
            &inputs.weight_path,
            inputs.interval_length,
            inputs.warmup_length,
        )
    }

    /// Read both files in lock-step; the paths only label errors
    pub fn parse<A: BufRead, W: BufRead>(
        analysis: A,
        analysis_path: &Path,
        weights: W,
        weight_path: &Path,
        interval_length: u64,
        warmup_length: u64,
    ) -> std::result::Result<Self, MalformedInputError> {
        let unreadable = |path: &Path, source| MalformedInputError::Unreadable {
            path: path.to_path_buf(),
            source,
        };

        let mut entries = vec![];
        let mut weight_lines = weights.lines();
        for (index, line) in analysis.lines().enumerate() {
            let line = line.map_err(|err| unreadable(analysis_path, err))?;
            let interval: u64 = ANALYSIS_RE
                .captures(&line)
                .and_then(|caps| caps[1].parse().ok())
                .ok_or_else(|| MalformedInputError::AnalysisLine {
                    path: analysis_path.to_path_buf(),
                    line: index + 1,
                    content: line.clone(),
                })?;

            let weight_line = weight_lines
                .next()
                .ok_or_else(|| MalformedInputError::MissingWeights {
                    path: weight_path.to_path_buf(),
                    expected: index + 1,
                })?
                .map_err(|err| unreadable(weight_path, err))?;
            let weight: f64 = WEIGHT_RE
                .captures(&weight_line)
                .and_then(|caps| caps[1].parse().ok())
                .ok_or_else(|| MalformedInputError::WeightLine {
                    path: weight_path.to_path_buf(),
                    line: index + 1,
                    content: weight_line.clone(),
                })?;

            entries.push(
                SimPointEntry::new(interval, weight, interval_length, warmup_length).ok_or(
                    MalformedInputError::Overflow {
                        interval,
                        interval_length,
                    },
                )?,
            );
        }

        // sort by starting instruction
        entries.sort_by_key(|entry| entry.start_instruction);
        for entry in &entries {
            info!(
                "{} {} {} {}",
                entry.interval, entry.weight, entry.start_instruction, entry.warmup_length
            );
        }
        info!("Total # of simpoints: {}", entries.len());

        Ok(Self {
            interval_length,
            warmup_length,
            entries,
        })
    }

    /// Name of the checkpoint for the `index`-th entry
    pub fn checkpoint_name(&self, index: usize) -> Option<CheckpointName> {
        let entry = self.entries.get(index)?;
        Some(CheckpointName::SimPoint(SimPointTag {
            index,
            start_instruction: entry.start_instruction,
            weight: entry.weight,
            interval_length: self.interval_length,
            warmup_length: entry.warmup_length,
        }))
    }
}

/// What happened to one plan entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub entry: SimPointEntry,
    pub name: String,
    /// checkpoint directory the sample restores from
    pub checkpoint: PathBuf,
    /// false when the entry shares an earlier entry's starting point
    pub written: bool,
}

/// Walk the plan, running only the distance between distinct starting
/// points and writing one checkpoint per distinct start
pub fn apply<S: Simulator + ?Sized>(
    plan: &SimPointPlan,
    sim: &mut S,
    dir: &Path,
    driver: &ExecutionDriver,
) -> Result<Vec<SampleRecord>> {
    let pbar = indicatif::ProgressBar::new(plan.entries.len() as u64);
    pbar.set_style(get_tqdm_style());

    let mut records: Vec<SampleRecord> = vec![];
    let mut last: Option<(u64, PathBuf)> = None;
    for (index, entry) in plan.entries.iter().enumerate() {
        let name = plan
            .checkpoint_name(index)
            .map(|name| name.to_string())
            .unwrap_or_default();

        if let Some((last_start, last_path)) = &last {
            if *last_start == entry.start_instruction {
                // checkpoint starting point same as last time
                // (when warmup period longer than starting point)
                records.push(SampleRecord {
                    entry: entry.clone(),
                    name,
                    checkpoint: last_path.clone(),
                    written: false,
                });
                pbar.inc(1);
                continue;
            }
        }

        let previous = last.as_ref().map_or(0, |(start, _)| *start);
        let delta = entry.start_instruction - previous;
        if delta > 0 {
            let result = driver.run_instructions(sim, delta, ControlCore::Single(0));
            if !result.success {
                pbar.abandon();
                return Err(PhaseFailure {
                    phase: format!("simpoint #{}", index),
                    cause: result.event.cause,
                }
                .into());
            }
        }

        let path = dir.join(&name);
        sim.save(&path)?;
        info!(
            "Checkpoint #{} written. start inst:{} weight:{}",
            records.iter().filter(|record| record.written).count(),
            entry.start_instruction,
            entry.weight
        );
        records.push(SampleRecord {
            entry: entry.clone(),
            name,
            checkpoint: path.clone(),
            written: true,
        });
        last = Some((entry.start_instruction, path));
        pbar.inc(1);
    }
    pbar.finish();

    info!(
        "{} checkpoints taken",
        records.iter().filter(|record| record.written).count()
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(
        analysis: &str,
        weights: &str,
    ) -> std::result::Result<SimPointPlan, MalformedInputError> {
        SimPointPlan::parse(
            Cursor::new(analysis),
            Path::new("simpoints"),
            Cursor::new(weights),
            Path::new("weights"),
            1000,
            500,
        )
    }

    #[test]
    fn warmup_is_clamped_at_program_start() {
        let first = SimPointEntry::new(0, 0.5, 1000, 500).unwrap();
        assert_eq!((first.start_instruction, first.warmup_length), (0, 0));
        let third = SimPointEntry::new(3, 0.5, 1000, 500).unwrap();
        assert_eq!((third.start_instruction, third.warmup_length), (2500, 500));
        // exactly enough room still counts as not enough
        let short = SimPointEntry::new(1, 0.5, 500, 500).unwrap();
        assert_eq!((short.start_instruction, short.warmup_length), (0, 500));
    }

    #[test]
    fn entries_sorted_by_start() {
        let plan = parse("7 0\n3 1\n0 2\n", "0.2 0\n0.5 1\n0.3 2\n").unwrap();
        let starts: Vec<_> = plan.entries.iter().map(|e| e.start_instruction).collect();
        assert_eq!(starts, vec![0, 2500, 6500]);
        assert_eq!(plan.entries[1].weight, 0.5);
        assert_eq!(
            plan.checkpoint_name(1).unwrap().to_string(),
            "cpt.simpoint_01_inst_2500_weight_0.500000_interval_1000_warmup_500"
        );
    }

    #[test]
    fn short_weight_file_is_malformed() {
        let err = parse("1 0\n2 1\n", "1.0 0\n").unwrap_err();
        assert!(matches!(
            err,
            MalformedInputError::MissingWeights { expected: 2, .. }
        ));
    }

    #[test]
    fn unparseable_lines_are_malformed() {
        assert!(matches!(
            parse("one 0\n", "1.0 0\n").unwrap_err(),
            MalformedInputError::AnalysisLine { line: 1, .. }
        ));
        assert!(matches!(
            parse("1 0\n", "heavy 0\n").unwrap_err(),
            MalformedInputError::WeightLine { line: 1, .. }
        ));
    }

    #[test]
    fn option_string() {
        let inputs = SimPointInputs::parse("a.simpts,a.weights,100000000,1000000").unwrap();
        assert_eq!(inputs.interval_length, 100_000_000);
        assert_eq!(inputs.weight_path, PathBuf::from("a.weights"));
        assert!(SimPointInputs::parse("a.simpts,a.weights,100").is_err());
    }
}
