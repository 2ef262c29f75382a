// checkpoint directory naming conventions:
// root/
// |- cpt.{tick}/
// |- cpt.{benchmark}.{instruction}/
// \- cpt.simpoint_{index:02}_inst_{start}_weight_{weight}_interval_{length}_warmup_{length}/

use crate::{Error, NotFoundError, Result};
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::LazyLock,
};

static TICK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^cpt\.(\d+)$").unwrap());
static INSTRUCTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^cpt\.(.+)\.(\d+)$").unwrap());
static SIMPOINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^cpt\.simpoint_(\d+)_inst_(\d+)_weight_([\d.e-]+)_interval_(\d+)_warmup_(\d+)$",
    )
    .unwrap()
});

/// Sampling metadata carried in a SimPoint checkpoint name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimPointTag {
    pub index: usize,
    pub start_instruction: u64,
    pub weight: f64,
    pub interval_length: u64,
    pub warmup_length: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Convention {
    Tick,
    Instruction,
    SimPoint,
}

impl fmt::Display for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Convention::Tick => "cpt.<tick>",
            Convention::Instruction => "cpt.<benchmark>.<instruction>",
            Convention::SimPoint => "cpt.simpoint_*",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CheckpointName {
    Tick(u64),
    Instruction { benchmark: String, instruction: u64 },
    SimPoint(SimPointTag),
}

impl CheckpointName {
    pub fn parse(name: &str) -> Option<Self> {
        if let Some(caps) = SIMPOINT_RE.captures(name) {
            return Some(CheckpointName::SimPoint(SimPointTag {
                index: caps[1].parse().ok()?,
                start_instruction: caps[2].parse().ok()?,
                weight: caps[3].parse().ok()?,
                interval_length: caps[4].parse().ok()?,
                warmup_length: caps[5].parse().ok()?,
            }));
        }
        if let Some(caps) = TICK_RE.captures(name) {
            return Some(CheckpointName::Tick(caps[1].parse().ok()?));
        }
        if let Some(caps) = INSTRUCTION_RE.captures(name) {
            return Some(CheckpointName::Instruction {
                benchmark: caps[1].to_string(),
                instruction: caps[2].parse().ok()?,
            });
        }
        None
    }

    pub fn convention(&self) -> Convention {
        match self {
            CheckpointName::Tick(_) => Convention::Tick,
            CheckpointName::Instruction { .. } => Convention::Instruction,
            CheckpointName::SimPoint(_) => Convention::SimPoint,
        }
    }

    /// Numeric ordering key within one convention
    pub fn sort_key(&self) -> (u64, u64) {
        match self {
            CheckpointName::Tick(tick) => (*tick, 0),
            CheckpointName::Instruction { instruction, .. } => (*instruction, 0),
            CheckpointName::SimPoint(tag) => (tag.index as u64, tag.start_instruction),
        }
    }

    /// Tick the checkpoint was taken at, 0 when the name does not record it
    pub fn start_tick(&self) -> u64 {
        match self {
            CheckpointName::Tick(tick) => *tick,
            _ => 0,
        }
    }
}

impl fmt::Display for CheckpointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointName::Tick(tick) => write!(f, "cpt.{}", tick),
            CheckpointName::Instruction {
                benchmark,
                instruction,
            } => write!(f, "cpt.{}.{}", benchmark, instruction),
            CheckpointName::SimPoint(tag) => write!(
                f,
                "cpt.simpoint_{:02}_inst_{}_weight_{:.6}_interval_{}_warmup_{}",
                tag.index, tag.start_instruction, tag.weight, tag.interval_length, tag.warmup_length
            ),
        }
    }
}

/// Which checkpoint to restore from; ordinals are 1-indexed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionPolicy {
    ByTick { ordinal: u64 },
    ByBenchmarkInstruction { benchmark: String, instruction: u64 },
    /// N-th checkpoint of whatever convention the directory holds
    ByOrdinal { ordinal: u64 },
    BySimPoint { ordinal: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCheckpoint {
    pub path: PathBuf,
    pub name: CheckpointName,
    pub start_tick: u64,
}

impl ResolvedCheckpoint {
    pub fn simpoint(&self) -> Option<&SimPointTag> {
        match &self.name {
            CheckpointName::SimPoint(tag) => Some(tag),
            _ => None,
        }
    }
}

/// All recognised checkpoint directories directly under `root`, sorted by
/// convention and then numerically
pub fn list_checkpoints(root: &Path) -> Result<Vec<(CheckpointName, PathBuf)>> {
    if !root.is_dir() {
        return Err(NotFoundError::CheckpointRoot(root.to_path_buf()).into());
    }
    let mut found = vec![];
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        match CheckpointName::parse(file_name) {
            Some(name) => found.push((name, entry.path())),
            None => debug!("Ignoring non-checkpoint directory {}", file_name),
        }
    }
    found.sort_by(|(left, _), (right, _)| {
        (left.convention(), left.sort_key()).cmp(&(right.convention(), right.sort_key()))
    });
    Ok(found)
}

pub fn resolve(root: &Path, policy: &SelectionPolicy) -> Result<ResolvedCheckpoint> {
    if !root.is_dir() {
        return Err(NotFoundError::CheckpointRoot(root.to_path_buf()).into());
    }

    let (convention, ordinal) = match policy {
        SelectionPolicy::ByBenchmarkInstruction {
            benchmark,
            instruction,
        } => {
            let name = CheckpointName::Instruction {
                benchmark: benchmark.clone(),
                instruction: *instruction,
            };
            let path = root.join(name.to_string());
            if !path.is_dir() {
                return Err(NotFoundError::CheckpointDir(path).into());
            }
            return Ok(ResolvedCheckpoint {
                path,
                start_tick: name.start_tick(),
                name,
            });
        }
        SelectionPolicy::ByTick { ordinal } => (Some(Convention::Tick), *ordinal),
        SelectionPolicy::BySimPoint { ordinal } => (Some(Convention::SimPoint), *ordinal),
        SelectionPolicy::ByOrdinal { ordinal } => (None, *ordinal),
    };

    let mut candidates = list_checkpoints(root)?;
    match convention {
        Some(convention) => candidates.retain(|(name, _)| name.convention() == convention),
        None => {
            let mixed = candidates
                .windows(2)
                .any(|pair| pair[0].0.convention() != pair[1].0.convention());
            if mixed {
                warn!(
                    "Checkpoint dir {} mixes naming conventions, ordering by convention first",
                    root.display()
                );
            }
        }
    }

    if candidates.is_empty() {
        return Err(NotFoundError::NoCheckpoints {
            root: root.to_path_buf(),
            convention: convention.map_or("recognised".to_string(), |c| c.to_string()),
        }
        .into());
    }
    if ordinal == 0 || ordinal as usize > candidates.len() {
        return Err(Error::NotFound(NotFoundError::CheckpointOrdinal {
            ordinal,
            available: candidates.len(),
        }));
    }

    let (name, path) = candidates.swap_remove(ordinal as usize - 1);
    Ok(ResolvedCheckpoint {
        start_tick: name.start_tick(),
        name,
        path,
    })
}
