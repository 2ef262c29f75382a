use crate::StopCause;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Mutually exclusive or incomplete options, raised before any engine call
    #[error("conflicting options: {0}")]
    ConfigurationConflict(String),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    MalformedInput(#[from] MalformedInputError),

    #[error(transparent)]
    PhaseFailure(#[from] PhaseFailure),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum NotFoundError {
    #[error("checkpoint dir {} does not exist", .0.display())]
    CheckpointRoot(PathBuf),

    #[error("no {convention} checkpoints under {}", root.display())]
    NoCheckpoints { root: PathBuf, convention: String },

    #[error("checkpoint {ordinal} not found ({available} available)")]
    CheckpointOrdinal { ordinal: u64, available: usize },

    #[error("unable to find checkpoint directory {}", .0.display())]
    CheckpointDir(PathBuf),

    #[error("unable to find simpoint: workload has no simpoint marker")]
    SimPointMarker,

    #[error("unknown cpu model {0}")]
    CpuModel(String),
}

#[derive(Debug, Error)]
pub enum MalformedInputError {
    #[error("unrecognized line {line} in simpoint file {}: {content:?}", path.display())]
    AnalysisLine {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("unrecognized line {line} in simpoint weight file {}: {content:?}", path.display())]
    WeightLine {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("simpoint weight file {} is short: expected {expected} lines", path.display())]
    MissingWeights { path: PathBuf, expected: usize },

    #[error("interval {interval} with length {interval_length} overflows the instruction count")]
    Overflow { interval: u64, interval_length: u64 },

    #[error("bad option value {value:?}: expected {expected}")]
    OptionValue { value: String, expected: &'static str },

    #[error("failed to read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A phase whose execution did not reach its stopping criterion
#[derive(Debug, Clone, Error, PartialEq)]
#[error("phase {phase} failed: {cause}")]
pub struct PhaseFailure {
    pub phase: String,
    pub cause: StopCause,
}
