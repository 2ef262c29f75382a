use serde::{Deserialize, Serialize};
use std::fmt;

// cause strings reported by gem5-style engines
pub const BOUND_REACHED: &str = "simulate() limit reached";
pub const MAX_INSTS_PREFIX: &str = "Max Insts";
pub const MAX_INSTS_ANY_THREAD: &str = "a thread reached the max instruction count";
pub const CHECKPOINT: &str = "checkpoint";
pub const PROGRAM_EXIT: &str = "m5_exit instruction encountered";

/// Why the simulation engine handed control back
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopCause {
    /// The tick bound passed to `execute` was reached
    BoundReached,
    /// An instruction stop fired, on the given core when the engine knows it
    MaxInstructions(Option<usize>),
    /// The workload itself asked for a checkpoint
    CheckpointRequested,
    /// The workload executed an explicit exit
    ProgramExit(i32),
    Other(String),
}

impl StopCause {
    /// Classify a raw cause string, keeping the prefix semantics of
    /// "Max Insts reached CPU <n>" labels.
    pub fn parse(cause: &str, code: i32) -> Self {
        if cause == BOUND_REACHED {
            StopCause::BoundReached
        } else if let Some(rest) = cause.strip_prefix(MAX_INSTS_PREFIX) {
            let core = rest
                .rsplit_once("CPU ")
                .and_then(|(_, index)| index.trim().parse().ok());
            StopCause::MaxInstructions(core)
        } else if cause == MAX_INSTS_ANY_THREAD {
            StopCause::MaxInstructions(None)
        } else if cause == CHECKPOINT {
            StopCause::CheckpointRequested
        } else if cause == PROGRAM_EXIT {
            StopCause::ProgramExit(code)
        } else {
            StopCause::Other(cause.to_string())
        }
    }

    pub fn is_max_instructions(&self) -> bool {
        matches!(self, StopCause::MaxInstructions(_))
    }

    /// Causes after which the workload cannot make further progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, StopCause::ProgramExit(_) | StopCause::Other(_))
    }
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopCause::BoundReached => f.write_str(BOUND_REACHED),
            StopCause::MaxInstructions(Some(core)) => {
                write!(f, "{} reached CPU {}", MAX_INSTS_PREFIX, core)
            }
            StopCause::MaxInstructions(None) => f.write_str(MAX_INSTS_ANY_THREAD),
            StopCause::CheckpointRequested => f.write_str(CHECKPOINT),
            StopCause::ProgramExit(_) => f.write_str(PROGRAM_EXIT),
            StopCause::Other(cause) => f.write_str(cause),
        }
    }
}

/// What one `execute` call returned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitEvent {
    pub cause: StopCause,
    pub code: i32,
}

impl ExitEvent {
    pub fn new(cause: StopCause) -> Self {
        let code = match cause {
            StopCause::ProgramExit(code) => code,
            _ => 0,
        };
        Self { cause, code }
    }

    pub fn bound_reached() -> Self {
        Self::new(StopCause::BoundReached)
    }
}
